//! The fire-and-forget recording seam used by the session engine.

use crate::bus::{EventBus, SecurityEvent};

/// Best-effort, non-blocking audit sink.
///
/// `record` must return immediately and must never fail the caller; an
/// implementation that does I/O hands the event off to a background task.
pub trait SecurityEventSink: Send + Sync {
    fn record(&self, event: SecurityEvent);
}

impl SecurityEventSink for EventBus {
    fn record(&self, event: SecurityEvent) {
        self.publish(event);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl SecurityEventSink for NoopSink {
    fn record(&self, _event: SecurityEvent) {}
}
