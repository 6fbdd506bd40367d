//! Security event envelope and the broadcast bus that fans it out to the
//! persistence loop and any other subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokenward_core::security::{SecurityEventKind, Severity};
use tokenward_core::types::{PrincipalId, SessionId};

/// Something that happened to a principal's sessions or credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: SecurityEventKind,

    pub principal_id: Option<PrincipalId>,

    pub session_id: Option<SessionId>,

    /// Free-form JSON carrying event-specific data. Redacted before storage.
    pub metadata: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    /// Create a new event with only the required `kind`.
    pub fn new(kind: SecurityEventKind) -> Self {
        Self {
            kind,
            principal_id: None,
            session_id: None,
            metadata: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_principal(mut self, principal_id: &PrincipalId) -> Self {
        self.principal_id = Some(principal_id.clone());
        self
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }
}

/// Events buffered per subscriber before the slowest one starts lagging.
const DEFAULT_CAPACITY: usize = 1024;

/// Fan-out hub for [`SecurityEvent`]s. Share it as `Arc<EventBus>`.
pub struct EventBus {
    sender: broadcast::Sender<SecurityEvent>,
}

impl EventBus {
    /// A full buffer drops the oldest event; a subscriber that fell behind
    /// sees `RecvError::Lagged` with the number it missed.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Never blocks. With no subscribers the event is discarded.
    pub fn publish(&self, event: SecurityEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SecurityEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
