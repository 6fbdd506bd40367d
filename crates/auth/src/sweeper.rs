//! Periodic expiry marking.
//!
//! Rows past `expires_at` are already inert for every check, but leaving them
//! unrevoked hides them from revocation-based audits. This loop marks them
//! revoked with reason `expired` on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tokenward_core::security::SecurityEventKind;
use tokenward_core::store::SessionStore;
use tokenward_events::{SecurityEvent, SecurityEventSink};

/// Default pause between sweeps.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Run the sweep loop until `cancel` is triggered. The first sweep runs
/// immediately.
pub async fn run(
    store: Arc<dyn SessionStore>,
    events: Arc<dyn SecurityEventSink>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(interval_secs = interval.as_secs(), "Session sweeper started");

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session sweeper stopping");
                break;
            }
            _ = ticker.tick() => {
                sweep_once(store.as_ref(), events.as_ref()).await;
            }
        }
    }
}

/// One sweep. Returns the number of rows marked expired; failures are
/// logged and count as zero.
pub async fn sweep_once(store: &dyn SessionStore, events: &dyn SecurityEventSink) -> u64 {
    match store.revoke_expired().await {
        Ok(0) => {
            tracing::debug!("Session sweeper: nothing expired");
            0
        }
        Ok(expired) => {
            tracing::info!(expired, "Session sweeper: marked sessions expired");
            events.record(
                SecurityEvent::new(SecurityEventKind::SessionsExpired)
                    .with_metadata(json!({ "expired": expired })),
            );
            expired
        }
        Err(e) => {
            tracing::error!(error = %e, "Session sweeper: sweep failed");
            0
        }
    }
}
