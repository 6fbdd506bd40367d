//! Durable security event persistence service.
//!
//! [`EventPersistence`] subscribes to the [`EventBus`](crate::bus::EventBus)
//! broadcast channel and writes every received [`SecurityEvent`] to the
//! `security_events` table. It runs as a long-lived background task and shuts
//! down gracefully when the bus sender is dropped.
//!
//! Only events published on the bus it subscribes to are stored. A process
//! running a `SessionService` must pass that same bus as the service's
//! event sink and subscribe persistence to it.

use tokio::sync::broadcast;
use tokenward_core::security::redact_sensitive_fields;
use tokenward_db::models::security_event::CreateSecurityEvent;
use tokenward_db::repositories::SecurityEventRepo;
use tokenward_db::DbPool;

use crate::bus::SecurityEvent;

/// Background service that persists security events to the database.
pub struct EventPersistence;

impl EventPersistence {
    /// Run the persistence loop until the channel is closed.
    pub async fn run(pool: DbPool, mut receiver: broadcast::Receiver<SecurityEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = Self::persist(&pool, &event).await {
                        tracing::error!(
                            error = %e,
                            kind = %event.kind,
                            "Failed to persist security event"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(
                        skipped = n,
                        "Security event persistence lagged, some events were not persisted"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, persistence shutting down");
                    break;
                }
            }
        }
    }

    async fn persist(pool: &DbPool, event: &SecurityEvent) -> Result<i64, sqlx::Error> {
        SecurityEventRepo::insert(pool, &to_row(event)).await
    }
}

/// Build the insert DTO, redacting sensitive metadata keys.
fn to_row(event: &SecurityEvent) -> CreateSecurityEvent {
    CreateSecurityEvent {
        kind: event.kind.as_str().to_string(),
        severity: event.severity().as_str().to_string(),
        principal_id: event.principal_id.as_ref().map(|p| p.as_str().to_string()),
        session_id: event.session_id.map(|s| s.as_uuid()),
        metadata: redact_sensitive_fields(&event.metadata),
        occurred_at: event.timestamp,
    }
}
