//! Background dispatcher for fire-and-forget side effects.
//!
//! Request paths enqueue work and return immediately. A single long-lived
//! Tokio task drains the queue in order, logging and swallowing failures so
//! they never reach the response that was already decided.
//!
//! The queue is bounded. When it is full, new work is dropped and logged
//! rather than blocking the request or growing memory; a dropped mass
//! revocation is re-queued by the next reuse attempt on the same principal.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokenward_core::security::SecurityEventKind;
use tokenward_core::session::RevocationReason;
use tokenward_core::store::SessionStore;
use tokenward_core::types::{PrincipalId, SessionId};
use tokenward_events::{SecurityEvent, SecurityEventSink};

/// Pending tasks held before new work is dropped.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

enum BackgroundTask {
    RevokeAll {
        principal_id: PrincipalId,
        reason: RevocationReason,
    },
    Touch {
        principal_id: PrincipalId,
        session_id: SessionId,
    },
    /// Completes once every task queued before it has been processed.
    Flush(oneshot::Sender<()>),
}

/// Handle used to enqueue background work. Cheap to clone.
///
/// The worker task exits once every handle has been dropped.
#[derive(Clone)]
pub struct BackgroundDispatcher {
    tx: mpsc::Sender<BackgroundTask>,
}

impl BackgroundDispatcher {
    /// Start the worker task with [`DEFAULT_QUEUE_CAPACITY`].
    pub fn spawn(
        store: Arc<dyn SessionStore>,
        events: Arc<dyn SecurityEventSink>,
    ) -> (Self, JoinHandle<()>) {
        Self::spawn_with_capacity(store, events, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn spawn_with_capacity(
        store: Arc<dyn SessionStore>,
        events: Arc<dyn SecurityEventSink>,
        capacity: usize,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let handle = tokio::spawn(run(rx, store, events));
        (Self { tx }, handle)
    }

    /// Revoke every live session of a principal.
    pub fn revoke_all(&self, principal_id: &PrincipalId, reason: RevocationReason) {
        self.send(BackgroundTask::RevokeAll {
            principal_id: principal_id.clone(),
            reason,
        });
    }

    /// Advance `last_seen_at`/`refresh_count` on a session.
    pub fn touch(&self, principal_id: &PrincipalId, session_id: SessionId) {
        self.send(BackgroundTask::Touch {
            principal_id: principal_id.clone(),
            session_id,
        });
    }

    /// Wait until all previously queued work has finished. Unlike the
    /// request-path methods this waits for queue space.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(BackgroundTask::Flush(done_tx)).await.is_err() {
            return;
        }
        // A closed channel means the worker is gone and nothing is pending.
        let _ = done_rx.await;
    }

    fn send(&self, task: BackgroundTask) {
        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(task)) => {
                tracing::error!(task = task.name(), "Background queue full, task dropped");
            }
            Err(TrySendError::Closed(task)) => {
                tracing::error!(task = task.name(), "Background worker has stopped, task dropped");
            }
        }
    }
}

impl BackgroundTask {
    fn name(&self) -> &'static str {
        match self {
            BackgroundTask::RevokeAll { .. } => "revoke_all",
            BackgroundTask::Touch { .. } => "touch",
            BackgroundTask::Flush(_) => "flush",
        }
    }
}

async fn run(
    mut rx: mpsc::Receiver<BackgroundTask>,
    store: Arc<dyn SessionStore>,
    events: Arc<dyn SecurityEventSink>,
) {
    tracing::debug!("Background dispatcher started");

    while let Some(task) = rx.recv().await {
        match task {
            BackgroundTask::RevokeAll {
                principal_id,
                reason,
            } => match store.revoke_all_for_principal(&principal_id, reason).await {
                Ok(revoked) => {
                    tracing::warn!(
                        principal_id = %principal_id,
                        reason = %reason,
                        revoked,
                        "Revoked all sessions for principal",
                    );
                    events.record(
                        SecurityEvent::new(SecurityEventKind::SessionsMassRevoked)
                            .with_principal(&principal_id)
                            .with_metadata(json!({
                                "reason": reason.as_str(),
                                "revoked": revoked,
                            })),
                    );
                }
                Err(e) => {
                    tracing::error!(
                        principal_id = %principal_id,
                        reason = %reason,
                        error = %e,
                        "Mass revocation failed",
                    );
                }
            },
            BackgroundTask::Touch {
                principal_id,
                session_id,
            } => {
                if let Err(e) = store.touch(&principal_id, &session_id).await {
                    tracing::error!(
                        principal_id = %principal_id,
                        session_id = %session_id,
                        error = %e,
                        "Session touch failed",
                    );
                }
            }
            BackgroundTask::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    tracing::debug!("Background dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tokenward_core::memory::MemorySessionStore;
    use tokenward_core::session::{DeviceInfo, Session};
    use tokenward_events::EventBus;

    async fn seeded_store(count: usize) -> Arc<MemorySessionStore> {
        let store = Arc::new(MemorySessionStore::new());
        for _ in 0..count {
            let session = Session::new(
                PrincipalId::new("p"),
                SessionId::generate(),
                "digest".into(),
                DeviceInfo::default(),
                Utc::now(),
                Utc::now() + Duration::days(1),
            );
            store.insert(&session).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn revoke_all_runs_and_emits_event() {
        let store = seeded_store(3).await;
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let (dispatcher, _handle) = BackgroundDispatcher::spawn(store.clone(), bus.clone());

        dispatcher.revoke_all(&PrincipalId::new("p"), RevocationReason::ReuseDetectedRotated);
        dispatcher.flush().await;

        assert_eq!(store.count_active(&PrincipalId::new("p")).await.unwrap(), 0);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, SecurityEventKind::SessionsMassRevoked);
        assert_eq!(event.metadata["revoked"], 3);
        assert_eq!(event.metadata["reason"], "reuse_detected_rotated");
    }

    #[tokio::test]
    async fn touch_advances_counters() {
        let store = seeded_store(1).await;
        let session = store.all_for_principal(&PrincipalId::new("p")).await.remove(0);
        let (dispatcher, _handle) =
            BackgroundDispatcher::spawn(store.clone(), Arc::new(EventBus::default()));

        dispatcher.touch(&session.principal_id, session.session_id);
        dispatcher.flush().await;

        let row = store
            .find(&session.principal_id, &session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.refresh_count, 1);
        assert!(row.last_seen_at.is_some());
    }

    #[tokio::test]
    async fn worker_exits_when_handles_drop() {
        let store = seeded_store(0).await;
        let (dispatcher, handle) = BackgroundDispatcher::spawn(store, Arc::new(EventBus::default()));
        drop(dispatcher);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn full_queue_drops_work_instead_of_growing() {
        let store = seeded_store(1).await;
        let session = store.all_for_principal(&PrincipalId::new("p")).await.remove(0);
        let (dispatcher, _handle) = BackgroundDispatcher::spawn_with_capacity(
            store.clone(),
            Arc::new(EventBus::default()),
            2,
        );

        // The current-thread test runtime does not run the worker until we
        // await, so only the first two fit.
        for _ in 0..10 {
            dispatcher.touch(&session.principal_id, session.session_id);
        }
        dispatcher.flush().await;

        let row = store
            .find(&session.principal_id, &session.session_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.refresh_count, 2);
    }
}
