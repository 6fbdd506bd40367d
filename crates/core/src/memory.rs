//! In-process [`SessionStore`] backed by a single lock.
//!
//! Every operation runs inside one critical section, which gives the same
//! guarantees the PostgreSQL store gets from row locks and transactions. Used
//! by tests and by embedders that do not need durable sessions.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::session::{Revocation, RevocationReason, Session};
use crate::store::{RotateOutcome, SessionStore, StoreError};
use crate::types::{PrincipalId, SessionId};

/// Rows are kept in insertion order, which breaks `created_at` ties.
#[derive(Default)]
pub struct MemorySessionStore {
    rows: RwLock<Vec<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every row of a principal, revoked or not, in insertion order.
    pub async fn all_for_principal(&self, principal_id: &PrincipalId) -> Vec<Session> {
        self.rows
            .read()
            .await
            .iter()
            .filter(|s| &s.principal_id == principal_id)
            .cloned()
            .collect()
    }
}

fn position(rows: &[Session], principal_id: &PrincipalId, session_id: &SessionId) -> Option<usize> {
    rows.iter()
        .position(|s| &s.principal_id == principal_id && &s.session_id == session_id)
}

fn stamp(session: &mut Session, reason: RevocationReason) -> bool {
    if session.is_revoked() {
        return false;
    }
    session.revocation = Some(Revocation {
        revoked_at: Utc::now(),
        reason,
    });
    true
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        if position(&rows, &session.principal_id, &session.session_id).is_some() {
            return Err(StoreError::Conflict {
                principal_id: session.principal_id.clone(),
                session_id: session.session_id,
            });
        }
        rows.push(session.clone());
        Ok(())
    }

    async fn find(
        &self,
        principal_id: &PrincipalId,
        session_id: &SessionId,
    ) -> Result<Option<Session>, StoreError> {
        let rows = self.rows.read().await;
        Ok(position(&rows, principal_id, session_id).map(|i| rows[i].clone()))
    }

    async fn revoke(
        &self,
        principal_id: &PrincipalId,
        session_id: &SessionId,
        reason: RevocationReason,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().await;
        Ok(match position(&rows, principal_id, session_id) {
            Some(i) => stamp(&mut rows[i], reason),
            None => false,
        })
    }

    async fn revoke_all_for_principal(
        &self,
        principal_id: &PrincipalId,
        reason: RevocationReason,
    ) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let revoked = rows
            .iter_mut()
            .filter(|s| &s.principal_id == principal_id)
            .map(|s| stamp(s, reason))
            .filter(|changed| *changed)
            .count();
        Ok(revoked as u64)
    }

    async fn count_active(&self, principal_id: &PrincipalId) -> Result<u64, StoreError> {
        let now = Utc::now();
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|s| &s.principal_id == principal_id && s.is_active_at(now))
            .count() as u64)
    }

    async fn oldest_active(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<Session>, StoreError> {
        let now = Utc::now();
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|s| &s.principal_id == principal_id && s.is_active_at(now))
            .min_by_key(|s| s.created_at)
            .cloned())
    }

    async fn find_active_by_device(
        &self,
        principal_id: &PrincipalId,
        device_id: &str,
    ) -> Result<Vec<Session>, StoreError> {
        let now = Utc::now();
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|s| {
                &s.principal_id == principal_id && s.matches_device(device_id) && s.is_active_at(now)
            })
            .cloned()
            .collect())
    }

    async fn list_active(&self, principal_id: &PrincipalId) -> Result<Vec<Session>, StoreError> {
        let now = Utc::now();
        let rows = self.rows.read().await;
        let mut active: Vec<Session> = rows
            .iter()
            .rev()
            .filter(|s| &s.principal_id == principal_id && s.is_active_at(now))
            .cloned()
            .collect();
        // Stable sort keeps reverse insertion order among equal timestamps.
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn touch(
        &self,
        principal_id: &PrincipalId,
        session_id: &SessionId,
    ) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        if let Some(i) = position(&rows, principal_id, session_id) {
            let row = &mut rows[i];
            if !row.is_revoked() {
                row.last_seen_at = Some(Utc::now());
                row.refresh_count += 1;
            }
        }
        Ok(())
    }

    async fn rotate(
        &self,
        principal_id: &PrincipalId,
        old_session_id: &SessionId,
        replacement: &Session,
    ) -> Result<RotateOutcome, StoreError> {
        let mut rows = self.rows.write().await;
        let Some(old) = position(&rows, principal_id, old_session_id) else {
            return Ok(RotateOutcome::Missing);
        };
        if let Some(reason) = rows[old].revoked_reason() {
            return Ok(RotateOutcome::Superseded(reason));
        }
        if position(&rows, &replacement.principal_id, &replacement.session_id).is_some() {
            return Err(StoreError::Conflict {
                principal_id: replacement.principal_id.clone(),
                session_id: replacement.session_id,
            });
        }
        rows.push(replacement.clone());
        stamp(&mut rows[old], RevocationReason::Rotated);
        Ok(RotateOutcome::Rotated)
    }

    async fn insert_replacing_device(&self, session: &Session) -> Result<Vec<SessionId>, StoreError> {
        let now = Utc::now();
        let mut rows = self.rows.write().await;
        if position(&rows, &session.principal_id, &session.session_id).is_some() {
            return Err(StoreError::Conflict {
                principal_id: session.principal_id.clone(),
                session_id: session.session_id,
            });
        }
        let mut replaced = Vec::new();
        if let Some(device_id) = session.device.device_id.as_deref() {
            for row in rows.iter_mut().filter(|s| {
                s.principal_id == session.principal_id
                    && s.matches_device(device_id)
                    && s.is_active_at(now)
            }) {
                if stamp(row, RevocationReason::Replaced) {
                    replaced.push(row.session_id);
                }
            }
        }
        rows.push(session.clone());
        Ok(replaced)
    }

    async fn revoke_expired(&self) -> Result<u64, StoreError> {
        let now = Utc::now();
        let mut rows = self.rows.write().await;
        let revoked = rows
            .iter_mut()
            .filter(|s| s.is_expired_at(now))
            .map(|s| stamp(s, RevocationReason::Expired))
            .filter(|changed| *changed)
            .count();
        Ok(revoked as u64)
    }
}
