//! The session store seam.
//!
//! All mutation of session rows goes through this narrow operation set so the
//! row invariants hold no matter which component calls the store:
//!
//! - `(principal_id, session_id)` is unique.
//! - `revoked_at` is never set without `revoked_reason` ([`SessionStore::revoke`]
//!   takes both).
//! - A refresh-token digest only changes by [`SessionStore::rotate`], which
//!   inserts a new row and revokes the old one atomically.
//! - Revoked rows are never modified again.

use async_trait::async_trait;

use crate::session::{RevocationReason, Session};
use crate::types::{PrincipalId, SessionId};

/// Errors surfaced by a [`SessionStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A row with this `(principal_id, session_id)` already exists.
    #[error("session {session_id} already exists for principal {principal_id}")]
    Conflict {
        principal_id: PrincipalId,
        session_id: SessionId,
    },

    /// A stored row could not be mapped back into a [`Session`].
    #[error("corrupt session row: {0}")]
    Corrupt(String),

    /// The storage backend failed.
    #[error("session store backend error: {0}")]
    Backend(String),
}

/// Result of an atomic rotation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotateOutcome {
    /// The replacement was inserted and the old row is now revoked as `rotated`.
    Rotated,
    /// The old row was already revoked (e.g. a concurrent rotation won). Nothing
    /// was written.
    Superseded(RevocationReason),
    /// The old row no longer exists. Nothing was written.
    Missing,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a new row. Fails with [`StoreError::Conflict`] when the
    /// `(principal_id, session_id)` pair already exists.
    async fn insert(&self, session: &Session) -> Result<(), StoreError>;

    /// Look up a row regardless of its revocation state.
    async fn find(
        &self,
        principal_id: &PrincipalId,
        session_id: &SessionId,
    ) -> Result<Option<Session>, StoreError>;

    /// Look up a row only if it has not been revoked.
    async fn find_active(
        &self,
        principal_id: &PrincipalId,
        session_id: &SessionId,
    ) -> Result<Option<Session>, StoreError> {
        Ok(self
            .find(principal_id, session_id)
            .await?
            .filter(|s| !s.is_revoked()))
    }

    /// Revoke one row. Idempotent: returns `false` when the row was already
    /// revoked or does not exist.
    async fn revoke(
        &self,
        principal_id: &PrincipalId,
        session_id: &SessionId,
        reason: RevocationReason,
    ) -> Result<bool, StoreError>;

    /// Revoke every non-revoked row of a principal. Returns the number of rows
    /// this call revoked.
    async fn revoke_all_for_principal(
        &self,
        principal_id: &PrincipalId,
        reason: RevocationReason,
    ) -> Result<u64, StoreError>;

    /// Number of non-revoked, unexpired rows of a principal.
    async fn count_active(&self, principal_id: &PrincipalId) -> Result<u64, StoreError>;

    /// The non-revoked, unexpired row with the earliest `created_at`.
    async fn oldest_active(&self, principal_id: &PrincipalId)
        -> Result<Option<Session>, StoreError>;

    /// Non-revoked, unexpired rows of a principal bound to `device_id`.
    async fn find_active_by_device(
        &self,
        principal_id: &PrincipalId,
        device_id: &str,
    ) -> Result<Vec<Session>, StoreError>;

    /// Non-revoked, unexpired rows of a principal, newest first.
    async fn list_active(&self, principal_id: &PrincipalId) -> Result<Vec<Session>, StoreError>;

    /// Advance `last_seen_at` and `refresh_count` on a non-revoked row.
    /// Advisory only; callers dispatch it in the background.
    async fn touch(
        &self,
        principal_id: &PrincipalId,
        session_id: &SessionId,
    ) -> Result<(), StoreError>;

    /// Atomically insert `replacement` and revoke `old_session_id` with reason
    /// `rotated`, provided the old row is still non-revoked. If it is not,
    /// nothing is written and the current state is reported instead.
    async fn rotate(
        &self,
        principal_id: &PrincipalId,
        old_session_id: &SessionId,
        replacement: &Session,
    ) -> Result<RotateOutcome, StoreError>;

    /// Atomically revoke every live row of `session.principal_id` bound to
    /// the same device with reason `replaced`, then insert `session`. Returns
    /// the ids this call revoked. Concurrent calls for one device are
    /// serialized, so at most one of their rows stays live.
    ///
    /// A session without a `device_id` is inserted without revoking anything.
    async fn insert_replacing_device(&self, session: &Session) -> Result<Vec<SessionId>, StoreError>;

    /// Revoke every non-revoked row whose `expires_at` has passed, with reason
    /// `expired`. Returns the number of rows revoked.
    async fn revoke_expired(&self) -> Result<u64, StoreError>;
}
