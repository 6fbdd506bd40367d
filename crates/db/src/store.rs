//! [`SessionStore`] implementation over PostgreSQL.

use async_trait::async_trait;
use tokenward_core::session::{RevocationReason, Session};
use tokenward_core::store::{RotateOutcome, SessionStore, StoreError};
use tokenward_core::types::{PrincipalId, SessionId};

use crate::models::session::SessionRow;
use crate::repositories::session_repo::RotateResult;
use crate::repositories::SessionRepo;
use crate::DbPool;

/// Unique constraint guarding `(principal_id, session_id)`.
const UNIQUE_SESSION_CONSTRAINT: &str = "uq_sessions_principal_session";

/// Cheaply cloneable handle; the pool is reference counted.
#[derive(Clone)]
pub struct PgSessionStore {
    pool: DbPool,
}

impl PgSessionStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

/// Map a sqlx error, turning a violation of the session uniqueness constraint
/// into [`StoreError::Conflict`].
fn map_insert_error(err: sqlx::Error, session: &Session) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        // PostgreSQL unique constraint violation: error code 23505
        if db_err.code().as_deref() == Some("23505")
            && db_err.constraint() == Some(UNIQUE_SESSION_CONSTRAINT)
        {
            return StoreError::Conflict {
                principal_id: session.principal_id.clone(),
                session_id: session.session_id,
            };
        }
    }
    backend(err)
}

fn backend(err: sqlx::Error) -> StoreError {
    tracing::error!(error = %err, "Session store query failed");
    StoreError::Backend(err.to_string())
}

fn to_sessions(rows: Vec<SessionRow>) -> Result<Vec<Session>, StoreError> {
    rows.into_iter().map(Session::try_from).collect()
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        SessionRepo::insert(&self.pool, session)
            .await
            .map_err(|e| map_insert_error(e, session))
    }

    async fn find(
        &self,
        principal_id: &PrincipalId,
        session_id: &SessionId,
    ) -> Result<Option<Session>, StoreError> {
        SessionRepo::find(&self.pool, principal_id.as_str(), session_id.as_uuid())
            .await
            .map_err(backend)?
            .map(Session::try_from)
            .transpose()
    }

    async fn revoke(
        &self,
        principal_id: &PrincipalId,
        session_id: &SessionId,
        reason: RevocationReason,
    ) -> Result<bool, StoreError> {
        SessionRepo::revoke(&self.pool, principal_id.as_str(), session_id.as_uuid(), reason)
            .await
            .map_err(backend)
    }

    async fn revoke_all_for_principal(
        &self,
        principal_id: &PrincipalId,
        reason: RevocationReason,
    ) -> Result<u64, StoreError> {
        SessionRepo::revoke_all_for_principal(&self.pool, principal_id.as_str(), reason)
            .await
            .map_err(backend)
    }

    async fn count_active(&self, principal_id: &PrincipalId) -> Result<u64, StoreError> {
        let count = SessionRepo::count_active(&self.pool, principal_id.as_str())
            .await
            .map_err(backend)?;
        Ok(count.max(0) as u64)
    }

    async fn oldest_active(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<Session>, StoreError> {
        SessionRepo::oldest_active(&self.pool, principal_id.as_str())
            .await
            .map_err(backend)?
            .map(Session::try_from)
            .transpose()
    }

    async fn find_active_by_device(
        &self,
        principal_id: &PrincipalId,
        device_id: &str,
    ) -> Result<Vec<Session>, StoreError> {
        let rows = SessionRepo::find_active_by_device(&self.pool, principal_id.as_str(), device_id)
            .await
            .map_err(backend)?;
        to_sessions(rows)
    }

    async fn list_active(&self, principal_id: &PrincipalId) -> Result<Vec<Session>, StoreError> {
        let rows = SessionRepo::list_active(&self.pool, principal_id.as_str())
            .await
            .map_err(backend)?;
        to_sessions(rows)
    }

    async fn touch(
        &self,
        principal_id: &PrincipalId,
        session_id: &SessionId,
    ) -> Result<(), StoreError> {
        SessionRepo::touch(&self.pool, principal_id.as_str(), session_id.as_uuid())
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn rotate(
        &self,
        principal_id: &PrincipalId,
        old_session_id: &SessionId,
        replacement: &Session,
    ) -> Result<RotateOutcome, StoreError> {
        let result = SessionRepo::rotate(
            &self.pool,
            principal_id.as_str(),
            old_session_id.as_uuid(),
            replacement,
        )
        .await
        .map_err(|e| map_insert_error(e, replacement))?;

        match result {
            RotateResult::Rotated => Ok(RotateOutcome::Rotated),
            RotateResult::NotRotated(None) => Ok(RotateOutcome::Missing),
            RotateResult::NotRotated(Some(row)) => {
                let current = Session::try_from(row)?;
                // The parent was live when the caller read it; a row that lost
                // the race is always revoked by now.
                match current.revoked_reason() {
                    Some(reason) => Ok(RotateOutcome::Superseded(reason)),
                    None => Err(StoreError::Corrupt(format!(
                        "session {old_session_id} refused rotation while unrevoked"
                    ))),
                }
            }
        }
    }

    async fn insert_replacing_device(&self, session: &Session) -> Result<Vec<SessionId>, StoreError> {
        let replaced = SessionRepo::insert_replacing_device(&self.pool, session)
            .await
            .map_err(|e| map_insert_error(e, session))?;
        Ok(replaced.into_iter().map(SessionId::from_uuid).collect())
    }

    async fn revoke_expired(&self) -> Result<u64, StoreError> {
        SessionRepo::revoke_expired(&self.pool).await.map_err(backend)
    }
}
