//! Repository for the `sessions` table.
//!
//! Revocation always writes `revoked_at` and `revoked_reason` in the same
//! statement and only ever matches rows where `revoked_at IS NULL`, so a
//! revoked row is never rewritten.

use sqlx::{PgPool, Postgres, Transaction};
use tokenward_core::session::{RevocationReason, Session};
use uuid::Uuid;

use crate::models::session::SessionRow;

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, principal_id, session_id, refresh_token_digest, device_id, \
                       device_name, platform, user_agent, origin_ip, expires_at, revoked_at, \
                       revoked_reason, last_seen_at, refresh_count, created_at, updated_at";

/// Predicate selecting rows that are neither revoked nor expired.
const ACTIVE: &str = "revoked_at IS NULL AND expires_at > NOW()";

const INSERT: &str = "INSERT INTO sessions
        (principal_id, session_id, refresh_token_digest, device_id, device_name, platform,
         user_agent, origin_ip, expires_at, last_seen_at, refresh_count, created_at)
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)";

/// Result of [`SessionRepo::rotate`].
#[derive(Debug)]
pub enum RotateResult {
    Rotated,
    /// The parent row was no longer live; carries its current state, if any.
    NotRotated(Option<SessionRow>),
}

/// Provides the narrow operation set over session rows.
pub struct SessionRepo;

impl SessionRepo {
    /// Insert a new session row.
    pub async fn insert(pool: &PgPool, session: &Session) -> Result<(), sqlx::Error> {
        bind_insert(session).execute(pool).await?;
        Ok(())
    }

    /// Find a session regardless of revocation state.
    pub async fn find(
        pool: &PgPool,
        principal_id: &str,
        session_id: Uuid,
    ) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sessions WHERE principal_id = $1 AND session_id = $2"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(principal_id)
            .bind(session_id)
            .fetch_optional(pool)
            .await
    }

    /// Revoke a single session. Returns `true` if the row was updated.
    pub async fn revoke(
        pool: &PgPool,
        principal_id: &str,
        session_id: Uuid,
        reason: RevocationReason,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions
             SET revoked_at = NOW(), revoked_reason = $3, updated_at = NOW()
             WHERE principal_id = $1 AND session_id = $2 AND revoked_at IS NULL",
        )
        .bind(principal_id)
        .bind(session_id)
        .bind(reason.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Revoke all non-revoked sessions for a principal in one statement.
    /// Returns the count of revoked sessions.
    pub async fn revoke_all_for_principal(
        pool: &PgPool,
        principal_id: &str,
        reason: RevocationReason,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions
             SET revoked_at = NOW(), revoked_reason = $2, updated_at = NOW()
             WHERE principal_id = $1 AND revoked_at IS NULL",
        )
        .bind(principal_id)
        .bind(reason.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Count live sessions for a principal.
    pub async fn count_active(pool: &PgPool, principal_id: &str) -> Result<i64, sqlx::Error> {
        let query = format!("SELECT COUNT(*) FROM sessions WHERE principal_id = $1 AND {ACTIVE}");
        sqlx::query_scalar::<_, i64>(&query)
            .bind(principal_id)
            .fetch_one(pool)
            .await
    }

    /// The live session created first. Ties fall back to insertion order.
    pub async fn oldest_active(
        pool: &PgPool,
        principal_id: &str,
    ) -> Result<Option<SessionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sessions
             WHERE principal_id = $1 AND {ACTIVE}
             ORDER BY created_at ASC, id ASC
             LIMIT 1"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(principal_id)
            .fetch_optional(pool)
            .await
    }

    /// Live sessions bound to one device.
    pub async fn find_active_by_device(
        pool: &PgPool,
        principal_id: &str,
        device_id: &str,
    ) -> Result<Vec<SessionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sessions
             WHERE principal_id = $1 AND device_id = $2 AND {ACTIVE}
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(principal_id)
            .bind(device_id)
            .fetch_all(pool)
            .await
    }

    /// Live sessions for a principal, newest first.
    pub async fn list_active(
        pool: &PgPool,
        principal_id: &str,
    ) -> Result<Vec<SessionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM sessions
             WHERE principal_id = $1 AND {ACTIVE}
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, SessionRow>(&query)
            .bind(principal_id)
            .fetch_all(pool)
            .await
    }

    /// Advance `last_seen_at` and `refresh_count` with an atomic increment.
    pub async fn touch(
        pool: &PgPool,
        principal_id: &str,
        session_id: Uuid,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions
             SET last_seen_at = NOW(), refresh_count = refresh_count + 1, updated_at = NOW()
             WHERE principal_id = $1 AND session_id = $2 AND revoked_at IS NULL",
        )
        .bind(principal_id)
        .bind(session_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Insert `replacement`, then revoke the parent as `rotated`, in one
    /// transaction.
    ///
    /// The revoke is conditional on `revoked_at IS NULL`. Two concurrent
    /// rotations of the same parent serialize on its row lock; the loser's
    /// update matches nothing, its transaction is rolled back and its
    /// replacement never becomes visible.
    pub async fn rotate(
        pool: &PgPool,
        principal_id: &str,
        old_session_id: Uuid,
        replacement: &Session,
    ) -> Result<RotateResult, sqlx::Error> {
        let mut tx: Transaction<'_, Postgres> = pool.begin().await?;

        bind_insert(replacement).execute(&mut *tx).await?;

        let revoked = sqlx::query(
            "UPDATE sessions
             SET revoked_at = NOW(), revoked_reason = $3, updated_at = NOW()
             WHERE principal_id = $1 AND session_id = $2 AND revoked_at IS NULL",
        )
        .bind(principal_id)
        .bind(old_session_id)
        .bind(RevocationReason::Rotated.as_str())
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            let current = Self::find(pool, principal_id, old_session_id).await?;
            return Ok(RotateResult::NotRotated(current));
        }

        tx.commit().await?;
        Ok(RotateResult::Rotated)
    }

    /// Revoke the live rows of the session's device as `replaced` and insert
    /// the session, in one transaction. Returns the revoked session ids.
    ///
    /// A transaction-scoped advisory lock keyed on `(principal_id, device_id)`
    /// serializes concurrent issues for one device; the second caller sees
    /// and revokes the first caller's committed row.
    pub async fn insert_replacing_device(
        pool: &PgPool,
        session: &Session,
    ) -> Result<Vec<Uuid>, sqlx::Error> {
        let Some(device_id) = session.device.device_id.as_deref() else {
            Self::insert(pool, session).await?;
            return Ok(Vec::new());
        };

        let mut tx: Transaction<'_, Postgres> = pool.begin().await?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), hashtext($2))")
            .bind(session.principal_id.as_str())
            .bind(device_id)
            .execute(&mut *tx)
            .await?;

        let query = format!(
            "UPDATE sessions
             SET revoked_at = NOW(), revoked_reason = $3, updated_at = NOW()
             WHERE principal_id = $1 AND device_id = $2 AND {ACTIVE}
             RETURNING session_id"
        );
        let replaced = sqlx::query_scalar::<_, Uuid>(&query)
            .bind(session.principal_id.as_str())
            .bind(device_id)
            .bind(RevocationReason::Replaced.as_str())
            .fetch_all(&mut *tx)
            .await?;

        bind_insert(session).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(replaced)
    }

    /// Stamp every expired, non-revoked row as `expired`. Returns the count.
    pub async fn revoke_expired(pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE sessions
             SET revoked_at = NOW(), revoked_reason = $1, updated_at = NOW()
             WHERE revoked_at IS NULL AND expires_at <= NOW()",
        )
        .bind(RevocationReason::Expired.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}

fn bind_insert(
    session: &Session,
) -> sqlx::query::Query<'_, Postgres, sqlx::postgres::PgArguments> {
    sqlx::query(INSERT)
        .bind(session.principal_id.as_str())
        .bind(session.session_id.as_uuid())
        .bind(&session.refresh_token_digest)
        .bind(&session.device.device_id)
        .bind(&session.device.device_name)
        .bind(&session.device.platform)
        .bind(&session.device.user_agent)
        .bind(&session.device.origin_ip)
        .bind(session.expires_at)
        .bind(session.last_seen_at)
        .bind(session.refresh_count)
        .bind(session.created_at)
}
