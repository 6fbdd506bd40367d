//! Repository for the append-only `security_events` table.

use sqlx::PgPool;

use crate::models::security_event::{CreateSecurityEvent, SecurityEventRow};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, kind, severity, principal_id, session_id, metadata, occurred_at, \
                       created_at, updated_at";

pub struct SecurityEventRepo;

impl SecurityEventRepo {
    /// Append one event, returning its id.
    pub async fn insert(pool: &PgPool, input: &CreateSecurityEvent) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO security_events (kind, severity, principal_id, session_id, metadata, occurred_at)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING id",
        )
        .bind(&input.kind)
        .bind(&input.severity)
        .bind(&input.principal_id)
        .bind(input.session_id)
        .bind(&input.metadata)
        .bind(input.occurred_at)
        .fetch_one(pool)
        .await
    }

    /// Most recent events for a principal, newest first.
    pub async fn list_for_principal(
        pool: &PgPool,
        principal_id: &str,
        limit: i64,
    ) -> Result<Vec<SecurityEventRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM security_events
             WHERE principal_id = $1
             ORDER BY occurred_at DESC, id DESC
             LIMIT $2"
        );
        sqlx::query_as::<_, SecurityEventRow>(&query)
            .bind(principal_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
