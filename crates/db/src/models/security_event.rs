//! Security event row model and DTO.

use sqlx::FromRow;
use tokenward_core::types::Timestamp;
use uuid::Uuid;

/// A row from the `security_events` table.
#[derive(Debug, Clone, FromRow)]
pub struct SecurityEventRow {
    pub id: i64,
    pub kind: String,
    pub severity: String,
    pub principal_id: Option<String>,
    pub session_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub occurred_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for appending a security event.
#[derive(Debug, Clone)]
pub struct CreateSecurityEvent {
    pub kind: String,
    pub severity: String,
    pub principal_id: Option<String>,
    pub session_id: Option<Uuid>,
    pub metadata: serde_json::Value,
    pub occurred_at: Timestamp,
}
