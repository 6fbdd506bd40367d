//! Session row model and its mapping to the domain [`Session`].

use sqlx::FromRow;
use tokenward_core::session::{DeviceInfo, Revocation, RevocationReason, Session};
use tokenward_core::store::StoreError;
use tokenward_core::types::{PrincipalId, SessionId, Timestamp};
use uuid::Uuid;

/// A row from the `sessions` table.
#[derive(Debug, Clone, FromRow)]
pub struct SessionRow {
    pub id: i64,
    pub principal_id: String,
    pub session_id: Uuid,
    pub refresh_token_digest: String,
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub platform: Option<String>,
    pub user_agent: Option<String>,
    pub origin_ip: Option<String>,
    pub expires_at: Timestamp,
    pub revoked_at: Option<Timestamp>,
    pub revoked_reason: Option<String>,
    pub last_seen_at: Option<Timestamp>,
    pub refresh_count: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let revocation = match (row.revoked_at, row.revoked_reason) {
            (None, None) => None,
            (Some(revoked_at), Some(reason)) => {
                let reason: RevocationReason = reason
                    .parse()
                    .map_err(|e| StoreError::Corrupt(format!("session row {}: {e}", row.id)))?;
                Some(Revocation { revoked_at, reason })
            }
            _ => {
                return Err(StoreError::Corrupt(format!(
                    "session row {} has revoked_at without revoked_reason",
                    row.id
                )))
            }
        };

        Ok(Session {
            principal_id: PrincipalId::new(row.principal_id),
            session_id: SessionId::from_uuid(row.session_id),
            refresh_token_digest: row.refresh_token_digest,
            device: DeviceInfo {
                device_id: row.device_id,
                device_name: row.device_name,
                platform: row.platform,
                user_agent: row.user_agent,
                origin_ip: row.origin_ip,
            },
            created_at: row.created_at,
            expires_at: row.expires_at,
            revocation,
            last_seen_at: row.last_seen_at,
            refresh_count: row.refresh_count,
        })
    }
}
