//! The persisted session record and its revocation vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{PrincipalId, SessionId, Timestamp};

// ---------------------------------------------------------------------------
// RevocationReason
// ---------------------------------------------------------------------------

/// Why a session row stopped being valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    /// Consumed by a successful refresh; a child session replaced it.
    Rotated,
    /// A newer login from the same device took its place.
    Replaced,
    /// Evicted as the oldest session when the per-principal cap was reached.
    LimitEviction,
    /// Mass revocation after an already-rotated refresh token was replayed.
    ReuseDetectedRotated,
    /// Mass revocation after a token's digest did not match a live session.
    ReuseDetectedHashMismatch,
    /// Explicit logout.
    Manual,
    /// Marked by the expiry sweeper after `expires_at` passed.
    Expired,
}

impl RevocationReason {
    pub const ALL: [RevocationReason; 7] = [
        RevocationReason::Rotated,
        RevocationReason::Replaced,
        RevocationReason::LimitEviction,
        RevocationReason::ReuseDetectedRotated,
        RevocationReason::ReuseDetectedHashMismatch,
        RevocationReason::Manual,
        RevocationReason::Expired,
    ];

    /// Text stored in the `revoked_reason` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Rotated => "rotated",
            RevocationReason::Replaced => "replaced",
            RevocationReason::LimitEviction => "limit_eviction",
            RevocationReason::ReuseDetectedRotated => "reuse_detected_rotated",
            RevocationReason::ReuseDetectedHashMismatch => "reuse_detected_hash_mismatch",
            RevocationReason::Manual => "manual",
            RevocationReason::Expired => "expired",
        }
    }

    pub fn is_reuse_detected(&self) -> bool {
        matches!(
            self,
            RevocationReason::ReuseDetectedRotated | RevocationReason::ReuseDetectedHashMismatch
        )
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RevocationReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RevocationReason::ALL
            .into_iter()
            .find(|reason| reason.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown revocation reason '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Device metadata
// ---------------------------------------------------------------------------

/// Descriptive, non-authoritative metadata about the client holding a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable client-side device identifier. `None` means unknown device, in
    /// which case the per-device replace policy cannot match anything.
    pub device_id: Option<String>,
    pub device_name: Option<String>,
    pub platform: Option<String>,
    pub user_agent: Option<String>,
    pub origin_ip: Option<String>,
}

impl DeviceInfo {
    pub fn with_device_id(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Revocation stamp. `revoked_at` and `reason` only ever travel together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub revoked_at: Timestamp,
    pub reason: RevocationReason,
}

/// One row per `(principal_id, session_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub principal_id: PrincipalId,
    pub session_id: SessionId,
    /// SHA-256 hex digest of the current refresh token. Never the token itself.
    pub refresh_token_digest: String,
    pub device: DeviceInfo,
    pub created_at: Timestamp,
    /// Mirrors the refresh token's `exp`; authoritative for liveness.
    pub expires_at: Timestamp,
    pub revocation: Option<Revocation>,
    pub last_seen_at: Option<Timestamp>,
    pub refresh_count: i64,
}

impl Session {
    /// A fresh, non-revoked session row.
    pub fn new(
        principal_id: PrincipalId,
        session_id: SessionId,
        refresh_token_digest: String,
        device: DeviceInfo,
        created_at: Timestamp,
        expires_at: Timestamp,
    ) -> Self {
        Self {
            principal_id,
            session_id,
            refresh_token_digest,
            device,
            created_at,
            expires_at,
            revocation: None,
            last_seen_at: None,
            refresh_count: 0,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revocation.is_some()
    }

    pub fn revoked_reason(&self) -> Option<RevocationReason> {
        self.revocation.map(|r| r.reason)
    }

    pub fn is_expired_at(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }

    /// Not revoked and not yet expired.
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        !self.is_revoked() && !self.is_expired_at(now)
    }

    pub fn matches_device(&self, device_id: &str) -> bool {
        self.device.device_id.as_deref() == Some(device_id)
    }
}
