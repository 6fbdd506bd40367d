//! Security event vocabulary and metadata redaction.
//!
//! Event kinds live here, next to the session types, so both the engine that
//! emits them and the persistence layer that stores them agree on the names.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// What happened to a principal's credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    SessionIssued,
    SessionRotated,
    SessionEvicted,
    SessionRevoked,
    /// A consumed or forged refresh token was presented.
    RefreshReuseDetected,
    SessionsMassRevoked,
    CredentialStale,
    CredentialChanged,
    LoginFailed,
    SessionsExpired,
}

/// How loudly an event should be surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl SecurityEventKind {
    /// Name stored in the `security_events.kind` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventKind::SessionIssued => "session_issued",
            SecurityEventKind::SessionRotated => "session_rotated",
            SecurityEventKind::SessionEvicted => "session_evicted",
            SecurityEventKind::SessionRevoked => "session_revoked",
            SecurityEventKind::RefreshReuseDetected => "refresh_reuse_detected",
            SecurityEventKind::SessionsMassRevoked => "sessions_mass_revoked",
            SecurityEventKind::CredentialStale => "credential_stale",
            SecurityEventKind::CredentialChanged => "credential_changed",
            SecurityEventKind::LoginFailed => "login_failed",
            SecurityEventKind::SessionsExpired => "sessions_expired",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            SecurityEventKind::RefreshReuseDetected | SecurityEventKind::SessionsMassRevoked => {
                Severity::Critical
            }
            SecurityEventKind::LoginFailed
            | SecurityEventKind::CredentialStale
            | SecurityEventKind::SessionEvicted => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

// ---------------------------------------------------------------------------
// Sensitive field redaction
// ---------------------------------------------------------------------------

/// Metadata keys whose values must never reach the audit trail.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "digest",
    "authorization",
    "credential_hash",
    "private_key",
];

/// Redact sensitive fields from event metadata, recursing into nested values.
///
/// Replaces the value of any key containing one of [`SENSITIVE_FIELDS`] with
/// `"[REDACTED]"`.
pub fn redact_sensitive_fields(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let lower_key = key.to_lowercase();
                if SENSITIVE_FIELDS.iter().any(|f| lower_key.contains(f)) {
                    redacted.insert(
                        key.clone(),
                        serde_json::Value::String("[REDACTED]".to_string()),
                    );
                } else {
                    redacted.insert(key.clone(), redact_sensitive_fields(val));
                }
            }
            serde_json::Value::Object(redacted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(redact_sensitive_fields).collect())
        }
        other => other.clone(),
    }
}
