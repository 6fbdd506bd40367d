//! Read-only view of an account as the session engine needs it.

use serde::{Deserialize, Serialize};

use crate::types::PrincipalId;

/// Snapshot of a principal taken at issuance or rotation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalSnapshot {
    pub principal_id: PrincipalId,
    pub display_name: String,
    /// Incremented every time the account's authentication secret changes.
    /// Tokens carrying an older value are stale.
    pub credential_version: i64,
    pub roles: Vec<String>,
    /// When set, login requires a passed MFA gate before tokens are issued.
    #[serde(default)]
    pub mfa_enabled: bool,
}

impl PrincipalSnapshot {
    pub fn new(principal_id: impl Into<PrincipalId>, display_name: impl Into<String>) -> Self {
        Self {
            principal_id: principal_id.into(),
            display_name: display_name.into(),
            credential_version: 1,
            roles: Vec::new(),
            mfa_enabled: false,
        }
    }

    pub fn with_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles = roles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_credential_version(mut self, version: i64) -> Self {
        self.credential_version = version;
        self
    }

    pub fn with_mfa(mut self, enabled: bool) -> Self {
        self.mfa_enabled = enabled;
        self
    }
}
