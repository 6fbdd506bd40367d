//! External collaborators consumed by the engine.
//!
//! Account storage and password hashing live elsewhere; the engine only
//! reads principal snapshots and asks for a yes/no password verdict.

use std::collections::HashMap;

use async_trait::async_trait;
use tokenward_core::error::CoreError;
use tokenward_core::principal::PrincipalSnapshot;
use tokenward_core::types::PrincipalId;
use tokio::sync::RwLock;

/// Source of truth for principals and their current credential version.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn find(&self, principal_id: &PrincipalId)
        -> Result<Option<PrincipalSnapshot>, CoreError>;
}

/// Black-box password check.
#[async_trait]
pub trait PasswordVerifier: Send + Sync {
    async fn verify(&self, principal: &PrincipalSnapshot, plaintext: &str)
        -> Result<bool, CoreError>;
}

/// In-process [`PrincipalDirectory`].
#[derive(Default)]
pub struct MemoryDirectory {
    principals: RwLock<HashMap<PrincipalId, PrincipalSnapshot>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, principal: PrincipalSnapshot) {
        self.principals
            .write()
            .await
            .insert(principal.principal_id.clone(), principal);
    }

    /// Increment the credential version, as a password reset would. Returns
    /// the updated snapshot.
    pub async fn bump_credential_version(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<PrincipalSnapshot, CoreError> {
        let mut principals = self.principals.write().await;
        let principal = principals
            .get_mut(principal_id)
            .ok_or_else(|| CoreError::NotFound {
                entity: "principal",
                id: principal_id.to_string(),
            })?;
        principal.credential_version += 1;
        Ok(principal.clone())
    }
}

#[async_trait]
impl PrincipalDirectory for MemoryDirectory {
    async fn find(
        &self,
        principal_id: &PrincipalId,
    ) -> Result<Option<PrincipalSnapshot>, CoreError> {
        Ok(self.principals.read().await.get(principal_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn bump_increments_version() {
        let directory = MemoryDirectory::new();
        directory
            .upsert(PrincipalSnapshot::new("acct_1", "Ada").with_credential_version(3))
            .await;

        let updated = directory
            .bump_credential_version(&PrincipalId::new("acct_1"))
            .await
            .unwrap();
        assert_eq!(updated.credential_version, 4);

        let found = directory.find(&PrincipalId::new("acct_1")).await.unwrap().unwrap();
        assert_eq!(found.credential_version, 4);
    }

    #[tokio::test]
    async fn bump_unknown_principal_is_not_found() {
        let directory = MemoryDirectory::new();
        assert_matches!(
            directory.bump_credential_version(&PrincipalId::new("ghost")).await,
            Err(CoreError::NotFound { entity: "principal", .. })
        );
    }
}
