//! Per-principal session concurrency enforcement.
//!
//! Runs at issuance time, before the new row is inserted:
//!
//! 1. **replace** -- live sessions on the incoming device are revoked as
//!    `replaced`. An unknown device (no `device_id`) matches nothing.
//! 2. **limit** -- when the principal already holds `max_active_sessions`
//!    live sessions, the single oldest one is revoked as `limit_eviction`.
//!    Exactly one row per issuance, never a bulk purge.
//!
//! The replace pass here runs before the limit check so a same-device row
//! does not count against the cap. Issues racing on one device are settled
//! by [`SessionStore::insert_replacing_device`] when the row is written.

use tokenward_core::session::{DeviceInfo, RevocationReason};
use tokenward_core::store::{SessionStore, StoreError};
use tokenward_core::types::{PrincipalId, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyPolicy {
    /// One live session per device.
    pub replace_by_device: bool,
    /// Cap on live sessions per principal. `None` disables the cap.
    pub max_active_sessions: Option<u32>,
}

impl Default for ConcurrencyPolicy {
    fn default() -> Self {
        Self {
            replace_by_device: true,
            max_active_sessions: Some(5),
        }
    }
}

impl ConcurrencyPolicy {
    /// Whether a new session on `device` must displace that device's others.
    pub fn replaces_device(&self, device: &DeviceInfo) -> bool {
        self.replace_by_device && device.device_id.is_some()
    }
}

/// A session revoked to make room for a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eviction {
    pub session_id: SessionId,
    pub reason: RevocationReason,
}

/// Apply `policy` for an upcoming issuance and return what was revoked.
pub async fn enforce(
    store: &dyn SessionStore,
    policy: &ConcurrencyPolicy,
    principal_id: &PrincipalId,
    device: &DeviceInfo,
) -> Result<Vec<Eviction>, StoreError> {
    let mut evictions = Vec::new();

    if policy.replaces_device(device) {
        if let Some(device_id) = device.device_id.as_deref() {
            for existing in store.find_active_by_device(principal_id, device_id).await? {
                if store
                    .revoke(principal_id, &existing.session_id, RevocationReason::Replaced)
                    .await?
                {
                    evictions.push(Eviction {
                        session_id: existing.session_id,
                        reason: RevocationReason::Replaced,
                    });
                }
            }
        }
    }

    if let Some(max) = policy.max_active_sessions.filter(|max| *max > 0) {
        if store.count_active(principal_id).await? >= u64::from(max) {
            if let Some(oldest) = store.oldest_active(principal_id).await? {
                if store
                    .revoke(principal_id, &oldest.session_id, RevocationReason::LimitEviction)
                    .await?
                {
                    evictions.push(Eviction {
                        session_id: oldest.session_id,
                        reason: RevocationReason::LimitEviction,
                    });
                }
            }
        }
    }

    Ok(evictions)
}
