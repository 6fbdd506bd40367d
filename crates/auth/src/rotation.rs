//! Refresh-token rotation and reuse detection.
//!
//! Given the stored session row for a verified refresh token, classify the
//! presentation. Checks run in a fixed order and stop at the first failure:
//!
//! 1. row absent -> `ExpiredOrMissing`
//! 2. row revoked as `rotated` -> reuse (replay of a consumed token);
//!    revoked for any other reason -> `ExpiredOrMissing`
//! 3. row expired -> `ExpiredOrMissing`
//! 4. digest of the presented token differs from the stored one -> reuse
//!    (forged or substituted token for a live session)
//! 5. token's credential version differs from the principal's -> `CredentialStale`
//!
//! Everything here is pure. Side effects (mass revocation, events, the new
//! row) are driven by [`crate::service::SessionService::rotate`].

use tokenward_core::principal::PrincipalSnapshot;
use tokenward_core::session::{RevocationReason, Session};
use tokenward_core::types::Timestamp;

use crate::error::Rejection;

/// Which reuse signal fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReuseSignal {
    /// A token whose session was already rotated was presented again.
    RotatedReplay,
    /// The presented token does not match the live session's digest.
    DigestMismatch,
}

impl ReuseSignal {
    /// Reason written to every session revoked in response.
    pub fn revocation_reason(&self) -> RevocationReason {
        match self {
            ReuseSignal::RotatedReplay => RevocationReason::ReuseDetectedRotated,
            ReuseSignal::DigestMismatch => RevocationReason::ReuseDetectedHashMismatch,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReuseSignal::RotatedReplay => "rotated_replay",
            ReuseSignal::DigestMismatch => "digest_mismatch",
        }
    }
}

/// Outcome of presenting a refresh token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Valid,
    ReusedTokenDetected(ReuseSignal),
    ExpiredOrMissing,
    CredentialStale,
}

impl RefreshState {
    /// `None` for `Valid`.
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            RefreshState::Valid => None,
            RefreshState::ReusedTokenDetected(_) => Some(Rejection::ReusedTokenDetected),
            RefreshState::ExpiredOrMissing => Some(Rejection::ExpiredOrMissing),
            RefreshState::CredentialStale => Some(Rejection::CredentialStale),
        }
    }
}

/// Steps 1-4: classify the stored row against the presented token's digest.
pub fn inspect_session(
    row: Option<&Session>,
    presented_digest: &str,
    now: Timestamp,
) -> RefreshState {
    let Some(session) = row else {
        return RefreshState::ExpiredOrMissing;
    };

    match session.revoked_reason() {
        Some(RevocationReason::Rotated) => {
            return RefreshState::ReusedTokenDetected(ReuseSignal::RotatedReplay)
        }
        Some(_) => return RefreshState::ExpiredOrMissing,
        None => {}
    }

    if session.is_expired_at(now) {
        return RefreshState::ExpiredOrMissing;
    }

    // Exact byte comparison of the hex digests.
    if session.refresh_token_digest.as_bytes() != presented_digest.as_bytes() {
        return RefreshState::ReusedTokenDetected(ReuseSignal::DigestMismatch);
    }

    RefreshState::Valid
}

/// Step 5. A principal that no longer exists is treated as missing.
pub fn check_credential_version(
    token_version: i64,
    principal: Option<&PrincipalSnapshot>,
) -> RefreshState {
    match principal {
        None => RefreshState::ExpiredOrMissing,
        Some(p) if p.credential_version != token_version => RefreshState::CredentialStale,
        Some(_) => RefreshState::Valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tokenward_core::hashing::refresh_token_digest;
    use tokenward_core::session::{DeviceInfo, Revocation};
    use tokenward_core::types::{PrincipalId, SessionId};

    const RAW: &str = "raw.refresh.token";

    fn live_session() -> Session {
        let now = Utc::now();
        Session::new(
            PrincipalId::new("p"),
            SessionId::generate(),
            refresh_token_digest(RAW),
            DeviceInfo::default(),
            now - Duration::hours(1),
            now + Duration::days(1),
        )
    }

    fn revoked(reason: RevocationReason) -> Session {
        let mut session = live_session();
        session.revocation = Some(Revocation {
            revoked_at: Utc::now(),
            reason,
        });
        session
    }

    #[test]
    fn absent_row_is_missing() {
        let state = inspect_session(None, &refresh_token_digest(RAW), Utc::now());
        assert_eq!(state, RefreshState::ExpiredOrMissing);
    }

    #[test]
    fn rotated_row_is_replay() {
        let row = revoked(RevocationReason::Rotated);
        let state = inspect_session(Some(&row), &refresh_token_digest(RAW), Utc::now());
        assert_eq!(state, RefreshState::ReusedTokenDetected(ReuseSignal::RotatedReplay));
    }

    #[test]
    fn other_revocations_are_ordinary() {
        for reason in [
            RevocationReason::Replaced,
            RevocationReason::LimitEviction,
            RevocationReason::Manual,
            RevocationReason::Expired,
            RevocationReason::ReuseDetectedRotated,
            RevocationReason::ReuseDetectedHashMismatch,
        ] {
            let row = revoked(reason);
            let state = inspect_session(Some(&row), &refresh_token_digest(RAW), Utc::now());
            assert_eq!(state, RefreshState::ExpiredOrMissing, "reason {reason}");
        }
    }

    #[test]
    fn expired_row_is_missing() {
        let mut row = live_session();
        row.expires_at = Utc::now() - Duration::seconds(1);
        let state = inspect_session(Some(&row), &refresh_token_digest(RAW), Utc::now());
        assert_eq!(state, RefreshState::ExpiredOrMissing);
    }

    #[test]
    fn revocation_is_checked_before_expiry() {
        let mut row = revoked(RevocationReason::Rotated);
        row.expires_at = Utc::now() - Duration::seconds(1);
        let state = inspect_session(Some(&row), &refresh_token_digest(RAW), Utc::now());
        assert_eq!(state, RefreshState::ReusedTokenDetected(ReuseSignal::RotatedReplay));
    }

    #[test]
    fn digest_mismatch_on_live_row_is_reuse() {
        let row = live_session();
        let state = inspect_session(Some(&row), &refresh_token_digest("other"), Utc::now());
        assert_eq!(state, RefreshState::ReusedTokenDetected(ReuseSignal::DigestMismatch));
    }

    #[test]
    fn matching_live_row_is_valid() {
        let row = live_session();
        let state = inspect_session(Some(&row), &refresh_token_digest(RAW), Utc::now());
        assert_eq!(state, RefreshState::Valid);
    }

    #[test]
    fn credential_version_checks() {
        let principal = PrincipalSnapshot::new("p", "P").with_credential_version(2);
        assert_eq!(check_credential_version(2, Some(&principal)), RefreshState::Valid);
        assert_eq!(
            check_credential_version(1, Some(&principal)),
            RefreshState::CredentialStale
        );
        assert_eq!(check_credential_version(2, None), RefreshState::ExpiredOrMissing);
    }

    #[test]
    fn signals_map_to_distinct_reasons() {
        assert_eq!(
            ReuseSignal::RotatedReplay.revocation_reason(),
            RevocationReason::ReuseDetectedRotated
        );
        assert_eq!(
            ReuseSignal::DigestMismatch.revocation_reason(),
            RevocationReason::ReuseDetectedHashMismatch
        );
        assert_eq!(
            RefreshState::CredentialStale.rejection(),
            Some(Rejection::CredentialStale)
        );
        assert_eq!(RefreshState::Valid.rejection(), None);
    }
}
