//! Issuance, concurrency policy, login and logout against the in-memory
//! store.

mod common;

use assert_matches::assert_matches;
use common::{device, harness, limit_only, pid, principal, PASSWORD};
use tokenward_auth::{ConcurrencyPolicy, LoginAttempt, Rejection, SessionError};
use tokenward_core::hashing::refresh_token_digest;
use tokenward_core::security::SecurityEventKind;
use tokenward_core::session::{DeviceInfo, RevocationReason};
use tokenward_core::store::SessionStore;
use tokenward_core::types::PrincipalId;

// ---------------------------------------------------------------------------
// Issue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn issue_persists_digest_not_token() {
    let h = harness(ConcurrencyPolicy::default()).await;
    let pair = h.service.issue(&principal("acct_p"), device("phone")).await.unwrap();

    let row = h.row(pair.session_id).await;
    assert_eq!(row.refresh_token_digest, refresh_token_digest(&pair.refresh_token));
    assert_ne!(row.refresh_token_digest, pair.refresh_token);
    assert_eq!(row.expires_at, pair.refresh_expires_at);
    assert!(pair.access_expires_at < pair.refresh_expires_at);
    assert_eq!(row.device, device("phone"));
    assert_eq!(h.events.count(SecurityEventKind::SessionIssued), 1);
}

#[tokio::test]
async fn issued_access_token_authenticates() {
    let h = harness(ConcurrencyPolicy::default()).await;
    let pair = h.service.issue(&principal("acct_p"), device("phone")).await.unwrap();

    let claims = h.service.authenticate(&pair.access_token).await.unwrap();
    assert_eq!(claims.sub, pid());
    assert_eq!(claims.jti, pair.session_id);
    assert_eq!(claims.roles, vec!["member".to_string()]);

    // Refresh tokens are not access tokens.
    assert_matches!(
        h.service.authenticate(&pair.refresh_token).await,
        Err(SessionError::Rejected(Rejection::Malformed))
    );
}

// ---------------------------------------------------------------------------
// Concurrency policy
// ---------------------------------------------------------------------------

#[tokio::test]
async fn same_device_keeps_one_live_session() {
    let h = harness(ConcurrencyPolicy::default()).await;
    let first = h.service.issue(&principal("acct_p"), device("phone")).await.unwrap();
    let second = h.service.issue(&principal("acct_p"), device("phone")).await.unwrap();

    let live_on_phone = h.store.find_active_by_device(&pid(), "phone").await.unwrap();
    assert_eq!(live_on_phone.len(), 1);
    assert_eq!(live_on_phone[0].session_id, second.session_id);
    assert_eq!(
        h.row(first.session_id).await.revoked_reason(),
        Some(RevocationReason::Replaced)
    );
    assert_eq!(h.events.count(SecurityEventKind::SessionEvicted), 1);
}

#[tokio::test]
async fn concurrent_issues_on_one_device() {
    let h = harness(ConcurrencyPolicy {
        replace_by_device: true,
        max_active_sessions: None,
    })
    .await;
    let p = principal("acct_p");

    let (a, b) = tokio::join!(
        h.service.issue(&p, device("phone")),
        h.service.issue(&p, device("phone")),
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    let live = h.store.find_active_by_device(&pid(), "phone").await.unwrap();
    assert_eq!(live.len(), 1);
    assert!([a.session_id, b.session_id].contains(&live[0].session_id));
    assert_eq!(h.events.count(SecurityEventKind::SessionEvicted), 1);
}

#[tokio::test]
async fn unknown_devices_are_never_replaced() {
    let h = harness(ConcurrencyPolicy {
        replace_by_device: true,
        max_active_sessions: None,
    })
    .await;

    for _ in 0..3 {
        h.service
            .issue(&principal("acct_p"), DeviceInfo::default())
            .await
            .unwrap();
    }
    assert_eq!(h.store.count_active(&pid()).await.unwrap(), 3);
}

#[tokio::test]
async fn limit_evicts_the_oldest_one_at_a_time() {
    let h = harness(limit_only(3)).await;
    let p = principal("acct_p");

    let mut issued = Vec::new();
    for name in ["a", "b", "c", "d"] {
        issued.push(h.service.issue(&p, device(name)).await.unwrap());
    }

    assert_eq!(h.store.count_active(&pid()).await.unwrap(), 3);
    assert_eq!(
        h.row(issued[0].session_id).await.revoked_reason(),
        Some(RevocationReason::LimitEviction)
    );
    let evicted = h
        .store
        .all_for_principal(&pid())
        .await
        .into_iter()
        .filter(|s| s.revoked_reason() == Some(RevocationReason::LimitEviction))
        .count();
    assert_eq!(evicted, 1);

    h.service.issue(&p, device("e")).await.unwrap();
    assert_eq!(h.store.count_active(&pid()).await.unwrap(), 3);
    assert_eq!(
        h.row(issued[1].session_id).await.revoked_reason(),
        Some(RevocationReason::LimitEviction)
    );
}

#[tokio::test]
async fn limits_are_per_principal() {
    let h = harness(limit_only(1)).await;
    h.directory.upsert(principal("acct_q")).await;

    let p = h.service.issue(&principal("acct_p"), device("a")).await.unwrap();
    h.service.issue(&principal("acct_q"), device("a")).await.unwrap();

    assert!(!h.row(p.session_id).await.is_revoked());
    assert_eq!(
        h.store.count_active(&PrincipalId::new("acct_q")).await.unwrap(),
        1
    );
}

// ---------------------------------------------------------------------------
// Login
// ---------------------------------------------------------------------------

#[tokio::test]
async fn login_with_correct_password_issues() {
    let h = harness(ConcurrencyPolicy::default()).await;
    let pair = h
        .service
        .login(LoginAttempt {
            principal_id: &pid(),
            password: PASSWORD,
            mfa_passed: false,
            device: device("phone"),
        })
        .await
        .unwrap();

    assert_eq!(h.active_ids().await, vec![pair.session_id]);
}

#[tokio::test]
async fn wrong_password_and_unknown_principal_look_alike() {
    let h = harness(ConcurrencyPolicy::default()).await;

    let wrong = h
        .service
        .login(LoginAttempt {
            principal_id: &pid(),
            password: "hunter2",
            mfa_passed: false,
            device: device("phone"),
        })
        .await
        .unwrap_err();
    let unknown = h
        .service
        .login(LoginAttempt {
            principal_id: &PrincipalId::new("nobody"),
            password: PASSWORD,
            mfa_passed: false,
            device: device("phone"),
        })
        .await
        .unwrap_err();

    assert_matches!(wrong, SessionError::InvalidCredentials);
    assert_matches!(unknown, SessionError::InvalidCredentials);
    assert_eq!(wrong.public_message(), unknown.public_message());
    assert_eq!(h.events.count(SecurityEventKind::LoginFailed), 2);
    assert_eq!(h.store.count_active(&pid()).await.unwrap(), 0);
}

#[tokio::test]
async fn mfa_gate_blocks_until_second_factor() {
    let h = harness(ConcurrencyPolicy::default()).await;
    h.directory.upsert(principal("acct_p").with_mfa(true)).await;

    let id = pid();
    let attempt = |mfa_passed| LoginAttempt {
        principal_id: &id,
        password: PASSWORD,
        mfa_passed,
        device: device("phone"),
    };

    assert_matches!(
        h.service.login(attempt(false)).await,
        Err(SessionError::MfaRequired)
    );
    assert_eq!(h.store.count_active(&pid()).await.unwrap(), 0);

    h.service.login(attempt(true)).await.unwrap();
    assert_eq!(h.store.count_active(&pid()).await.unwrap(), 1);
}

// ---------------------------------------------------------------------------
// Logout and listing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn logout_is_idempotent() {
    let h = harness(ConcurrencyPolicy::default()).await;
    let pair = h.service.issue(&principal("acct_p"), device("phone")).await.unwrap();

    assert!(h.service.logout(&pid(), &pair.session_id).await.unwrap());
    assert!(!h.service.logout(&pid(), &pair.session_id).await.unwrap());
    assert_eq!(
        h.row(pair.session_id).await.revoked_reason(),
        Some(RevocationReason::Manual)
    );
    assert_eq!(h.events.count(SecurityEventKind::SessionRevoked), 1);
}

#[tokio::test]
async fn logout_all_revokes_every_session() {
    let h = harness(ConcurrencyPolicy::default()).await;
    for name in ["a", "b", "c"] {
        h.service.issue(&principal("acct_p"), device(name)).await.unwrap();
    }

    assert_eq!(h.service.logout_all(&pid()).await.unwrap(), 3);
    assert!(h.service.list_active(&pid()).await.unwrap().is_empty());
    assert!(h
        .store
        .all_for_principal(&pid())
        .await
        .iter()
        .all(|s| s.revoked_reason() == Some(RevocationReason::Manual)));
}

#[tokio::test]
async fn list_active_is_newest_first() {
    let h = harness(ConcurrencyPolicy::default()).await;
    let first = h.service.issue(&principal("acct_p"), device("a")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = h.service.issue(&principal("acct_p"), device("b")).await.unwrap();

    let listed: Vec<_> = h
        .service
        .list_active(&pid())
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.session_id)
        .collect();
    assert_eq!(listed, vec![second.session_id, first.session_id]);
}
