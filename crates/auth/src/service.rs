//! The session lifecycle facade.
//!
//! [`SessionService`] is stateless between calls: every invariant it relies
//! on is enforced by the [`SessionStore`]'s atomic operations. Side effects
//! that must not delay a response (mass revocation, `touch`) are handed to
//! the [`BackgroundDispatcher`].

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tokio::task::JoinHandle;
use tokenward_core::hashing::refresh_token_digest;
use tokenward_core::principal::PrincipalSnapshot;
use tokenward_core::security::SecurityEventKind;
use tokenward_core::session::{DeviceInfo, RevocationReason, Session};
use tokenward_core::store::{RotateOutcome, SessionStore};
use tokenward_core::types::{PrincipalId, SessionId, Timestamp};
use tokenward_events::{SecurityEvent, SecurityEventSink};

use crate::claims::{build_pair, Claims};
use crate::directory::{PasswordVerifier, PrincipalDirectory};
use crate::dispatcher::BackgroundDispatcher;
use crate::error::{Rejection, SessionError};
use crate::policy::{self, ConcurrencyPolicy, Eviction};
use crate::rotation::{check_credential_version, inspect_session, RefreshState, ReuseSignal};
use crate::signer::{SignedToken, TokenSigner};

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Collaborators the service is built from.
pub struct SessionServiceDeps {
    pub store: Arc<dyn SessionStore>,
    pub signer: Arc<dyn TokenSigner>,
    pub directory: Arc<dyn PrincipalDirectory>,
    pub passwords: Arc<dyn PasswordVerifier>,
    pub events: Arc<dyn SecurityEventSink>,
}

/// Tokens handed to the client after `issue`, `login` or `rotate`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub session_id: SessionId,
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: Timestamp,
    pub refresh_expires_at: Timestamp,
}

/// A password login. Rate limiting and IP gates run before this point.
#[derive(Debug, Clone)]
pub struct LoginAttempt<'a> {
    pub principal_id: &'a PrincipalId,
    pub password: &'a str,
    /// Whether the caller already completed a second factor.
    pub mfa_passed: bool,
    pub device: DeviceInfo,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    signer: Arc<dyn TokenSigner>,
    directory: Arc<dyn PrincipalDirectory>,
    passwords: Arc<dyn PasswordVerifier>,
    events: Arc<dyn SecurityEventSink>,
    policy: ConcurrencyPolicy,
    background: BackgroundDispatcher,
}

impl SessionService {
    /// Build the service and start its background worker.
    ///
    /// The worker stops once the service and all its clones are dropped.
    pub fn start(deps: SessionServiceDeps, policy: ConcurrencyPolicy) -> (Self, JoinHandle<()>) {
        let (background, handle) =
            BackgroundDispatcher::spawn(deps.store.clone(), deps.events.clone());
        let service = Self {
            store: deps.store,
            signer: deps.signer,
            directory: deps.directory,
            passwords: deps.passwords,
            events: deps.events,
            policy,
            background,
        };
        (service, handle)
    }

    pub fn policy(&self) -> &ConcurrencyPolicy {
        &self.policy
    }

    /// Mint a new session for an already-authenticated principal.
    ///
    /// Any failure aborts the whole issuance; no row is written unless both
    /// tokens were signed.
    pub async fn issue(
        &self,
        principal: &PrincipalSnapshot,
        device: DeviceInfo,
    ) -> Result<TokenPair, SessionError> {
        let session_id = SessionId::generate();

        // 1. Sign both tokens concurrently.
        let (access, refresh) = self.sign_pair(principal, session_id).await?;

        // 2. Make room according to the concurrency policy.
        let mut evictions =
            policy::enforce(self.store.as_ref(), &self.policy, &principal.principal_id, &device)
                .await?;

        // 3. Persist the session.
        let session = Session::new(
            principal.principal_id.clone(),
            session_id,
            refresh_token_digest(&refresh.token),
            device,
            Utc::now(),
            refresh.expires_at,
        );
        if self.policy.replaces_device(&session.device) {
            // Catches same-device rows committed by a concurrent issue.
            let raced = self.store.insert_replacing_device(&session).await?;
            evictions.extend(raced.into_iter().map(|session_id| Eviction {
                session_id,
                reason: RevocationReason::Replaced,
            }));
        } else {
            self.store.insert(&session).await?;
        }

        for eviction in &evictions {
            self.events.record(
                SecurityEvent::new(SecurityEventKind::SessionEvicted)
                    .with_principal(&principal.principal_id)
                    .with_session(eviction.session_id)
                    .with_metadata(json!({
                        "reason": eviction.reason.as_str(),
                        "new_session_id": session_id,
                    })),
            );
        }
        self.events.record(
            SecurityEvent::new(SecurityEventKind::SessionIssued)
                .with_principal(&principal.principal_id)
                .with_session(session_id)
                .with_metadata(json!({
                    "device_id": session.device.device_id,
                    "platform": session.device.platform,
                })),
        );

        tracing::info!(
            principal_id = %principal.principal_id,
            session_id = %session_id,
            evicted = evictions.len(),
            "Session issued",
        );

        Ok(pair(session_id, access, refresh))
    }

    /// Exchange a refresh token for a new pair, consuming the old session.
    pub async fn rotate(&self, raw_refresh_token: &str) -> Result<TokenPair, SessionError> {
        // 1. Signature, expiry, issuer and audience.
        let claims = self.signer.verify_refresh(raw_refresh_token).map_err(|e| {
            tracing::debug!(error = %e, "Refresh token failed verification");
            Rejection::Malformed
        })?;

        // 2. Session-state checks against the stored row.
        let row = self.store.find(&claims.sub, &claims.jti).await?;
        let state = inspect_session(
            row.as_ref(),
            &refresh_token_digest(raw_refresh_token),
            Utc::now(),
        );
        let old = match (state, row) {
            (RefreshState::Valid, Some(old)) => old,
            (RefreshState::ReusedTokenDetected(signal), _) => {
                return Err(self.reuse_detected(&claims, signal));
            }
            (state, _) => return Err(self.reject(&claims, state)),
        };

        // 3. Credential version against the principal's current value.
        let principal = self.directory.find(&claims.sub).await?;
        let principal = match (check_credential_version(claims.cver, principal.as_ref()), principal)
        {
            (RefreshState::Valid, Some(principal)) => principal,
            (state, _) => return Err(self.reject(&claims, state)),
        };

        // 4. Advisory bookkeeping on the consumed row.
        self.background.touch(&old.principal_id, old.session_id);

        // 5. Mint the child session. Device metadata carries over.
        let session_id = SessionId::generate();
        let (access, refresh) = self.sign_pair(&principal, session_id).await?;
        let now = Utc::now();
        let mut replacement = Session::new(
            old.principal_id.clone(),
            session_id,
            refresh_token_digest(&refresh.token),
            old.device.clone(),
            now,
            refresh.expires_at,
        );
        replacement.last_seen_at = Some(now);
        replacement.refresh_count = old.refresh_count + 1;

        // 6. Insert the child and revoke the parent in one atomic step.
        match self
            .store
            .rotate(&old.principal_id, &old.session_id, &replacement)
            .await?
        {
            RotateOutcome::Rotated => {}
            // A concurrent rotation consumed the same token first.
            RotateOutcome::Superseded(RevocationReason::Rotated) => {
                return Err(self.reuse_detected(&claims, ReuseSignal::RotatedReplay));
            }
            RotateOutcome::Superseded(_) | RotateOutcome::Missing => {
                return Err(self.reject(&claims, RefreshState::ExpiredOrMissing));
            }
        }

        self.events.record(
            SecurityEvent::new(SecurityEventKind::SessionRotated)
                .with_principal(&old.principal_id)
                .with_session(session_id)
                .with_metadata(json!({
                    "previous_session_id": old.session_id,
                    "refresh_count": replacement.refresh_count,
                })),
        );

        tracing::info!(
            principal_id = %old.principal_id,
            previous_session_id = %old.session_id,
            session_id = %session_id,
            "Session rotated",
        );

        Ok(pair(session_id, access, refresh))
    }

    /// Password login followed by [`issue`](Self::issue).
    ///
    /// Unknown principals and wrong passwords are indistinguishable.
    pub async fn login(&self, attempt: LoginAttempt<'_>) -> Result<TokenPair, SessionError> {
        // 1. Find the principal.
        let Some(principal) = self.directory.find(attempt.principal_id).await? else {
            self.login_failed(attempt.principal_id, "unknown_principal");
            return Err(SessionError::InvalidCredentials);
        };

        // 2. Verify the password.
        if !self.passwords.verify(&principal, attempt.password).await? {
            self.login_failed(attempt.principal_id, "bad_password");
            return Err(SessionError::InvalidCredentials);
        }

        // 3. Second factor gate.
        if principal.mfa_enabled && !attempt.mfa_passed {
            tracing::debug!(principal_id = %principal.principal_id, "Login needs MFA");
            return Err(SessionError::MfaRequired);
        }

        self.issue(&principal, attempt.device).await
    }

    /// Validate an access token and the session behind it.
    pub async fn authenticate(&self, access_token: &str) -> Result<Claims, SessionError> {
        let claims = self.signer.verify_access(access_token).map_err(|e| {
            tracing::debug!(error = %e, "Access token failed verification");
            Rejection::Malformed
        })?;

        let active = self
            .store
            .find_active(&claims.sub, &claims.jti)
            .await?
            .is_some_and(|s| s.is_active_at(Utc::now()));
        if !active {
            return Err(self.reject(&claims, RefreshState::ExpiredOrMissing));
        }

        let principal = self.directory.find(&claims.sub).await?;
        match check_credential_version(claims.cver, principal.as_ref()) {
            RefreshState::Valid => Ok(claims),
            state => Err(self.reject(&claims, state)),
        }
    }

    /// Revoke one session. Returns `false` if it was already gone.
    pub async fn logout(
        &self,
        principal_id: &PrincipalId,
        session_id: &SessionId,
    ) -> Result<bool, SessionError> {
        let revoked = self
            .store
            .revoke(principal_id, session_id, RevocationReason::Manual)
            .await?;
        if revoked {
            self.events.record(
                SecurityEvent::new(SecurityEventKind::SessionRevoked)
                    .with_principal(principal_id)
                    .with_session(*session_id)
                    .with_metadata(json!({ "reason": RevocationReason::Manual.as_str() })),
            );
            tracing::info!(principal_id = %principal_id, session_id = %session_id, "Logged out");
        }
        Ok(revoked)
    }

    /// Revoke every live session of a principal.
    pub async fn logout_all(&self, principal_id: &PrincipalId) -> Result<u64, SessionError> {
        let revoked = self
            .store
            .revoke_all_for_principal(principal_id, RevocationReason::Manual)
            .await?;
        self.events.record(
            SecurityEvent::new(SecurityEventKind::SessionsMassRevoked)
                .with_principal(principal_id)
                .with_metadata(json!({
                    "reason": RevocationReason::Manual.as_str(),
                    "revoked": revoked,
                })),
        );
        tracing::info!(principal_id = %principal_id, revoked, "Logged out everywhere");
        Ok(revoked)
    }

    /// Live sessions of a principal, newest first.
    pub async fn list_active(&self, principal_id: &PrincipalId) -> Result<Vec<Session>, SessionError> {
        Ok(self.store.list_active(principal_id).await?)
    }

    /// Record that a principal's credentials changed.
    ///
    /// Tokens minted before the change are refused by the credential version
    /// check; no sessions are revoked here.
    pub fn on_credential_changed(&self, principal: &PrincipalSnapshot) {
        self.events.record(
            SecurityEvent::new(SecurityEventKind::CredentialChanged)
                .with_principal(&principal.principal_id)
                .with_metadata(json!({ "credential_version": principal.credential_version })),
        );
        tracing::info!(
            principal_id = %principal.principal_id,
            credential_version = principal.credential_version,
            "Credential version advanced",
        );
    }

    /// Wait for queued background work to finish.
    pub async fn flush_background(&self) {
        self.background.flush().await;
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn sign_pair(
        &self,
        principal: &PrincipalSnapshot,
        session_id: SessionId,
    ) -> Result<(SignedToken, SignedToken), SessionError> {
        let (access_payload, refresh_payload) = build_pair(principal, session_id);
        let pair = tokio::try_join!(
            self.signer.sign_access(&access_payload),
            self.signer.sign_refresh(&refresh_payload),
        )?;
        Ok(pair)
    }

    /// Reuse path: dispatch mass revocation, alert, and refuse.
    fn reuse_detected(&self, claims: &Claims, signal: ReuseSignal) -> SessionError {
        let reason = signal.revocation_reason();
        tracing::warn!(
            principal_id = %claims.sub,
            session_id = %claims.jti,
            signal = signal.as_str(),
            "Refresh token reuse detected, revoking all sessions",
        );

        self.background.revoke_all(&claims.sub, reason);
        self.events.record(
            SecurityEvent::new(SecurityEventKind::RefreshReuseDetected)
                .with_principal(&claims.sub)
                .with_session(claims.jti)
                .with_metadata(json!({
                    "signal": signal.as_str(),
                    "reason": reason.as_str(),
                })),
        );

        SessionError::Rejected(Rejection::ReusedTokenDetected)
    }

    /// Non-reuse refusal. Only staleness is worth an audit event.
    fn reject(&self, claims: &Claims, state: RefreshState) -> SessionError {
        let rejection = state.rejection().unwrap_or(Rejection::ExpiredOrMissing);
        match rejection {
            Rejection::CredentialStale => {
                tracing::info!(
                    principal_id = %claims.sub,
                    session_id = %claims.jti,
                    credential_version_presented = claims.cver,
                    "Token predates credential change",
                );
                // Key names containing "token" are redacted before storage.
                self.events.record(
                    SecurityEvent::new(SecurityEventKind::CredentialStale)
                        .with_principal(&claims.sub)
                        .with_session(claims.jti)
                        .with_metadata(json!({ "credential_version_presented": claims.cver })),
                );
            }
            _ => {
                tracing::debug!(
                    principal_id = %claims.sub,
                    session_id = %claims.jti,
                    rejection = rejection.as_str(),
                    "Token rejected",
                );
            }
        }
        SessionError::Rejected(rejection)
    }

    fn login_failed(&self, principal_id: &PrincipalId, cause: &str) {
        tracing::info!(principal_id = %principal_id, cause, "Login failed");
        self.events.record(
            SecurityEvent::new(SecurityEventKind::LoginFailed)
                .with_principal(principal_id)
                .with_metadata(json!({ "cause": cause })),
        );
    }
}

fn pair(session_id: SessionId, access: SignedToken, refresh: SignedToken) -> TokenPair {
    TokenPair {
        session_id,
        access_token: access.token,
        refresh_token: refresh.token,
        access_expires_at: access.expires_at,
        refresh_expires_at: refresh.expires_at,
    }
}
