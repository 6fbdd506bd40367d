//! Token payload construction.
//!
//! [`build_payload`] is pure: no I/O, no clock, deterministic for a given
//! principal snapshot and session id. Time-based claims (`iat`, `exp`) are
//! added by the signer.

use serde::{Deserialize, Serialize};
use tokenward_core::principal::PrincipalSnapshot;
use tokenward_core::types::{PrincipalId, SessionId};

/// Distinguishes the two audiences a session's tokens are minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    /// Value of the `aud` claim for this kind.
    pub fn audience(&self) -> &'static str {
        match self {
            TokenKind::Access => "tokenward:access",
            TokenKind::Refresh => "tokenward:refresh",
        }
    }
}

/// Immutable claim set before signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    pub sub: PrincipalId,
    pub name: String,
    /// Principal's credential version at issuance.
    pub cver: i64,
    pub roles: Vec<String>,
    pub kind: TokenKind,
    pub jti: SessionId,
}

/// Signed claim set as it appears inside a JWT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject -- the principal's stable opaque id.
    pub sub: PrincipalId,
    pub name: String,
    pub cver: i64,
    pub roles: Vec<String>,
    pub kind: TokenKind,
    /// Session id shared by the access and refresh token of one issuance.
    pub jti: SessionId,
    pub iss: String,
    pub aud: String,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
}

impl Claims {
    pub fn from_payload(payload: &TokenPayload, issuer: &str, iat: i64, exp: i64) -> Self {
        Self {
            sub: payload.sub.clone(),
            name: payload.name.clone(),
            cver: payload.cver,
            roles: payload.roles.clone(),
            kind: payload.kind,
            jti: payload.jti,
            iss: issuer.to_string(),
            aud: payload.kind.audience().to_string(),
            iat,
            exp,
        }
    }
}

/// Assemble the claim set for one token of a session.
pub fn build_payload(
    principal: &PrincipalSnapshot,
    session_id: SessionId,
    kind: TokenKind,
) -> TokenPayload {
    TokenPayload {
        sub: principal.principal_id.clone(),
        name: principal.display_name.clone(),
        cver: principal.credential_version,
        roles: principal.roles.clone(),
        kind,
        jti: session_id,
    }
}

/// Access and refresh payloads sharing one session id.
pub fn build_pair(
    principal: &PrincipalSnapshot,
    session_id: SessionId,
) -> (TokenPayload, TokenPayload) {
    (
        build_payload(principal, session_id, TokenKind::Access),
        build_payload(principal, session_id, TokenKind::Refresh),
    )
}
