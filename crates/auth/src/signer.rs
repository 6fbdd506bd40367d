//! HS256 JWT signing for access and refresh tokens.
//!
//! Access and refresh tokens use independent secrets and lifetimes, so a
//! token of one kind never verifies as the other. Signing never touches the
//! session store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tokenward_core::types::Timestamp;

use crate::claims::{Claims, TokenKind, TokenPayload};
use crate::config::TokenConfig;

#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    #[error("failed to sign {kind:?} token: {source}")]
    Encode {
        kind: TokenKind,
        #[source]
        source: jsonwebtoken::errors::Error,
    },

    #[error("token failed verification: {0}")]
    Decode(#[source] jsonwebtoken::errors::Error),

    #[error("{found:?} payload cannot be signed as a {expected:?} token")]
    WrongKind { expected: TokenKind, found: TokenKind },

    #[error("token expiry is out of range")]
    ExpiryOutOfRange,
}

/// A signed token and the instant its `exp` claim points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: Timestamp,
}

/// Produces and verifies tokens.
///
/// Signing is async so implementations backed by a remote key service fit
/// the same seam; the engine runs both signing calls of an issuance
/// concurrently.
#[async_trait]
pub trait TokenSigner: Send + Sync {
    async fn sign_access(&self, payload: &TokenPayload) -> Result<SignedToken, SigningError>;

    async fn sign_refresh(&self, payload: &TokenPayload) -> Result<SignedToken, SigningError>;

    /// Validate signature, expiry, issuer and audience of an access token.
    fn verify_access(&self, token: &str) -> Result<Claims, SigningError>;

    /// Validate signature, expiry, issuer and audience of a refresh token.
    fn verify_refresh(&self, token: &str) -> Result<Claims, SigningError>;
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl KeyPair {
    fn new(secret: &str, kind: TokenKind, issuer: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[kind.audience()]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

/// [`TokenSigner`] using HMAC-SHA256 with in-process secrets.
pub struct JwtSigner {
    config: TokenConfig,
    access: KeyPair,
    refresh: KeyPair,
}

impl JwtSigner {
    pub fn new(config: TokenConfig) -> Self {
        let access = KeyPair::new(&config.access_secret, TokenKind::Access, &config.issuer);
        let refresh = KeyPair::new(&config.refresh_secret, TokenKind::Refresh, &config.issuer);
        Self {
            config,
            access,
            refresh,
        }
    }

    pub fn config(&self) -> &TokenConfig {
        &self.config
    }

    fn sign(
        &self,
        payload: &TokenPayload,
        expected: TokenKind,
    ) -> Result<SignedToken, SigningError> {
        if payload.kind != expected {
            return Err(SigningError::WrongKind {
                expected,
                found: payload.kind,
            });
        }
        let (keys, ttl) = match expected {
            TokenKind::Access => (&self.access, self.config.access_ttl),
            TokenKind::Refresh => (&self.refresh, self.config.refresh_ttl),
        };

        let iat = Utc::now().timestamp();
        let exp = iat + ttl.num_seconds();
        let expires_at =
            DateTime::<Utc>::from_timestamp(exp, 0).ok_or(SigningError::ExpiryOutOfRange)?;

        let claims = Claims::from_payload(payload, &self.config.issuer, iat, exp);
        let token = encode(&Header::new(Algorithm::HS256), &claims, &keys.encoding)
            .map_err(|source| SigningError::Encode {
                kind: expected,
                source,
            })?;

        Ok(SignedToken { token, expires_at })
    }

    fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, SigningError> {
        let keys = match kind {
            TokenKind::Access => &self.access,
            TokenKind::Refresh => &self.refresh,
        };
        let claims = decode::<Claims>(token, &keys.decoding, &keys.validation)
            .map_err(SigningError::Decode)?
            .claims;
        if claims.kind != kind {
            return Err(SigningError::WrongKind {
                expected: kind,
                found: claims.kind,
            });
        }
        Ok(claims)
    }
}

#[async_trait]
impl TokenSigner for JwtSigner {
    async fn sign_access(&self, payload: &TokenPayload) -> Result<SignedToken, SigningError> {
        self.sign(payload, TokenKind::Access)
    }

    async fn sign_refresh(&self, payload: &TokenPayload) -> Result<SignedToken, SigningError> {
        self.sign(payload, TokenKind::Refresh)
    }

    fn verify_access(&self, token: &str) -> Result<Claims, SigningError> {
        self.verify(token, TokenKind::Access)
    }

    fn verify_refresh(&self, token: &str) -> Result<Claims, SigningError> {
        self.verify(token, TokenKind::Refresh)
    }
}
