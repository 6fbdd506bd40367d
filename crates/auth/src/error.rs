use tokenward_core::error::CoreError;
use tokenward_core::security::Severity;
use tokenward_core::store::StoreError;

use crate::signer::SigningError;

/// Text returned to clients for every authentication failure, so the
/// response never tells an attacker which check failed.
pub const GENERIC_UNAUTHENTICATED: &str = "Invalid or expired credentials";

/// Why a refresh or access token was refused.
///
/// The variants matter for internal logging and alerting only; callers map
/// all of them to the same unauthenticated response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Unknown session, ordinary revocation, or expiry.
    #[error("session expired or missing")]
    ExpiredOrMissing,

    /// A consumed or substituted refresh token was presented.
    #[error("refresh token reuse detected")]
    ReusedTokenDetected,

    /// The principal's credentials changed after the token was issued.
    #[error("token predates the current credential version")]
    CredentialStale,

    /// Signature, expiry, issuer or audience check failed.
    #[error("token failed verification")]
    Malformed,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::ExpiredOrMissing => "expired_or_missing",
            Rejection::ReusedTokenDetected => "reused_token_detected",
            Rejection::CredentialStale => "credential_stale",
            Rejection::Malformed => "malformed",
        }
    }

    /// The same text for every variant.
    pub fn public_message(&self) -> &'static str {
        GENERIC_UNAUTHENTICATED
    }

    /// Drives the log level and alerting for a refused token.
    pub fn severity(&self) -> Severity {
        match self {
            Rejection::ReusedTokenDetected => Severity::Critical,
            Rejection::CredentialStale => Severity::Warning,
            Rejection::ExpiredOrMissing | Rejection::Malformed => Severity::Info,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session rejected: {0}")]
    Rejected(Rejection),

    /// Unknown principal or wrong password; deliberately indistinguishable.
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("multi-factor authentication required")]
    MfaRequired,

    #[error(transparent)]
    Signing(#[from] SigningError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("principal directory error: {0}")]
    Directory(#[from] CoreError),
}

impl From<Rejection> for SessionError {
    fn from(rejection: Rejection) -> Self {
        SessionError::Rejected(rejection)
    }
}

impl SessionError {
    /// True for every failure a caller should answer with 401.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            SessionError::Rejected(_) | SessionError::InvalidCredentials
        )
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            SessionError::Rejected(r) => Some(*r),
            _ => None,
        }
    }

    /// Client-facing message. Every unauthenticated case shares one text.
    pub fn public_message(&self) -> &'static str {
        match self {
            SessionError::Rejected(rejection) => rejection.public_message(),
            SessionError::InvalidCredentials => GENERIC_UNAUTHENTICATED,
            SessionError::MfaRequired => "Multi-factor authentication required",
            SessionError::Signing(_) | SessionError::Store(_) | SessionError::Directory(_) => {
                "An internal error occurred"
            }
        }
    }
}
