use std::fmt;
use std::str::FromStr;

use chrono::Duration;

use crate::policy::ConcurrencyPolicy;

/// Default access token expiry in minutes.
const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 15;
/// Default refresh token expiry in days.
const DEFAULT_REFRESH_EXPIRY_DAYS: i64 = 7;
/// Default `iss` claim.
const DEFAULT_ISSUER: &str = "tokenward";
/// Default cap on concurrently active sessions per principal.
const DEFAULT_MAX_ACTIVE_SESSIONS: u32 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set in the environment")]
    Missing(&'static str),

    #[error("{var} has an invalid value '{value}'")]
    Invalid { var: &'static str, value: String },

    #[error("JWT_ACCESS_SECRET and JWT_REFRESH_SECRET must differ")]
    SharedSecret,
}

/// Signing material and lifetimes for both token kinds.
#[derive(Clone)]
pub struct TokenConfig {
    /// HMAC-SHA256 secret for access tokens.
    pub access_secret: String,
    /// HMAC-SHA256 secret for refresh tokens. Never equal to `access_secret`.
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("access_secret", &"[REDACTED]")
            .field("refresh_secret", &"[REDACTED]")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl TokenConfig {
    /// Config with the default lifetimes and issuer.
    pub fn new(access_secret: impl Into<String>, refresh_secret: impl Into<String>) -> Self {
        Self {
            access_secret: access_secret.into(),
            refresh_secret: refresh_secret.into(),
            access_ttl: Duration::minutes(DEFAULT_ACCESS_EXPIRY_MINS),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_EXPIRY_DAYS),
            issuer: DEFAULT_ISSUER.to_string(),
        }
    }
}

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub tokens: TokenConfig,
    pub policy: ConcurrencyPolicy,
}

impl SessionConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                     | Required | Default     |
    /// |-----------------------------|----------|-------------|
    /// | `JWT_ACCESS_SECRET`         | **yes**  | --          |
    /// | `JWT_REFRESH_SECRET`        | **yes**  | --          |
    /// | `JWT_ACCESS_EXPIRY_MINS`    | no       | `15`        |
    /// | `JWT_REFRESH_EXPIRY_DAYS`   | no       | `7`         |
    /// | `JWT_ISSUER`                | no       | `tokenward` |
    /// | `SESSION_REPLACE_BY_DEVICE` | no       | `true`      |
    /// | `SESSION_MAX_ACTIVE`        | no       | `5` (`0` disables the cap) |
    pub fn from_env() -> Result<Self, ConfigError> {
        let access_secret = required("JWT_ACCESS_SECRET")?;
        let refresh_secret = required("JWT_REFRESH_SECRET")?;
        if access_secret == refresh_secret {
            return Err(ConfigError::SharedSecret);
        }

        let access_mins: i64 = parsed("JWT_ACCESS_EXPIRY_MINS", DEFAULT_ACCESS_EXPIRY_MINS)?;
        let refresh_days: i64 = parsed("JWT_REFRESH_EXPIRY_DAYS", DEFAULT_REFRESH_EXPIRY_DAYS)?;
        positive("JWT_ACCESS_EXPIRY_MINS", access_mins)?;
        positive("JWT_REFRESH_EXPIRY_DAYS", refresh_days)?;

        let issuer = std::env::var("JWT_ISSUER").unwrap_or_else(|_| DEFAULT_ISSUER.into());

        let replace_by_device: bool = parsed("SESSION_REPLACE_BY_DEVICE", true)?;
        let max_active: u32 = parsed("SESSION_MAX_ACTIVE", DEFAULT_MAX_ACTIVE_SESSIONS)?;

        Ok(Self {
            tokens: TokenConfig {
                access_secret,
                refresh_secret,
                access_ttl: Duration::minutes(access_mins),
                refresh_ttl: Duration::days(refresh_days),
                issuer,
            },
            policy: ConcurrencyPolicy {
                replace_by_device,
                max_active_sessions: (max_active > 0).then_some(max_active),
            },
        })
    }
}

fn required(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(var)),
    }
}

fn parsed<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}

fn positive(var: &'static str, value: i64) -> Result<(), ConfigError> {
    if value <= 0 {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
        });
    }
    Ok(())
}
