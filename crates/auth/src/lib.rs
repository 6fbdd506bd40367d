//! Session and token lifecycle engine.
//!
//! - [`claims`] -- pure payload builder for signed tokens.
//! - [`signer`] -- HS256 access/refresh signing with independent secrets.
//! - [`policy`] -- per-principal session concurrency enforcement.
//! - [`rotation`] -- refresh rotation and reuse-detection state machine.
//! - [`dispatcher`] -- background worker for fire-and-forget side effects.
//! - [`service`] -- the [`SessionService`] facade (issue, rotate, login, logout).
//! - [`sweeper`] -- periodic expiry marking.

pub mod claims;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod policy;
pub mod rotation;
pub mod service;
pub mod signer;
pub mod sweeper;

pub use config::{ConfigError, SessionConfig, TokenConfig};
pub use directory::{MemoryDirectory, PasswordVerifier, PrincipalDirectory};
pub use error::{Rejection, SessionError};
pub use policy::ConcurrencyPolicy;
pub use service::{LoginAttempt, SessionService, SessionServiceDeps, TokenPair};
pub use signer::{JwtSigner, TokenSigner};
