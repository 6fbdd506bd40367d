//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that accept
//! `&PgPool` as the first argument.

pub mod security_event_repo;
pub mod session_repo;

pub use security_event_repo::SecurityEventRepo;
pub use session_repo::SessionRepo;
