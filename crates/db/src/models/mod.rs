//! Row models mirroring the database tables.

pub mod security_event;
pub mod session;
