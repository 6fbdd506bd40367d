//! Domain types shared by every tokenward crate.
//!
//! This crate has zero internal dependencies so the storage layer, the event
//! pipeline and the session engine can all agree on one vocabulary.

pub mod error;
pub mod hashing;
pub mod memory;
pub mod principal;
pub mod security;
pub mod session;
pub mod store;
pub mod types;
