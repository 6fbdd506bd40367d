//! Security event pipeline.
//!
//! - [`SecurityEvent`] -- the audit envelope emitted by the session engine.
//! - [`SecurityEventSink`] -- the fire-and-forget recording seam.
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`; it is also a [`SecurityEventSink`].
//! - [`EventPersistence`] -- background service that durably writes every
//!   event to the `security_events` table.

pub mod bus;
pub mod persistence;
pub mod sink;

pub use bus::{EventBus, SecurityEvent};
pub use persistence::EventPersistence;
pub use sink::{NoopSink, SecurityEventSink};
