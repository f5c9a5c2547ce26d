//! Warden Events - In-process pub/sub for observable transitions.
//!
//! Every observable transition in the control plane (worker status,
//! dispatch lifecycle, limit denials, breaker state changes) emits a
//! typed [`WardenEvent`] onto the [`EventBus`]. Async consumers (the SSE
//! stream) subscribe through a broadcast channel; in-process listeners
//! register as closures and are notified synchronously in registration
//! order, with per-listener isolation so one failing listener cannot
//! starve the rest.
//!
//! Events leaving the process are passed through [`sanitize_payload`]
//! first, which strips secret-shaped keys.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod bus;
pub mod event;
pub mod sanitize;

pub use bus::{EventBus, EventReceiver};
pub use event::{EventMetadata, WardenEvent};
pub use sanitize::sanitize_payload;
