//! Warden Ops - The cockpit-facing HTTP surface.
//!
//! Read endpoints are guarded by the shared read secret; write actions
//! need the dual secret (read AND current-or-previous write secret) and
//! pass the cockpit rate limit keyed by source IP. Worker callbacks
//! (`/ops/worker/ipc`, `/ops/worker/completion`) authenticate with the
//! signed HMAC envelope instead.
//!
//! Responses never include worker shared secrets, SSH identity files,
//! or embedding vectors, and every SSE payload is sanitized before it
//! leaves the process.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod actions;
pub mod auth;
pub mod read;
pub mod router;
pub mod sse;
pub mod state;
pub mod views;
pub mod worker;

pub use router::router;
pub use state::{OpsState, SharedState};
