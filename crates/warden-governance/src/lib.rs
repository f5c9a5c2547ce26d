//! Warden Governance - Task lifecycle services.
//!
//! [`Governance`] is the one write path for tasks: creation, policy-
//! checked transitions under optimistic locking, idempotent gate
//! approvals, and the override escape hatch. Every mutation leaves an
//! activity row behind, and the context pack builder renders a task's
//! cross-agent history into deterministic text for reviewers.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod pack;
pub mod service;

pub use error::{ActionError, ActionResult};
pub use service::{Governance, NewTask, TransitionOutcome};
