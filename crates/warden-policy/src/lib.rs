//! Warden Policy - Pure transition validation and gate routing.
//!
//! The policy engine is a pure function over the fixed transition graph.
//! It never performs I/O, never panics on caller input, and returns
//! denials as values — a rejected transition is a list of stable error
//! codes, one per missing precondition.
//!
//! Strict mode layers the definition-of-done, evidence, docs, gate and
//! override checks on top of the graph. Whether strict mode is active is
//! host-side configuration; agents cannot toggle it.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod context;
pub mod routing;
pub mod transition;

pub use context::{DodItem, OverrideGrant, PolicyContext};
pub use routing::ApproverMap;
pub use transition::{TransitionCheck, allowed_targets, validate_transition, validate_transition_str};
