//! Warden Limits - Rate, quota and breaker enforcement.
//!
//! Three orthogonal mechanisms compose behind [`LimitsEngine::enforce`]:
//! a fixed-window per-minute rate limiter, a daily quota with soft and
//! hard thresholds, and a per-provider circuit breaker. Evaluation exits
//! at the first denial; every denial is appended to the parameter-free
//! denial log and emitted as a `limits:denial` event.
//!
//! Denials are values, never errors: callers get an [`Enforcement`] and
//! decide what to do with it.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod breaker;
pub mod engine;

pub use breaker::{BreakerDecision, CircuitBreakers};
pub use engine::{EnforceRequest, Enforcement, LimitsEngine};
