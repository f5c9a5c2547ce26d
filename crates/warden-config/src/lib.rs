//! Warden Config - Environment-driven configuration.
//!
//! The control plane's entire contract with its host is the environment
//! (`OS_HTTP_SECRET`, kill switches, `RL_*`/`QUOTA_*` overrides, poll
//! intervals). This crate lifts those variables into typed sections once
//! at startup; nothing re-reads the environment at request time.
//!
//! Loading is split the usual way:
//! - [`types`] — the typed sections
//! - [`loader`] — environment capture and parsing
//! - [`validate`] — startup validation (fatal on failure)

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod loader;
pub mod types;
pub mod validate;

pub use loader::{EnvSource, load, load_from};
pub use types::{
    BreakerSettings, DispatchSettings, EmbeddingSettings, HttpSettings, LimitsSettings,
    PathSettings, QuotaThresholds, WardenConfig, WorkerSettings,
};
pub use validate::{ConfigError, validate};
