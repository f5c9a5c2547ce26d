//! Warden Telemetry - Logging and tracing for the control plane.
//!
//! This crate provides:
//! - Configurable logging setup with multiple formats
//! - Request context for correlation across dispatch ticks and ops calls
//!
//! # Example
//!
//! ```rust,no_run
//! use warden_telemetry::{LogConfig, LogFormat, setup_logging, RequestContext};
//!
//! # fn main() -> Result<(), warden_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("warden_dispatch=trace");
//! setup_logging(&config)?;
//!
//! let ctx = RequestContext::new("dispatch").with_operation("tick");
//! let span = ctx.span();
//! let _guard = span.enter();
//! tracing::info!("tick started");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod context;
mod error;
mod logging;

pub use context::RequestContext;
pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
