//! Telemetry error types.

use thiserror::Error;

/// Errors during telemetry setup.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The logging configuration is invalid.
    #[error("telemetry config error: {0}")]
    ConfigError(String),

    /// The global subscriber could not be installed.
    #[error("telemetry init error: {0}")]
    InitError(String),
}

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
