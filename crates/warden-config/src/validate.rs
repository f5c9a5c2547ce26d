//! Startup validation. A failing config is fatal before any socket opens.

use thiserror::Error;

use crate::types::WardenConfig;

/// A configuration problem found at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required secret is empty.
    #[error("missing required secret: {0}")]
    MissingSecret(&'static str),

    /// Embeddings are enabled but no endpoint is configured.
    #[error("EMBEDDINGS_ENABLED is set but EMBEDDINGS_URL is empty")]
    EmbeddingsWithoutUrl,

    /// Breaker tuning is unusable.
    #[error("breaker misconfigured: {0}")]
    Breaker(&'static str),

    /// The bind address cannot be parsed.
    #[error("invalid OPS_BIND_ADDR: {0}")]
    BindAddr(String),
}

/// Validate a loaded configuration.
///
/// # Errors
///
/// Returns every class of problem as its own variant; the kernel treats
/// any of them as a store-init-grade fatal (exit 1).
pub fn validate(config: &WardenConfig) -> Result<(), ConfigError> {
    if config.http.read_secret.is_empty() {
        return Err(ConfigError::MissingSecret("OS_HTTP_SECRET"));
    }
    if config.http.write_secret_current.is_empty() {
        return Err(ConfigError::MissingSecret("COCKPIT_WRITE_SECRET_CURRENT"));
    }
    if config.worker.shared_secret.is_empty() {
        return Err(ConfigError::MissingSecret("WORKER_SHARED_SECRET"));
    }
    if config.embeddings.enabled && config.embeddings.url.is_empty() {
        return Err(ConfigError::EmbeddingsWithoutUrl);
    }
    if config.limits.breaker.open_after_fails == 0 {
        return Err(ConfigError::Breaker("BREAKER_OPEN_AFTER_FAILS must be >= 1"));
    }
    if config.limits.breaker.half_open_probes == 0 {
        return Err(ConfigError::Breaker("BREAKER_HALF_OPEN_PROBES must be >= 1"));
    }
    if config.http.bind_addr.parse::<std::net::SocketAddr>().is_err() {
        return Err(ConfigError::BindAddr(config.http.bind_addr.clone()));
    }
    Ok(())
}
