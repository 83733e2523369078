//! Error types for the connection cache and its provider layer.

use thiserror::Error;

use crate::key::CacheKey;

/// Result type alias for cache and provider operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Faults raised by a driver or by a live connection.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection does not implement an optional capability.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("invalid connection target: {0}")]
    InvalidTarget(String),

    #[error("connection is closed")]
    Closed,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Whether this error only signals a missing optional capability.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, DriverError::Unsupported(_))
    }
}

/// Errors surfaced to callers of the cache and the provider.
///
/// Stale connections never show up here: a cached connection that fails
/// its liveness check is reported as a cache miss instead.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid cache key: {0}")]
    InvalidKey(String),

    #[error("failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: DriverError,
    },

    #[error("health check failed for cached connection {key}: {source}")]
    Validation {
        key: CacheKey,
        #[source]
        source: DriverError,
    },

    #[error("failed to reset transaction state for {key}: {source}")]
    Reset {
        key: CacheKey,
        #[source]
        source: DriverError,
    },

    #[error("failed to configure session for {key}: {source}")]
    SessionConfig {
        key: CacheKey,
        #[source]
        source: DriverError,
    },

    #[error("configuration error: {0}")]
    Config(String),
}
