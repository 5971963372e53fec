//! Error types for the Ratekeeper service.

use thiserror::Error;

use crate::store::BackendError;

/// Main error type for Ratekeeper operations.
#[derive(Error, Debug)]
pub enum RatekeeperError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rate limiter configuration that would produce nonsensical bucket arithmetic
    #[error("Invalid rate limiter config for key '{key}': {field} must be positive, got {value}")]
    InvalidConfig {
        key: String,
        field: &'static str,
        value: u64,
    },

    /// A rate limiter setting larger than the shared backend can represent exactly
    #[error("Invalid rate limiter config for key '{key}': {field} must be at most {max}, got {value}")]
    ConfigTooLarge {
        key: String,
        field: &'static str,
        value: u64,
        max: u64,
    },

    /// Shared state backend errors
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ratekeeper operations.
pub type Result<T> = std::result::Result<T, RatekeeperError>;
