//! Configuration error type.

use thiserror::Error;

/// Result alias for configuration loading.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Raised for missing or malformed configuration; fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required setting was missing.
    #[error("missing required configuration: {0}")]
    Missing(String),

    /// A setting's value failed validation.
    #[error("invalid configuration value for {field}: {reason}")]
    Invalid {
        /// Name of the offending field.
        field: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// The underlying layered-config load failed.
    #[error("failed to load configuration: {0}")]
    Load(String),
}
