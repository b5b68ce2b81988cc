//! Error types for the windowlimit crate.

use thiserror::Error;

/// Main error type for windowlimit operations.
#[derive(Error, Debug)]
pub enum LimiterError {
    /// A rule was constructed with an invalid parameter.
    #[error("Configuration error: {field} must be non-negative, got {value}")]
    Config {
        /// Name of the offending field
        field: &'static str,
        /// The rejected value
        value: f64,
    },

    /// Configuration documents that cannot be parsed or are inconsistent
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for windowlimit operations.
pub type Result<T> = std::result::Result<T, LimiterError>;
