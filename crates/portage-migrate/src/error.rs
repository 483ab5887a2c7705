//! Error types for migration operations.

use thiserror::Error;

/// Migration-specific errors.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Failed to authenticate with a remote service.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found on the remote service.
    #[error("Not found: {0}")]
    NotFound(String),

    /// API request returned an unexpected status or body.
    #[error("API request failed: {0}")]
    ApiError(String),

    /// Network error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An external command exited unsuccessfully.
    #[error("Command `{command}` failed: {output}")]
    CommandFailed {
        /// Program and arguments as run.
        command: String,
        /// Combined stdout and stderr.
        output: String,
    },

    /// Refused to overwrite an existing destination.
    #[error("Destination already exists: {0}")]
    AlreadyExists(String),

    /// Remote state did not settle within the polling budget.
    #[error("Timed out waiting for {0}")]
    Timeout(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing error.
    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Invalid rewrite pattern.
    #[error("Invalid pattern: {0}")]
    PatternError(#[from] regex::Error),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
