//! Error types for the simulation substrate.

use thiserror::Error;

/// Result type for substrate operations.
pub type Result<T> = std::result::Result<T, EnvError>;

/// Errors raised by the simulation environment.
#[derive(Error, Debug)]
pub enum EnvError {
    /// A timeout was requested with a negative, NaN or infinite duration.
    #[error("Invalid duration: {0}")]
    InvalidDuration(f64),

    /// The resource queue was closed while a request was waiting.
    #[error("Resource '{0}' is closed")]
    ResourceClosed(String),

    /// The driving runtime could not be created.
    #[error("Runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl EnvError {
    /// Returns true when the error comes from a malformed duration.
    pub fn is_invalid_duration(&self) -> bool {
        matches!(self, EnvError::InvalidDuration(_))
    }
}
