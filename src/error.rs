//! Error types for callgate.

use thiserror::Error;

/// Main error type for callgate operations.
#[derive(Error, Debug)]
pub enum CallgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for callgate operations.
pub type Result<T> = std::result::Result<T, CallgateError>;

/// Error returned by the retry driver once the retry budget is spent.
#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// Every attempt failed; `last_error` is the error from the final one.
    #[error("operation failed after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Total number of attempts made, including the first.
        attempts: u32,
        /// Error returned by the final attempt.
        last_error: E,
    },
}

impl<E> RetryError<E> {
    /// Consume the error and return the last operation error.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last_error, .. } => last_error,
        }
    }

    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
        }
    }
}
