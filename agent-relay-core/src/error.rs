//! Error types for agent-relay

use thiserror::Error;

/// The main error type for agent-relay operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Session management errors
    #[error("Session error: {0}")]
    Session(String),

    /// Signal store errors (connection failures, timeouts)
    #[error("Signal store error: {0}")]
    Signal(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for agent-relay operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::Signal(e.to_string())
    }
}
