//! Error types shared by the loaders

use thiserror::Error;

/// Result type alias for operations that fail with [`NytaxiError`]
pub type Result<T> = std::result::Result<T, NytaxiError>;

/// Errors raised outside any single pipeline stage
#[derive(Error, Debug)]
pub enum NytaxiError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),

    #[error("Credentials error: {0}")]
    Credentials(String),
}

impl NytaxiError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
