//! Error types for level estimation

use thiserror::Error;

/// Result type for level estimation
pub type Result<T> = std::result::Result<T, LevelError>;

/// Level estimation error types
#[derive(Error, Debug)]
pub enum LevelError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl LevelError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}
