//! Core error types

use thiserror::Error;

/// Core error type for MeshFlow
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Configuration parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Address could not be parsed
    #[error("Invalid mesh address: {0}")]
    InvalidAddress(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
