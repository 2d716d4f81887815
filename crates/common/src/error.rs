//! Error types for canary

use thiserror::Error;

/// Result type alias using canary Error
pub type Result<T> = std::result::Result<T, Error>;

/// canary error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Config write error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}
