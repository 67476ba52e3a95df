//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration file {}: {reason}", path.display())]
    FileReadError { path: PathBuf, reason: String },

    #[error("Failed to write configuration file {}: {reason}", path.display())]
    FileWriteError { path: PathBuf, reason: String },

    /// TOML did not match the configuration layout
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Failed to serialize configuration: {0}")]
    SerializeError(String),

    /// An environment variable held an unparseable value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}
