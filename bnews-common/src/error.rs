//! Common error types for bnews

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for bnews operations
pub type Result<T> = std::result::Result<T, Error>;

/// Startup and storage errors shared by every bnews crate
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite pool or schema error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A config file was named explicitly but does not exist
    #[error("Config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// Bootstrap config unreadable, malformed or out of range
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tracing subscriber could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(format!("Failed to parse TOML: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(format!("Failed to parse JSON: {}", err))
    }
}
