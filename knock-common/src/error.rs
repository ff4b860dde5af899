//! Common error types for the Knock player

use thiserror::Error;

/// Common result type for Knock operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the script, config and event layers
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Script file is not valid TOML or does not match the segment schema
    #[error("Script parse error: {0}")]
    ScriptParse(#[from] toml::de::Error),

    /// Script parsed but violates an invariant (duplicate or empty ids)
    #[error("Invalid script: {0}")]
    InvalidScript(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),
}
