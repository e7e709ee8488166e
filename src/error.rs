//! Error types for the brewlearn core
//!
//! Uses thiserror for structured error definitions and anyhow for error
//! propagation at the binary edge. Only `MalformedInput` is meant to reach a
//! caller; missing or corrupt state is recovered locally with defaults.

use thiserror::Error;

/// Main error type for brewlearn operations
#[derive(Error, Debug)]
pub enum BrewError {
    /// Payload or request is missing required identity fields
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Advisory scope lock could not be taken
    #[error("Lock error: {0}")]
    Lock(String),

    /// Invalid operation (e.g., reviewing with no active skill)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for brewlearn operations
pub type Result<T> = std::result::Result<T, BrewError>;

/// Convert anyhow::Error to BrewError
impl From<anyhow::Error> for BrewError {
    fn from(err: anyhow::Error) -> Self {
        BrewError::Other(err.to_string())
    }
}

impl From<tempfile::PersistError> for BrewError {
    fn from(err: tempfile::PersistError) -> Self {
        BrewError::Io(err.error)
    }
}

impl BrewError {
    /// Whether the error should be surfaced to the caller as a rejected request
    pub fn is_user_visible(&self) -> bool {
        matches!(self, BrewError::MalformedInput(_))
    }
}
