//! Error types for gisdesk-core.

use thiserror::Error;

/// Result type alias using gisdesk-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for orchestrator operations
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Precondition errors
    #[error("Required command not found: {}", .0.join(", "))]
    MissingCommands(Vec<String>),

    // Process errors
    #[error("Failed to start {name}: {reason}")]
    Spawn { name: String, reason: String },

    #[error("Invalid stage transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // Command execution errors
    #[error("Command failed: {cmd}\n{stderr}")]
    CommandFailed { cmd: String, stderr: String },

    #[error("Command timed out after {secs}s: {cmd}")]
    Timeout { cmd: String, secs: u64 },

    // Status file errors
    #[error("Status file not found: {0}")]
    StatusNotFound(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error is a hard precondition or launch failure that
    /// maps to a FAILED status rather than ERROR.
    pub fn is_precondition(&self) -> bool {
        matches!(self, Error::MissingCommands(_) | Error::Spawn { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(e: tempfile::PersistError) -> Self {
        Error::Io(e.error)
    }
}
