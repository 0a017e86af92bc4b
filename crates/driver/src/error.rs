//! Error types for the migration driver
//!
//! Every failure that crosses the driver boundary is one of these variants.
//! Client-specific errors are normalized into [`DriverError::Execution`]
//! before they reach the caller.

use thiserror::Error;

/// Result type alias for driver operations
pub type DriverResult<T> = Result<T, DriverError>;

/// Error types for driver operations
#[derive(Debug, Error)]
pub enum DriverError {
    /// Required configuration is missing or invalid
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The client could not establish a session
    #[error("Connection error: {0}")]
    Connection(String),

    /// The database client rejected a statement
    #[error("Execution error: {message}")]
    Execution { message: String, statement: String },

    /// A result row did not have the expected shape
    #[error("Decode error: {0}")]
    Decode(String),

    /// Migration file or ledger inconsistency
    #[error("Migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DriverError {
    /// Statement that caused an execution failure, if any
    pub fn statement(&self) -> Option<&str> {
        match self {
            DriverError::Execution { statement, .. } => Some(statement),
            _ => None,
        }
    }

    pub fn is_configuration(&self) -> bool {
        matches!(self, DriverError::Configuration(_))
    }

    pub fn is_execution(&self) -> bool {
        matches!(self, DriverError::Execution { .. })
    }
}
