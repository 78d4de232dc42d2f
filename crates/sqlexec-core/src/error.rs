//! Error types for sqlexec

use thiserror::Error;

/// Core error type shared by drivers and the executor
#[derive(Error, Debug)]
pub enum SqlExecError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl SqlExecError {
    /// Whether the error was produced by an elapsed deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, SqlExecError::Timeout(_))
    }
}

/// Result type alias for sqlexec operations
pub type Result<T> = std::result::Result<T, SqlExecError>;
