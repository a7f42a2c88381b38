//! Error types for gather-core

use thiserror::Error;

/// Result type alias using gather-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in gather-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Persistent storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Event not found
    #[error("Event not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
