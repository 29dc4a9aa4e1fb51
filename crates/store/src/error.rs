//! Error types for registry store operations.

use thiserror::Error;

/// Errors that can occur while reading or writing the registry projection.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite database error.
    #[error("sqlite error: {0}")]
    Sqlite(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored value failed to parse back into its domain type.
    #[error("corrupt record for {0}: {1}")]
    Corrupt(String, String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Sqlite(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

/// Result type for registry store operations.
pub type StoreResult<T> = Result<T, StoreError>;
