//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// The write would exceed the storage budget.
    #[error("quota exceeded: need {needed} bytes, limit is {limit}")]
    QuotaExceeded { needed: u64, limit: u64 },

    /// The store was closed (session ended).
    #[error("store is closed")]
    Closed,

    /// A thread panicked while holding the connection.
    #[error("connection lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// True if the underlying database ran out of space.
    pub fn is_quota(&self) -> bool {
        match self {
            StorageError::QuotaExceeded { .. } => true,
            StorageError::Database(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code == rusqlite::ErrorCode::DiskFull
            }
            _ => false,
        }
    }
}
