//! Error types for the sync layer.

use murmur_model::DtoError;
use murmur_net::NetError;
use murmur_storage::StorageError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The snapshot could not be fetched.
    #[error("network error: {0}")]
    Network(#[from] NetError),

    /// The server answered in a shape the adapter does not understand.
    #[error("protocol error: {0}")]
    Protocol(#[from] DtoError),

    /// Local storage failed as a whole (not a single item).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A background task panicked or was cancelled.
    #[error("sync task failed: {0}")]
    Task(String),
}

impl SyncError {
    /// True if the session's store was closed underneath the operation.
    pub fn is_closed(&self) -> bool {
        matches!(self, SyncError::Storage(StorageError::Closed))
    }
}
