//! Error types for session management.

use murmur_storage::StorageError;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Errors that can occur while opening or switching sessions.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session's database could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The configuration cannot produce a working session.
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    /// A background switch task panicked or was cancelled.
    #[error("session task failed: {0}")]
    Task(String),
}
