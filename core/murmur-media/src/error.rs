//! Error types for the media cache.

use murmur_net::NetError;
use murmur_scheduler::SchedulerError;
use murmur_storage::StorageError;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while resolving media.
///
/// Cloneable so one failure can be shared with every coalesced caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// The server reports the asset missing.
    #[error("media not found: {0}")]
    NotFound(String),

    /// The fetch failed and may succeed later.
    #[error("network error: {0}")]
    Network(String),

    /// The fetch did not complete within the tier timeout.
    #[error("media request timed out")]
    Timeout,

    /// The persistent tier failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The body is empty or not a supported type for its category.
    #[error("invalid asset: {0}")]
    InvalidAsset(String),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

impl MediaError {
    /// Maps a fetch failure for `url`.
    pub fn from_net(url: &str, e: NetError) -> Self {
        if e.is_not_found() {
            return MediaError::NotFound(url.to_string());
        }
        match e {
            NetError::Timeout => MediaError::Timeout,
            other => MediaError::Network(other.to_string()),
        }
    }

    /// True for failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MediaError::Network(_) | MediaError::Timeout)
    }
}

impl From<StorageError> for MediaError {
    fn from(e: StorageError) -> Self {
        MediaError::Storage(e.to_string())
    }
}
