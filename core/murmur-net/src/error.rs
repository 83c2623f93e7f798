//! Error types for the network layer.

use thiserror::Error;

/// Result type for network operations.
pub type NetResult<T> = Result<T, NetError>;

/// Errors that can occur while talking to the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetError {
    /// The server answered with a non-2xx status.
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// The request did not complete in time.
    #[error("request timed out")]
    Timeout,

    /// Connection-level failure (DNS, TLS, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
}

impl NetError {
    /// True if the server reported the resource as missing (404/410).
    pub fn is_not_found(&self) -> bool {
        matches!(self, NetError::Http { status: 404 | 410 })
    }
}
