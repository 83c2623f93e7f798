//! Fetch collaborators.
//!
//! The cache and the sync engine only see these traits. Tests substitute
//! scripted implementations; production uses [`crate::HttpClient`].

use crate::NetResult;
use async_trait::async_trait;
use std::time::Duration;

/// Bytes returned by a media fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMedia {
    pub bytes: Vec<u8>,
    /// MIME type from the response, without parameters.
    pub mime_type: Option<String>,
}

impl FetchedMedia {
    /// Creates a fetched body with a known MIME type.
    pub fn new(bytes: impl Into<Vec<u8>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: Some(mime_type.into()),
        }
    }
}

/// Fetches binary media.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetches `url`, giving up after `timeout`.
    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> NetResult<FetchedMedia>;
}

/// Fetches JSON documents.
#[async_trait]
pub trait JsonFetcher: Send + Sync {
    /// Fetches and decodes `url`.
    async fn fetch_json(&self, url: &str) -> NetResult<serde_json::Value>;
}
