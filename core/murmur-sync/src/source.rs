//! Where authoritative snapshots come from.

use crate::error::SyncResult;
use async_trait::async_trait;
use murmur_model::{normalize_snapshot, NormalizedSnapshot};
use murmur_net::JsonFetcher;
use std::sync::Arc;
use tracing::debug;

/// Supplies one page of the server's publications.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Fetches page `page` (0-based) of `page_size` publications.
    async fn fetch_page(&self, page: usize, page_size: usize) -> SyncResult<NormalizedSnapshot>;
}

/// [`SnapshotSource`] over the REST feed at `{base_url}/publications`.
#[derive(Clone)]
pub struct HttpSnapshotSource {
    fetcher: Arc<dyn JsonFetcher>,
    base_url: String,
}

impl std::fmt::Debug for HttpSnapshotSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSnapshotSource")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpSnapshotSource {
    pub fn new(fetcher: Arc<dyn JsonFetcher>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { fetcher, base_url }
    }

    /// URL of one feed page.
    pub fn page_url(&self, page: usize, page_size: usize) -> String {
        format!("{}/publications?page={}&limit={}", self.base_url, page, page_size)
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    async fn fetch_page(&self, page: usize, page_size: usize) -> SyncResult<NormalizedSnapshot> {
        let url = self.page_url(page, page_size);
        let body = self.fetcher.fetch_json(&url).await?;
        let snapshot = normalize_snapshot(body)?;
        if !snapshot.rejected.is_empty() {
            debug!(
                "Page {} had {} unreadable publications",
                page,
                snapshot.rejected.len()
            );
        }
        Ok(snapshot)
    }
}
