//! Persistent tier.
//!
//! Calls are blocking; the cache runs them on the blocking pool. Errors
//! here are soft: the cache logs them and carries on memory-only.

use crate::{BlobKey, CachedBlob};
use murmur_storage::{BlobStore, EvictionReport, Namespace, StorageError, StorageResult};
use murmur_types::Timestamp;
use std::sync::Arc;
use tracing::debug;

/// Share of entries evicted per pass when the byte budget is exceeded.
pub const EVICTION_FRACTION: f64 = 0.2;

/// Storage backend of the persistent media tier.
pub trait PersistentTier: Send + Sync {
    /// Reads a blob, expired or not.
    fn get(&self, key: &BlobKey) -> StorageResult<Option<CachedBlob>>;

    /// Records an access.
    fn touch(&self, key: &BlobKey, at: Timestamp) -> StorageResult<()>;

    /// Stores a blob, evicting least recently accessed entries until it
    /// fits in `max_total_bytes`.
    fn put(&self, blob: &CachedBlob, max_total_bytes: u64) -> StorageResult<EvictionReport>;

    /// Removes every variant of a URL. Returns the removed keys.
    fn remove_url(&self, url: &str) -> StorageResult<Vec<String>>;

    /// Removes expired entries.
    fn purge_expired(&self, now: Timestamp) -> StorageResult<EvictionReport>;

    fn clear(&self) -> StorageResult<()>;
}

/// [`PersistentTier`] over a namespace of a [`BlobStore`].
#[derive(Debug, Clone)]
pub struct SqlitePersistentTier {
    store: Arc<BlobStore>,
    namespace: Namespace,
}

impl SqlitePersistentTier {
    pub fn new(store: Arc<BlobStore>, namespace: Namespace) -> Self {
        Self { store, namespace }
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }
}

impl PersistentTier for SqlitePersistentTier {
    fn get(&self, key: &BlobKey) -> StorageResult<Option<CachedBlob>> {
        let record = self.store.get(&self.namespace, &key.to_string())?;
        Ok(record.map(|r| CachedBlob::from_record(key.clone(), r)))
    }

    fn touch(&self, key: &BlobKey, at: Timestamp) -> StorageResult<()> {
        self.store.touch(&self.namespace, &key.to_string(), at)?;
        Ok(())
    }

    fn put(&self, blob: &CachedBlob, max_total_bytes: u64) -> StorageResult<EvictionReport> {
        if blob.size_bytes > max_total_bytes {
            return Err(StorageError::QuotaExceeded {
                needed: blob.size_bytes,
                limit: max_total_bytes,
            });
        }

        // An older copy of the same key must not count against the budget.
        self.store.delete(&self.namespace, &blob.key.to_string())?;
        let mut report = EvictionReport::default();

        loop {
            let used = self.store.total_bytes(&self.namespace)?;
            if used + blob.size_bytes <= max_total_bytes {
                break;
            }
            let pass = self.store.evict_least_recent(&self.namespace, EVICTION_FRACTION)?;
            if pass.removed.is_empty() {
                break;
            }
            report.removed.extend(pass.removed);
            report.freed_bytes += pass.freed_bytes;
        }
        if !report.removed.is_empty() {
            debug!(
                "Persistent tier over budget, evicted {} entries ({} bytes)",
                report.removed.len(),
                report.freed_bytes
            );
        }

        self.store.put(&self.namespace, &blob.to_record())?;
        Ok(report)
    }

    fn remove_url(&self, url: &str) -> StorageResult<Vec<String>> {
        self.store.delete_url(&self.namespace, url)
    }

    fn purge_expired(&self, now: Timestamp) -> StorageResult<EvictionReport> {
        self.store.purge_expired(&self.namespace, now)
    }

    fn clear(&self) -> StorageResult<()> {
        self.store.clear(&self.namespace)
    }
}
