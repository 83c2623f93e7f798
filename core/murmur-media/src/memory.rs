//! In-memory tier.
//!
//! A bounded ring: inserting past `max_entries` evicts the single oldest
//! insertion in O(1). Reads do not reorder entries.

use crate::{BlobKey, CachedBlob};
use murmur_types::Timestamp;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

#[derive(Debug)]
pub struct MemoryTier {
    max_entries: usize,
    entries: HashMap<BlobKey, Arc<CachedBlob>>,
    order: VecDeque<BlobKey>,
    total_bytes: u64,
}

impl MemoryTier {
    /// Creates a tier. A bound of 0 is treated as 1.
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries: max_entries.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            total_bytes: 0,
        }
    }

    /// Returns the entry for `key`, expired or not.
    pub fn get(&self, key: &BlobKey) -> Option<Arc<CachedBlob>> {
        self.entries.get(key).cloned()
    }

    /// Inserts a blob and returns the entry evicted to make room, if any.
    /// Replacing an existing key keeps its ring position.
    pub fn insert(&mut self, blob: Arc<CachedBlob>) -> Option<Arc<CachedBlob>> {
        let key = blob.key.clone();
        self.total_bytes += blob.size_bytes;
        if let Some(old) = self.entries.insert(key.clone(), blob) {
            self.total_bytes -= old.size_bytes;
            return None;
        }
        self.order.push_back(key);

        if self.entries.len() > self.max_entries {
            let oldest = self.order.pop_front()?;
            let evicted = self.entries.remove(&oldest)?;
            self.total_bytes -= evicted.size_bytes;
            return Some(evicted);
        }
        None
    }

    pub fn remove(&mut self, key: &BlobKey) -> Option<Arc<CachedBlob>> {
        let removed = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        self.total_bytes -= removed.size_bytes;
        Some(removed)
    }

    /// Drops every entry with `expires_at <= now`. Returns how many.
    pub fn purge_expired(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, blob| !blob.is_expired(now));
        let entries = &self.entries;
        self.order.retain(|k| entries.contains_key(k));
        self.total_bytes = self.entries.values().map(|b| b.size_bytes).sum();
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }
}
