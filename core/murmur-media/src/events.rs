use crate::BlobKey;
use murmur_types::HandleRef;
use serde::Serialize;

/// Cache counters. Sizes describe the memory tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub size_bytes: u64,
    pub item_count: usize,
}

impl CacheStats {
    /// Share of lookups served from a cache tier, `0.0` before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Notifications published by the media cache.
#[derive(Debug, Clone)]
pub enum MediaEvent {
    /// A URL resolved to a live handle.
    Resolved { key: BlobKey, handle: HandleRef },
    /// Counters after a purge pass.
    Stats(CacheStats),
}
