//! The media cache.
//!
//! Lookup order is bypass policy, memory tier, persistent tier, network.
//! Network loads go through the [`LoadScheduler`], which bounds concurrency
//! and collapses concurrent requests for one key into a single fetch. The
//! timeout and retry budget come from the connection tier current when the
//! load starts.

use crate::config::{CacheCategory, CacheTierConfig};
use crate::error::{MediaError, MediaResult};
use crate::events::{CacheStats, MediaEvent};
use crate::handles::ObjectHandleTracker;
use crate::memory::MemoryTier;
use crate::persistent::PersistentTier;
use crate::sniff::sniff_mime;
use crate::{BlobKey, BypassPolicy, CachedBlob, Placeholder};
use murmur_net::{ConnectionProfile, FetchedMedia, MediaFetcher, RetryPolicy};
use murmur_scheduler::LoadScheduler;
use murmur_storage::StorageResult;
use murmur_types::{Clock, HandleRef, SystemClock, Timestamp};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Minimum gap between persistent-tier touches of a blob that keeps being
/// served from memory. Keeps the persistent LRU order close to real use
/// without a write per hit.
pub const PERSISTENT_TOUCH_INTERVAL: Duration = Duration::from_secs(60);

/// A renderable asset.
#[derive(Debug, Clone)]
pub struct MediaHandle {
    pub handle: HandleRef,
    pub blob: Arc<CachedBlob>,
}

/// Outcome of resolving a URL.
#[derive(Debug, Clone)]
pub enum Resolution {
    Handle(MediaHandle),
    /// Render a generated placeholder instead.
    Fallback(Placeholder),
}

impl Resolution {
    pub fn handle(&self) -> Option<HandleRef> {
        match self {
            Resolution::Handle(h) => Some(h.handle),
            Resolution::Fallback(_) => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback(_))
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

struct CacheInner {
    config: CacheTierConfig,
    memory: Mutex<MemoryTier>,
    persistent: Option<Arc<dyn PersistentTier>>,
    fetcher: Arc<dyn MediaFetcher>,
    profile: ConnectionProfile,
    scheduler: LoadScheduler<BlobKey, Arc<CachedBlob>, MediaError>,
    handles: ObjectHandleTracker,
    bypass: BypassPolicy,
    clock: Arc<dyn Clock>,
    counters: Counters,
    events: broadcast::Sender<MediaEvent>,
    /// Last persistent-tier touch per key held in memory.
    touched: Mutex<HashMap<BlobKey, Timestamp>>,
}

/// Builds a [`MediaCache`].
pub struct MediaCacheBuilder {
    config: CacheTierConfig,
    fetcher: Arc<dyn MediaFetcher>,
    profile: ConnectionProfile,
    persistent: Option<Arc<dyn PersistentTier>>,
    handles: Option<ObjectHandleTracker>,
    bypass: BypassPolicy,
    clock: Arc<dyn Clock>,
}

impl MediaCacheBuilder {
    /// Sets the persistent tier. Ignored when the configuration disables it.
    pub fn persistent(mut self, tier: Arc<dyn PersistentTier>) -> Self {
        self.persistent = Some(tier);
        self
    }

    pub fn bypass(mut self, policy: BypassPolicy) -> Self {
        self.bypass = policy;
        self
    }

    pub fn handles(mut self, tracker: ObjectHandleTracker) -> Self {
        self.handles = Some(tracker);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> MediaCache {
        let persistent = match self.persistent {
            Some(tier) if self.config.persistent_tier => Some(tier),
            Some(_) => {
                info!("Persistent tier disabled for this platform, caching in memory only");
                None
            }
            None => None,
        };
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        MediaCache {
            inner: Arc::new(CacheInner {
                memory: Mutex::new(MemoryTier::new(self.config.max_entry_count)),
                scheduler: LoadScheduler::new(self.config.max_concurrent_loads),
                handles: self
                    .handles
                    .unwrap_or_else(|| ObjectHandleTracker::with_clock(
                        crate::handles::DEFAULT_HANDLE_CEILING,
                        Arc::clone(&self.clock),
                    )),
                config: self.config,
                persistent,
                fetcher: self.fetcher,
                profile: self.profile,
                bypass: self.bypass,
                clock: self.clock,
                counters: Counters::default(),
                events,
                touched: Mutex::new(HashMap::new()),
            }),
        }
    }
}

/// Tiered, connection-aware media cache. Clones share state.
#[derive(Clone)]
pub struct MediaCache {
    inner: Arc<CacheInner>,
}

impl std::fmt::Debug for MediaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCache")
            .field("config", &self.inner.config)
            .field("persistent", &self.inner.persistent.is_some())
            .finish_non_exhaustive()
    }
}

impl MediaCache {
    /// Starts building a cache with no persistent tier, an empty bypass
    /// policy and the system clock.
    pub fn builder(
        config: CacheTierConfig,
        fetcher: Arc<dyn MediaFetcher>,
        profile: ConnectionProfile,
    ) -> MediaCacheBuilder {
        MediaCacheBuilder {
            config,
            fetcher,
            profile,
            persistent: None,
            handles: None,
            bypass: BypassPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(&self) -> &CacheTierConfig {
        &self.inner.config
    }

    pub fn handles(&self) -> &ObjectHandleTracker {
        &self.inner.handles
    }

    /// True if a persistent tier is in use.
    pub fn has_persistent_tier(&self) -> bool {
        self.inner.persistent.is_some()
    }

    /// Resolves `url` to a renderable handle.
    pub async fn resolve(&self, url: &str, category: CacheCategory) -> MediaResult<Resolution> {
        if self.inner.bypass.matches(url) {
            debug!("Bypassing fetch for {}", url);
            return Ok(Resolution::Fallback(Placeholder::for_url(url)));
        }

        let key = BlobKey::new(url, self.inner.profile.current_quality());
        let blob = match self.inner.memory_hit(&key) {
            Some(blob) => {
                self.inner.touch_persistent(&blob.key).await;
                blob
            }
            None => {
                let inner = Arc::clone(&self.inner);
                let load_key = key.clone();
                self.inner
                    .scheduler
                    .schedule(key, async move { inner.load(load_key, category).await })
                    .await?
            }
        };
        Ok(Resolution::Handle(self.inner.hand_out(blob)))
    }

    /// Like [`resolve`](Self::resolve), but every failure becomes a
    /// placeholder.
    pub async fn resolve_or_fallback(&self, url: &str, category: CacheCategory) -> Resolution {
        match self.resolve(url, category).await {
            Ok(resolution) => resolution,
            Err(e) => {
                debug!("Falling back to placeholder for {}: {}", url, e);
                Resolution::Fallback(Placeholder::for_url(url))
            }
        }
    }

    /// Releases a handle handed out by [`resolve`](Self::resolve).
    pub fn release(&self, handle: &HandleRef) -> bool {
        self.inner.handles.release(handle)
    }

    /// Drops every quality variant of `url` from both tiers and releases
    /// their handles.
    pub async fn invalidate(&self, url: &str) {
        {
            let mut memory = self.inner.lock_memory();
            let mut touched = self.inner.lock_touched();
            for key in BlobKey::variants(url) {
                memory.remove(&key);
                touched.remove(&key);
            }
        }
        for key in BlobKey::variants(url) {
            self.inner.handles.invalidate(&key);
        }

        let url = url.to_string();
        let removed = self
            .inner
            .blocking(move |tier| tier.remove_url(&url))
            .await;
        if let Some(keys) = removed {
            debug!("Invalidated {} persisted variants", keys.len());
        }
    }

    /// Empties both tiers. Live handles are left alone.
    pub async fn clear(&self) {
        self.inner.lock_memory().clear();
        self.inner.lock_touched().clear();
        self.inner.blocking(|tier| tier.clear()).await;
    }

    /// Removes expired entries from both tiers. Returns how many were
    /// removed.
    pub async fn purge_expired(&self) -> usize {
        self.inner.purge_expired().await
    }

    /// Runs [`purge_expired`](Self::purge_expired) every `interval` until
    /// the cache is dropped or the task is aborted.
    pub fn spawn_purge_task(&self, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                inner.purge_expired().await;
            }
            debug!("Purge task stopped");
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MediaEvent> {
        self.inner.events.subscribe()
    }
}

impl CacheInner {
    fn lock_memory(&self) -> MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_touched(&self) -> MutexGuard<'_, HashMap<BlobKey, Timestamp>> {
        self.touched.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn memory_hit(&self, key: &BlobKey) -> Option<Arc<CachedBlob>> {
        let blob = self.lock_memory().get(key)?;
        if blob.is_expired(self.clock.now()) {
            return None;
        }
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Some(blob)
    }

    fn insert_memory(&self, blob: Arc<CachedBlob>) {
        if self.persistent.is_some() {
            self.lock_touched().insert(blob.key.clone(), self.clock.now());
        }
        if let Some(evicted) = self.lock_memory().insert(blob) {
            self.lock_touched().remove(&evicted.key);
            debug!("Memory tier full, evicted {}", evicted.key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Records a memory hit in the persistent tier, at most once per
    /// [`PERSISTENT_TOUCH_INTERVAL`] per key.
    async fn touch_persistent(&self, key: &BlobKey) {
        if self.persistent.is_none() {
            return;
        }
        let now = self.clock.now();
        {
            let mut touched = self.lock_touched();
            if let Some(last) = touched.get(key) {
                if now.millis_since(*last) < PERSISTENT_TOUCH_INTERVAL.as_millis() as u64 {
                    return;
                }
            }
            touched.insert(key.clone(), now);
        }
        let key = key.clone();
        self.blocking(move |tier| tier.touch(&key, now)).await;
    }

    fn hand_out(&self, blob: Arc<CachedBlob>) -> MediaHandle {
        let handle = self.handles.acquire(&blob);
        let _ = self.events.send(MediaEvent::Resolved {
            key: blob.key.clone(),
            handle,
        });
        MediaHandle { handle, blob }
    }

    async fn load(self: Arc<Self>, key: BlobKey, category: CacheCategory) -> MediaResult<Arc<CachedBlob>> {
        // Another load may have filled memory since the caller looked.
        if let Some(blob) = self.memory_hit(&key) {
            return Ok(blob);
        }
        if let Some(blob) = self.persistent_hit(&key).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            self.insert_memory(Arc::clone(&blob));
            return Ok(blob);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        let fetched = self.fetch(&key).await?;
        let mime_type = validate(category, &key.url, &fetched)?;
        let blob = Arc::new(CachedBlob::new(
            key,
            fetched.bytes,
            mime_type,
            self.config.ttl_for(category),
            self.clock.now(),
        ));

        let max_total_bytes = self.config.max_total_bytes;
        let stored = Arc::clone(&blob);
        if let Some(report) = self
            .blocking(move |tier| tier.put(&stored, max_total_bytes))
            .await
        {
            self.counters
                .evictions
                .fetch_add(report.removed.len() as u64, Ordering::Relaxed);
        }
        self.insert_memory(Arc::clone(&blob));
        Ok(blob)
    }

    async fn persistent_hit(&self, key: &BlobKey) -> Option<Arc<CachedBlob>> {
        let now = self.clock.now();
        let lookup = key.clone();
        let found = self
            .blocking(move |tier| -> StorageResult<Option<CachedBlob>> {
                let Some(mut blob) = tier.get(&lookup)? else {
                    return Ok(None);
                };
                if blob.is_expired(now) {
                    return Ok(None);
                }
                tier.touch(&lookup, now)?;
                blob.last_accessed_at = now;
                blob.access_count += 1;
                Ok(Some(blob))
            })
            .await??;
        debug!("Persistent tier hit for {}", key);
        Some(Arc::new(found))
    }

    async fn fetch(&self, key: &BlobKey) -> MediaResult<FetchedMedia> {
        let policy = self.profile.current_policy();
        let retry = RetryPolicy::from_connection(&policy);
        let timeout = policy.timeout();
        let fetcher = &self.fetcher;
        let url = key.url.as_str();

        retry
            .run(
                move |attempt| async move {
                    debug!("Fetching {} (attempt {}, timeout {:?})", url, attempt, timeout);
                    match tokio::time::timeout(timeout, fetcher.fetch_bytes(url, timeout)).await {
                        Ok(Ok(media)) => Ok(media),
                        Ok(Err(e)) => Err(MediaError::from_net(url, e)),
                        Err(_) => Err(MediaError::Timeout),
                    }
                },
                MediaError::is_retryable,
            )
            .await
    }

    /// Runs `op` against the persistent tier on the blocking pool. Failures
    /// are logged and reported as `None`.
    async fn blocking<T, F>(&self, op: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn PersistentTier) -> StorageResult<T> + Send + 'static,
    {
        let tier = Arc::clone(self.persistent.as_ref()?);
        match tokio::task::spawn_blocking(move || op(tier.as_ref())).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!("Persistent tier error, continuing in memory: {}", e);
                None
            }
            Err(e) => {
                warn!("Persistent tier task failed: {}", e);
                None
            }
        }
    }

    async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let from_memory = {
            let mut memory = self.lock_memory();
            let removed = memory.purge_expired(now);
            self.lock_touched().retain(|key, _| memory.get(key).is_some());
            removed
        };
        let from_disk = self
            .blocking(move |tier| tier.purge_expired(now))
            .await
            .map_or(0, |report| report.removed.len());

        let removed = from_memory + from_disk;
        if removed > 0 {
            debug!("Purged {} expired entries ({} memory, {} persistent)", removed, from_memory, from_disk);
        }
        let _ = self.events.send(MediaEvent::Stats(self.stats()));
        removed
    }

    fn stats(&self) -> CacheStats {
        let memory = self.lock_memory();
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            size_bytes: memory.total_bytes(),
            item_count: memory.len(),
        }
    }
}

/// Checks a fetched body and returns its effective MIME type.
fn validate(category: CacheCategory, url: &str, fetched: &FetchedMedia) -> MediaResult<String> {
    if fetched.bytes.is_empty() {
        return Err(MediaError::InvalidAsset(format!("empty body from {url}")));
    }
    let declared = fetched
        .mime_type
        .as_deref()
        .filter(|m| *m != "application/octet-stream");
    let mime_type = match declared {
        Some(m) => m.to_string(),
        None => sniff_mime(&fetched.bytes)
            .map(str::to_string)
            .ok_or_else(|| MediaError::InvalidAsset(format!("unrecognized content from {url}")))?,
    };
    if !category.accepts(&mime_type) {
        return Err(MediaError::InvalidAsset(format!(
            "{mime_type} is not a valid {category:?} asset ({url})"
        )));
    }
    Ok(mime_type)
}
