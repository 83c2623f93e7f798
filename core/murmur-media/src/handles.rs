//! Renderer handles on cached blobs.
//!
//! Every handle given to the UI is tracked here and released explicitly.
//! The live count is capped; acquiring past the ceiling releases the
//! oldest handle first.

use crate::{BlobKey, CachedBlob};
use murmur_types::{Clock, HandleRef, SystemClock, Timestamp};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Default live-handle ceiling.
pub const DEFAULT_HANDLE_CEILING: usize = 20;

/// One live handle.
#[derive(Debug, Clone)]
pub struct ObjectHandle {
    pub key: BlobKey,
    pub handle: HandleRef,
    pub created_at: Timestamp,
    blob: Arc<CachedBlob>,
}

impl ObjectHandle {
    /// The blob this handle renders.
    pub fn blob(&self) -> &Arc<CachedBlob> {
        &self.blob
    }
}

#[derive(Debug, Default)]
struct Handles {
    live: HashMap<HandleRef, ObjectHandle>,
    by_key: HashMap<BlobKey, HandleRef>,
    order: VecDeque<HandleRef>,
}

impl Handles {
    fn remove(&mut self, handle: &HandleRef) -> Option<ObjectHandle> {
        let removed = self.live.remove(handle)?;
        self.by_key.remove(&removed.key);
        self.order.retain(|h| h != handle);
        Some(removed)
    }
}

/// Ceiling-bounded handle registry. Clones share state.
#[derive(Debug, Clone)]
pub struct ObjectHandleTracker {
    state: Arc<Mutex<Handles>>,
    ceiling: usize,
    clock: Arc<dyn Clock>,
}

impl Default for ObjectHandleTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HANDLE_CEILING)
    }
}

impl ObjectHandleTracker {
    /// Creates a tracker. A ceiling of 0 is treated as 1.
    pub fn new(ceiling: usize) -> Self {
        Self::with_clock(ceiling, Arc::new(SystemClock))
    }

    pub fn with_clock(ceiling: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(Handles::default())),
            ceiling: ceiling.max(1),
            clock,
        }
    }

    pub fn ceiling(&self) -> usize {
        self.ceiling
    }

    /// Returns a handle for `blob`, reusing the live one for its key.
    pub fn acquire(&self, blob: &Arc<CachedBlob>) -> HandleRef {
        let mut state = self.lock();
        if let Some(existing) = state.by_key.get(&blob.key) {
            return *existing;
        }

        while state.live.len() >= self.ceiling {
            let Some(oldest) = state.order.front().copied() else {
                break;
            };
            if let Some(released) = state.remove(&oldest) {
                debug!("Handle ceiling reached, released {} ({})", released.handle, released.key);
            }
        }

        let handle = HandleRef::new();
        state.live.insert(
            handle,
            ObjectHandle {
                key: blob.key.clone(),
                handle,
                created_at: self.clock.now(),
                blob: Arc::clone(blob),
            },
        );
        state.by_key.insert(blob.key.clone(), handle);
        state.order.push_back(handle);
        handle
    }

    /// Releases a handle. Returns whether it was live.
    pub fn release(&self, handle: &HandleRef) -> bool {
        self.lock().remove(handle).is_some()
    }

    /// Releases the handle for one key, if any.
    pub fn invalidate(&self, key: &BlobKey) -> bool {
        let mut state = self.lock();
        match state.by_key.get(key).copied() {
            Some(handle) => state.remove(&handle).is_some(),
            None => false,
        }
    }

    /// Releases every handle. Returns how many were live.
    pub fn release_all(&self) -> usize {
        let mut state = self.lock();
        let count = state.live.len();
        state.live.clear();
        state.by_key.clear();
        state.order.clear();
        if count > 0 {
            debug!("Released all {} handles", count);
        }
        count
    }

    /// Looks up a live handle.
    pub fn get(&self, handle: &HandleRef) -> Option<ObjectHandle> {
        self.lock().live.get(handle).cloned()
    }

    /// Number of live handles.
    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    fn lock(&self) -> MutexGuard<'_, Handles> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
