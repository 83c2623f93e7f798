//! Media caching for the Murmur client core.
//!
//! [`MediaCache`] resolves media URLs to renderable handles through two
//! tiers:
//! - **Memory**: a bounded ring of recently loaded blobs ([`MemoryTier`])
//! - **Persistent**: a namespace-scoped SQLite blob store behind the
//!   [`PersistentTier`] trait, with a byte budget and LRU eviction
//!
//! Misses are fetched over the network with the timeout and retry budget
//! of the current connection tier. Handles are tracked by an
//! [`ObjectHandleTracker`] with a fixed ceiling.

mod blob;
mod bypass;
mod cache;
mod config;
mod error;
mod events;
mod handles;
mod memory;
mod persistent;
mod placeholder;
mod sniff;

pub use blob::{BlobKey, CachedBlob};
pub use bypass::BypassPolicy;
pub use cache::{MediaCache, MediaCacheBuilder, MediaHandle, Resolution, PERSISTENT_TOUCH_INTERVAL};
pub use config::{CacheCategory, CacheTierConfig, CategoryTtl, DeviceClass, PlatformClass};
pub use error::{MediaError, MediaResult};
pub use events::{CacheStats, MediaEvent};
pub use handles::{ObjectHandle, ObjectHandleTracker, DEFAULT_HANDLE_CEILING};
pub use memory::MemoryTier;
pub use persistent::{PersistentTier, SqlitePersistentTier, EVICTION_FRACTION};
pub use placeholder::Placeholder;
pub use sniff::sniff_mime;
