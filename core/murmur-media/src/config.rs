//! Cache tier configuration.
//!
//! One [`CacheTierConfig`] is selected at startup from the device and
//! platform class and never changes for the life of a session.

use serde::{Deserialize, Serialize};
use std::time::Duration;

const MIB: u64 = 1024 * 1024;
const HOUR: u64 = 60 * 60;

/// Kind of asset being cached. Each kind has its own TTL and accepted
/// content types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheCategory {
    /// Avatars and banners.
    Profile,
    /// Images embedded in publications.
    Publication,
    /// Attached media: images, video, audio.
    Media,
}

impl CacheCategory {
    /// True if a body of this MIME type is a valid asset for the category.
    pub fn accepts(&self, mime_type: &str) -> bool {
        match self {
            CacheCategory::Profile | CacheCategory::Publication => mime_type.starts_with("image/"),
            CacheCategory::Media => ["image/", "video/", "audio/"]
                .iter()
                .any(|prefix| mime_type.starts_with(prefix)),
        }
    }
}

/// Time-to-live per category, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTtl {
    pub profile_secs: u64,
    pub publication_secs: u64,
    pub media_secs: u64,
}

impl Default for CategoryTtl {
    fn default() -> Self {
        Self {
            profile_secs: 24 * HOUR,
            publication_secs: 6 * HOUR,
            media_secs: 7 * 24 * HOUR,
        }
    }
}

impl CategoryTtl {
    pub fn get(&self, category: CacheCategory) -> Duration {
        let secs = match category {
            CacheCategory::Profile => self.profile_secs,
            CacheCategory::Publication => self.publication_secs,
            CacheCategory::Media => self.media_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Device capability bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Low,
    Standard,
    High,
}

impl DeviceClass {
    /// Buckets a device by memory and logical core count.
    pub fn classify(memory_gib: f64, logical_cores: usize) -> Self {
        if memory_gib <= 2.0 || logical_cores <= 2 {
            DeviceClass::Low
        } else if memory_gib >= 8.0 && logical_cores >= 8 {
            DeviceClass::High
        } else {
            DeviceClass::Standard
        }
    }
}

/// Host platform bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformClass {
    Desktop,
    Mobile,
    /// Platforms without usable persistent storage.
    Constrained,
}

/// Limits for both cache tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTierConfig {
    /// Byte budget of the persistent tier.
    pub max_total_bytes: u64,
    /// Entry bound of the memory tier.
    pub max_entry_count: usize,
    pub ttl: CategoryTtl,
    pub max_concurrent_loads: usize,
    /// Whether the persistent tier is used at all.
    pub persistent_tier: bool,
}

impl Default for CacheTierConfig {
    fn default() -> Self {
        Self::select(DeviceClass::Standard, PlatformClass::Desktop)
    }
}

impl CacheTierConfig {
    /// Picks the configuration for a device/platform pair.
    pub fn select(device: DeviceClass, platform: PlatformClass) -> Self {
        let (max_total_bytes, max_entry_count, max_concurrent_loads) = match device {
            DeviceClass::Low => (50 * MIB, 50, 2),
            DeviceClass::Standard => (150 * MIB, 150, 4),
            DeviceClass::High => (500 * MIB, 300, 6),
        };
        let max_concurrent_loads = match platform {
            PlatformClass::Desktop => max_concurrent_loads,
            PlatformClass::Mobile => max_concurrent_loads.min(4),
            PlatformClass::Constrained => max_concurrent_loads.min(2),
        };

        Self {
            max_total_bytes,
            max_entry_count,
            ttl: CategoryTtl::default(),
            max_concurrent_loads,
            persistent_tier: platform != PlatformClass::Constrained,
        }
    }

    /// TTL for a category.
    pub fn ttl_for(&self, category: CacheCategory) -> Duration {
        self.ttl.get(category)
    }
}
