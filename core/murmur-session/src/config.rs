use murmur_media::{CacheTierConfig, DeviceClass, PlatformClass, DEFAULT_HANDLE_CEILING};
use murmur_storage::EntityStoreConfig;
use murmur_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Everything a session needs to know at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub device: DeviceClass,
    pub platform: PlatformClass,
    /// Replaces the tier limits selected from `device` and `platform`.
    pub cache_override: Option<CacheTierConfig>,
    pub entity_store: EntityStoreConfig,
    pub sync: SyncConfig,
    /// Live renderer handle ceiling.
    pub handle_ceiling: usize,
    /// Seconds between expired-entry sweeps of the media cache.
    pub purge_interval_secs: u64,
    /// SQLite database shared by every user on this device. `None` keeps
    /// each session in memory.
    pub database_path: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device: DeviceClass::Standard,
            platform: PlatformClass::Desktop,
            cache_override: None,
            entity_store: EntityStoreConfig::default(),
            sync: SyncConfig::default(),
            handle_ceiling: DEFAULT_HANDLE_CEILING,
            purge_interval_secs: 5 * 60,
            database_path: None,
        }
    }
}

impl SessionConfig {
    /// The cache tier limits this session runs with.
    pub fn cache(&self) -> CacheTierConfig {
        self.cache_override
            .unwrap_or_else(|| CacheTierConfig::select(self.device, self.platform))
    }

    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_secs)
    }

    /// Rejects settings no session can run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.sync.page_size == 0 {
            return Err("sync.page_size must be positive".to_string());
        }
        if self.entity_store.max_entities == 0 {
            return Err("entity_store.max_entities must be positive".to_string());
        }
        if self.purge_interval_secs == 0 {
            return Err("purge_interval_secs must be positive".to_string());
        }
        Ok(())
    }
}
