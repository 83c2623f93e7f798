use murmur_net::QualityTier;
use murmur_storage::BlobRecord;
use murmur_types::Timestamp;
use std::fmt;
use std::time::Duration;

/// Identity of a cached asset: the source URL at one quality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BlobKey {
    pub url: String,
    pub quality: QualityTier,
}

impl BlobKey {
    pub fn new(url: impl Into<String>, quality: QualityTier) -> Self {
        Self {
            url: url.into(),
            quality,
        }
    }

    /// Every quality variant of a URL.
    pub fn variants(url: &str) -> [BlobKey; 3] {
        [QualityTier::Low, QualityTier::Medium, QualityTier::High]
            .map(|quality| BlobKey::new(url, quality))
    }

    /// Parses the `quality|url` form written by [`Display`](fmt::Display).
    pub fn parse(s: &str) -> Option<Self> {
        let (quality, url) = s.split_once('|')?;
        let quality = match quality {
            "low" => QualityTier::Low,
            "medium" => QualityTier::Medium,
            "high" => QualityTier::High,
            _ => return None,
        };
        Some(Self::new(url, quality))
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.quality, self.url)
    }
}

/// A cached binary asset.
///
/// `expires_at` is always strictly after `created_at`; an entry is expired
/// once `expires_at <= now`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedBlob {
    pub key: BlobKey,
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub size_bytes: u64,
    pub created_at: Timestamp,
    pub last_accessed_at: Timestamp,
    pub access_count: u64,
    pub expires_at: Timestamp,
}

impl CachedBlob {
    /// Creates a blob. A zero TTL is clamped to 1 ms.
    pub fn new(
        key: BlobKey,
        bytes: Vec<u8>,
        mime_type: impl Into<String>,
        ttl: Duration,
        now: Timestamp,
    ) -> Self {
        let ttl = ttl.max(Duration::from_millis(1));
        Self {
            key,
            size_bytes: bytes.len() as u64,
            bytes,
            mime_type: mime_type.into(),
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at <= now
    }

    pub(crate) fn to_record(&self) -> BlobRecord {
        BlobRecord {
            key: self.key.to_string(),
            url: self.key.url.clone(),
            bytes: self.bytes.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.size_bytes,
            created_at: self.created_at,
            last_accessed_at: self.last_accessed_at,
            access_count: self.access_count,
            expires_at: self.expires_at,
        }
    }

    pub(crate) fn from_record(key: BlobKey, record: BlobRecord) -> Self {
        Self {
            key,
            size_bytes: record.size_bytes,
            bytes: record.bytes,
            mime_type: record.mime_type,
            created_at: record.created_at,
            last_accessed_at: record.last_accessed_at,
            access_count: record.access_count,
            expires_at: record.expires_at,
        }
    }
}
