//! Network-facing collaborators for the Murmur client core.
//!
//! - **Connection profile**: classifies measured signal quality into a
//!   [`ConnectionTier`] and hands out the matching [`ConnectionPolicy`]
//! - **Retry**: [`RetryPolicy`] runs an async operation in a bounded loop
//! - **Fetch**: the [`MediaFetcher`] and [`JsonFetcher`] traits the cache
//!   and sync engine depend on, and [`HttpClient`], their reqwest
//!   implementation
//!
//! # Example
//!
//! ```
//! use murmur_net::{ConnectionProfile, ConnectionTier};
//!
//! let profile = ConnectionProfile::default();
//! profile.observe(Some(0.5), Some(250));
//! assert_eq!(profile.current_tier(), ConnectionTier::Slow);
//! assert_eq!(profile.current_policy().max_retries, 3);
//! ```

mod connection;
mod error;
mod fetch;
mod http;
mod retry;

pub use connection::{
    classify, spawn_polling, ConnectionPolicy, ConnectionProfile, ConnectionSignal,
    ConnectionTier, PolicyTable, QualityTier, SignalSource, SignalSample, TierThresholds,
};
pub use error::{NetError, NetResult};
pub use fetch::{FetchedMedia, JsonFetcher, MediaFetcher};
pub use http::{HttpClient, HttpConfig};
pub use retry::RetryPolicy;
