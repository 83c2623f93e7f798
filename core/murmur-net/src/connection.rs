//! Connection profiling.
//!
//! Measured bandwidth and round-trip time are classified into a coarse
//! [`ConnectionTier`]. Consumers never read raw measurements; they ask for
//! the tier's [`ConnectionPolicy`] (timeout, retry budget, retry delay) at
//! the start of each operation, so a tier change only affects operations
//! that start after it. In-flight work is never cancelled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Coarse network quality classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionTier {
    Slow,
    Medium,
    Fast,
}

impl fmt::Display for ConnectionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionTier::Slow => "slow",
            ConnectionTier::Medium => "medium",
            ConnectionTier::Fast => "fast",
        };
        f.write_str(s)
    }
}

/// Media quality requested for a connection tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
}

impl QualityTier {
    /// Quality matching a connection tier.
    pub fn for_connection(tier: ConnectionTier) -> Self {
        match tier {
            ConnectionTier::Slow => QualityTier::Low,
            ConnectionTier::Medium => QualityTier::Medium,
            ConnectionTier::Fast => QualityTier::High,
        }
    }

    /// Stable lowercase name, used in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Low => "low",
            QualityTier::Medium => "medium",
            QualityTier::High => "high",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Timeout and retry parameters for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionPolicy {
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
}

impl ConnectionPolicy {
    /// Per-attempt timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Fixed delay between attempts.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Policies for every tier. Slower tiers get longer timeouts and more
/// retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTable {
    pub slow: ConnectionPolicy,
    pub medium: ConnectionPolicy,
    pub fast: ConnectionPolicy,
}

impl Default for PolicyTable {
    fn default() -> Self {
        Self {
            slow: ConnectionPolicy {
                timeout_ms: 15_000,
                max_retries: 3,
                retry_delay_ms: 2_000,
            },
            medium: ConnectionPolicy {
                timeout_ms: 10_000,
                max_retries: 2,
                retry_delay_ms: 1_000,
            },
            fast: ConnectionPolicy {
                timeout_ms: 5_000,
                max_retries: 1,
                retry_delay_ms: 500,
            },
        }
    }
}

impl PolicyTable {
    /// Policy for a tier.
    pub fn get(&self, tier: ConnectionTier) -> ConnectionPolicy {
        match tier {
            ConnectionTier::Slow => self.slow,
            ConnectionTier::Medium => self.medium,
            ConnectionTier::Fast => self.fast,
        }
    }
}

/// Classification thresholds. A measurement on the wrong side of either
/// bound drops the connection into that tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    /// Bandwidth below this (Mbps) is slow.
    pub slow_bandwidth_mbps: f64,
    /// RTT above this (ms) is slow.
    pub slow_rtt_ms: u32,
    /// Bandwidth below this (Mbps) is at most medium.
    pub medium_bandwidth_mbps: f64,
    /// RTT above this (ms) is at most medium.
    pub medium_rtt_ms: u32,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            slow_bandwidth_mbps: 1.0,
            slow_rtt_ms: 200,
            medium_bandwidth_mbps: 5.0,
            medium_rtt_ms: 100,
        }
    }
}

/// Classifies a measurement. Save-data forces `Slow`; with no measurement
/// at all the connection is assumed `Medium`.
pub fn classify(
    thresholds: &TierThresholds,
    bandwidth_mbps: Option<f64>,
    rtt_ms: Option<u32>,
    save_data: bool,
) -> ConnectionTier {
    if save_data {
        return ConnectionTier::Slow;
    }
    if bandwidth_mbps.is_none() && rtt_ms.is_none() {
        return ConnectionTier::Medium;
    }

    let below = |limit: f64| bandwidth_mbps.is_some_and(|bw| bw < limit);
    let above = |limit: u32| rtt_ms.is_some_and(|rtt| rtt > limit);

    if below(thresholds.slow_bandwidth_mbps) || above(thresholds.slow_rtt_ms) {
        ConnectionTier::Slow
    } else if below(thresholds.medium_bandwidth_mbps) || above(thresholds.medium_rtt_ms) {
        ConnectionTier::Medium
    } else {
        ConnectionTier::Fast
    }
}

/// The latest observed network signal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSignal {
    pub bandwidth_mbps: Option<f64>,
    pub rtt_ms: Option<u32>,
    pub save_data: bool,
    pub derived_tier: ConnectionTier,
}

impl ConnectionSignal {
    /// A signal with no measurements yet.
    pub fn unknown() -> Self {
        Self {
            bandwidth_mbps: None,
            rtt_ms: None,
            save_data: false,
            derived_tier: ConnectionTier::Medium,
        }
    }
}

/// One reading from a [`SignalSource`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SignalSample {
    pub bandwidth_mbps: Option<f64>,
    pub rtt_ms: Option<u32>,
    pub save_data: bool,
}

/// Platform hook that reports the current network signal.
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// Returns the current reading, or `None` if the platform cannot tell.
    async fn sample(&self) -> Option<SignalSample>;
}

#[derive(Debug)]
struct ProfileInner {
    thresholds: TierThresholds,
    policies: PolicyTable,
    signal: watch::Sender<ConnectionSignal>,
}

/// Process-wide connection classifier. Clones share state.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    inner: Arc<ProfileInner>,
}

impl Default for ConnectionProfile {
    fn default() -> Self {
        Self::new(TierThresholds::default(), PolicyTable::default())
    }
}

impl ConnectionProfile {
    /// Creates a profile with custom thresholds and policies.
    pub fn new(thresholds: TierThresholds, policies: PolicyTable) -> Self {
        let (signal, _) = watch::channel(ConnectionSignal::unknown());
        Self {
            inner: Arc::new(ProfileInner {
                thresholds,
                policies,
                signal,
            }),
        }
    }

    /// Records a bandwidth/RTT measurement.
    pub fn observe(&self, bandwidth_mbps: Option<f64>, rtt_ms: Option<u32>) {
        self.update(|s| {
            s.bandwidth_mbps = bandwidth_mbps;
            s.rtt_ms = rtt_ms;
        });
    }

    /// Records the user's save-data preference.
    pub fn set_save_data(&self, enabled: bool) {
        self.update(|s| s.save_data = enabled);
    }

    /// Records a complete signal sample.
    pub fn apply_sample(&self, sample: SignalSample) {
        self.update(|s| {
            s.bandwidth_mbps = sample.bandwidth_mbps;
            s.rtt_ms = sample.rtt_ms;
            s.save_data = sample.save_data;
        });
    }

    /// Applies a change and re-derives the tier. Subscribers are only woken
    /// when the tier actually changes.
    fn update(&self, change: impl FnOnce(&mut ConnectionSignal)) {
        let thresholds = self.inner.thresholds;
        self.inner.signal.send_if_modified(|signal| {
            let before = signal.derived_tier;
            change(signal);
            signal.derived_tier =
                classify(&thresholds, signal.bandwidth_mbps, signal.rtt_ms, signal.save_data);
            if signal.derived_tier != before {
                info!("Connection tier changed: {} -> {}", before, signal.derived_tier);
                true
            } else {
                false
            }
        });
    }

    /// Returns the latest signal.
    pub fn signal(&self) -> ConnectionSignal {
        *self.inner.signal.borrow()
    }

    /// Returns the current tier.
    pub fn current_tier(&self) -> ConnectionTier {
        self.inner.signal.borrow().derived_tier
    }

    /// Returns the policy for a tier.
    pub fn policy_for(&self, tier: ConnectionTier) -> ConnectionPolicy {
        self.inner.policies.get(tier)
    }

    /// Returns the policy for the current tier.
    pub fn current_policy(&self) -> ConnectionPolicy {
        self.policy_for(self.current_tier())
    }

    /// Returns the media quality for the current tier.
    pub fn current_quality(&self) -> QualityTier {
        QualityTier::for_connection(self.current_tier())
    }

    /// Subscribes to tier changes.
    pub fn subscribe(&self) -> watch::Receiver<ConnectionSignal> {
        self.inner.signal.subscribe()
    }
}

/// Polls a signal source on a fixed interval and feeds readings into the profile.
pub fn spawn_polling(
    profile: ConnectionProfile,
    source: Arc<dyn SignalSource>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match source.sample().await {
                Some(sample) => profile.apply_sample(sample),
                None => debug!("Signal source returned no reading"),
            }
        }
    })
}
