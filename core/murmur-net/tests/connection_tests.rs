use async_trait::async_trait;
use murmur_net::{
    classify, spawn_polling, ConnectionProfile, ConnectionSignal, ConnectionTier, PolicyTable,
    QualityTier, SignalSource, SignalSample, TierThresholds,
};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn tier(bw: Option<f64>, rtt: Option<u32>, save_data: bool) -> ConnectionTier {
    classify(&TierThresholds::default(), bw, rtt, save_data)
}

// ── Classification ───────────────────────────────────────────────

#[test]
fn low_bandwidth_or_high_rtt_is_slow() {
    assert_eq!(tier(Some(0.5), Some(250), false), ConnectionTier::Slow);
    assert_eq!(tier(Some(0.9), Some(20), false), ConnectionTier::Slow);
    assert_eq!(tier(Some(50.0), Some(201), false), ConnectionTier::Slow);
}

#[test]
fn middle_band_is_medium() {
    assert_eq!(tier(Some(3.0), Some(50), false), ConnectionTier::Medium);
    assert_eq!(tier(Some(20.0), Some(150), false), ConnectionTier::Medium);
}

#[test]
fn good_signal_is_fast() {
    assert_eq!(tier(Some(10.0), Some(40), false), ConnectionTier::Fast);
}

#[test]
fn thresholds_are_exclusive() {
    // Exactly 1 Mbps / 200 ms is not slow; exactly 5 Mbps / 100 ms is fast.
    assert_eq!(tier(Some(1.0), Some(200), false), ConnectionTier::Medium);
    assert_eq!(tier(Some(5.0), Some(100), false), ConnectionTier::Fast);
}

#[test]
fn save_data_forces_slow() {
    assert_eq!(tier(Some(100.0), Some(5), true), ConnectionTier::Slow);
    assert_eq!(tier(None, None, true), ConnectionTier::Slow);
}

#[test]
fn unknown_signal_is_medium() {
    assert_eq!(tier(None, None, false), ConnectionTier::Medium);
    assert_eq!(ConnectionSignal::unknown().derived_tier, ConnectionTier::Medium);
}

#[test]
fn partial_measurements_classify() {
    assert_eq!(tier(None, Some(300), false), ConnectionTier::Slow);
    assert_eq!(tier(Some(20.0), None, false), ConnectionTier::Fast);
}

proptest! {
    #[test]
    fn save_data_always_wins(bw in 0.0f64..1000.0, rtt in 0u32..5000) {
        prop_assert_eq!(tier(Some(bw), Some(rtt), true), ConnectionTier::Slow);
    }

    #[test]
    fn more_bandwidth_never_lowers_tier(bw in 0.0f64..100.0, extra in 0.0f64..100.0, rtt in 0u32..500) {
        let rank = |t: ConnectionTier| match t {
            ConnectionTier::Slow => 0,
            ConnectionTier::Medium => 1,
            ConnectionTier::Fast => 2,
        };
        let base = tier(Some(bw), Some(rtt), false);
        let better = tier(Some(bw + extra), Some(rtt), false);
        prop_assert!(rank(better) >= rank(base));
    }
}

// ── Policies ─────────────────────────────────────────────────────

#[test]
fn slower_tiers_get_longer_timeouts_and_more_retries() {
    let table = PolicyTable::default();
    assert!(table.slow.timeout_ms > table.medium.timeout_ms);
    assert!(table.medium.timeout_ms > table.fast.timeout_ms);
    assert!(table.slow.max_retries > table.medium.max_retries);
    assert!(table.medium.max_retries > table.fast.max_retries);
}

#[test]
fn quality_follows_tier() {
    assert_eq!(QualityTier::for_connection(ConnectionTier::Slow), QualityTier::Low);
    assert_eq!(QualityTier::for_connection(ConnectionTier::Medium), QualityTier::Medium);
    assert_eq!(QualityTier::for_connection(ConnectionTier::Fast), QualityTier::High);
}

// ── Profile ──────────────────────────────────────────────────────

#[test]
fn profile_observation_updates_tier_and_policy() {
    let profile = ConnectionProfile::default();
    assert_eq!(profile.current_tier(), ConnectionTier::Medium);

    profile.observe(Some(0.5), Some(250));
    assert_eq!(profile.current_tier(), ConnectionTier::Slow);
    assert_eq!(profile.current_policy(), PolicyTable::default().slow);
    assert_eq!(profile.current_quality(), QualityTier::Low);

    let signal = profile.signal();
    assert_eq!(signal.bandwidth_mbps, Some(0.5));
    assert_eq!(signal.rtt_ms, Some(250));
}

#[test]
fn clones_share_state() {
    let profile = ConnectionProfile::default();
    let other = profile.clone();
    other.set_save_data(true);
    assert_eq!(profile.current_tier(), ConnectionTier::Slow);
    other.set_save_data(false);
    assert_eq!(profile.current_tier(), ConnectionTier::Medium);
}

#[test]
fn subscribers_are_notified_only_on_tier_change() {
    let profile = ConnectionProfile::default();
    let mut rx = profile.subscribe();

    profile.observe(Some(0.5), Some(250));
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().derived_tier, ConnectionTier::Slow);

    // Different numbers, same tier.
    profile.observe(Some(0.6), Some(260));
    assert!(!rx.has_changed().unwrap());
    assert_eq!(profile.signal().bandwidth_mbps, Some(0.6));

    profile.observe(Some(50.0), Some(10));
    assert!(rx.has_changed().unwrap());
    assert_eq!(rx.borrow_and_update().derived_tier, ConnectionTier::Fast);
}

// ── Polling ──────────────────────────────────────────────────────

struct ScriptedSource {
    calls: AtomicUsize,
}

#[async_trait]
impl SignalSource for ScriptedSource {
    async fn sample(&self) -> Option<SignalSample> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 0 {
            Some(SignalSample {
                bandwidth_mbps: Some(0.3),
                rtt_ms: Some(400),
                save_data: false,
            })
        } else {
            Some(SignalSample {
                bandwidth_mbps: Some(30.0),
                rtt_ms: Some(30),
                save_data: false,
            })
        }
    }
}

#[tokio::test(start_paused = true)]
async fn polling_feeds_profile() {
    let profile = ConnectionProfile::default();
    let source = Arc::new(ScriptedSource {
        calls: AtomicUsize::new(0),
    });
    let handle = spawn_polling(profile.clone(), source.clone(), Duration::from_secs(10));

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(profile.current_tier(), ConnectionTier::Slow);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(profile.current_tier(), ConnectionTier::Fast);
    assert!(source.calls.load(Ordering::SeqCst) >= 2);

    handle.abort();
}
