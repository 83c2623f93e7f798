use murmur_types::{Clock, ManualClock, SystemClock, Timestamp};
use proptest::prelude::*;
use std::time::Duration;

// ── Construction ─────────────────────────────────────────────────

#[test]
fn now_is_after_epoch() {
    assert!(Timestamp::now() > Timestamp::EPOCH);
}

#[test]
fn from_millis_roundtrip() {
    assert_eq!(Timestamp::from_millis(42).as_millis(), 42);
}

// ── Arithmetic ───────────────────────────────────────────────────

#[test]
fn add_and_sub_duration() {
    let t = Timestamp::from_millis(1_000);
    assert_eq!((t + Duration::from_secs(2)).as_millis(), 3_000);
    assert_eq!((t - Duration::from_millis(250)).as_millis(), 750);
}

#[test]
fn millis_since_saturates() {
    let a = Timestamp::from_millis(100);
    let b = Timestamp::from_millis(300);
    assert_eq!(b.millis_since(a), 200);
    assert_eq!(a.millis_since(b), 0);
}

// ── Clocks ───────────────────────────────────────────────────────

#[test]
fn system_clock_moves_forward() {
    let clock = SystemClock;
    let a = clock.now();
    let b = clock.now();
    assert!(b >= a);
}

#[test]
fn manual_clock_is_shared_between_clones() {
    let clock = ManualClock::new(Timestamp::from_millis(10));
    let other = clock.clone();
    clock.advance(Duration::from_millis(5));
    assert_eq!(other.now(), Timestamp::from_millis(15));
    other.set(Timestamp::from_millis(99));
    assert_eq!(clock.now(), Timestamp::from_millis(99));
}

proptest! {
    #[test]
    fn ordering_matches_millis(a in any::<i32>(), b in any::<i32>()) {
        let ta = Timestamp::from_millis(a as i64);
        let tb = Timestamp::from_millis(b as i64);
        prop_assert_eq!(ta.cmp(&tb), (a as i64).cmp(&(b as i64)));
    }
}
