use chrono::{Duration, TimeZone, Utc};
use std::sync::Arc;
use tablepos_types::{Clock, ManualClock, SystemClock};

// ── SystemClock ──────────────────────────────────────────────────

#[test]
fn system_clock_tracks_utc_now() {
    let before = Utc::now();
    let now = SystemClock.now();
    let after = Utc::now();
    assert!(before <= now && now <= after);
}

// ── ManualClock ──────────────────────────────────────────────────

#[test]
fn manual_clock_is_frozen() {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);
    assert_eq!(clock.now(), start);
}

#[test]
fn manual_clock_advance() {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    clock.advance(Duration::days(2));
    assert_eq!(clock.now(), start + Duration::days(2));
}

#[test]
fn manual_clock_advance_backwards() {
    let start = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    clock.advance(Duration::hours(-3));
    assert_eq!(clock.now(), start - Duration::hours(3));
}

#[test]
fn manual_clock_set() {
    let clock = ManualClock::at_timestamp(0);
    let target = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    clock.set(target);
    assert_eq!(clock.now(), target);
}

#[test]
fn at_timestamp() {
    let clock = ManualClock::at_timestamp(1_700_000_000);
    assert_eq!(clock.now().timestamp(), 1_700_000_000);
}

#[test]
fn usable_as_shared_trait_object() {
    let manual = Arc::new(ManualClock::at_timestamp(1_000));
    let clock: Arc<dyn Clock> = manual.clone();
    manual.advance(Duration::seconds(5));
    assert_eq!(clock.now().timestamp(), 1_005);
}
