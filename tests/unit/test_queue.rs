//! Queue scheduling primitive tests
//!
//! The Redis-backed queue itself needs a live bus; the admission-control and
//! retry primitives it composes are covered here.

use std::time::{Duration, Instant};

use renderlite::queue::{backoff_delay, RateWindow, BUILD_QUEUE, ROLLBACK_QUEUE};

#[test]
fn test_queue_names_match_persisted_layout() {
    assert_eq!(BUILD_QUEUE, "build-queue");
    assert_eq!(ROLLBACK_QUEUE, "rollback-queue");
}

#[test]
fn test_backoff_schedule_is_exponential_from_one_second() {
    let delays: Vec<u64> = (0..4).map(|a| backoff_delay(a).as_secs()).collect();
    assert_eq!(delays, vec![1, 2, 4, 8]);
}

#[test]
fn test_backoff_never_exceeds_cap() {
    for attempt in 0..64 {
        assert!(backoff_delay(attempt) <= Duration::from_secs(30));
    }
}

#[test]
fn test_default_rate_limit_five_per_minute() {
    let mut window = RateWindow::new(5, Duration::from_secs(60));
    let start = Instant::now();

    // Burst of five goes through, the sixth is refused.
    for i in 0..5 {
        assert!(window.try_admit(start + Duration::from_secs(i)), "job {i}");
    }
    assert!(!window.try_admit(start + Duration::from_secs(5)));

    // Refusal reports when the oldest admission ages out.
    let wait = window.next_slot(start + Duration::from_secs(5)).unwrap();
    assert_eq!(wait, Duration::from_secs(55));
}

#[test]
fn test_rate_window_is_rolling_not_fixed() {
    let mut window = RateWindow::new(2, Duration::from_secs(10));
    let start = Instant::now();

    assert!(window.try_admit(start));
    assert!(window.try_admit(start + Duration::from_secs(9)));

    // A fixed window would reset entirely; a rolling one only frees the
    // slot of the admission that aged out.
    assert!(window.try_admit(start + Duration::from_secs(11)));
    assert!(!window.try_admit(start + Duration::from_secs(12)));
    assert!(window.try_admit(start + Duration::from_secs(19)));
}

#[test]
fn test_empty_window_is_always_admissible() {
    let mut window = RateWindow::new(1, Duration::from_secs(60));
    let mut now = Instant::now();
    for _ in 0..3 {
        assert!(window.next_slot(now).is_none());
        assert!(window.try_admit(now));
        now += Duration::from_secs(61);
    }
}
