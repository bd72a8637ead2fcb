//! Integration tests for the clock abstraction and backoff policy working
//! together, the way the sync orchestrator drives them.

use std::sync::Arc;
use std::time::Duration;

use checksync_common::testing::MockClock;
use checksync_common::time::SharedClock;
use checksync_common::ExponentialBackoff;

/// Validates that a retry loop sleeping through a shared clock handle
/// records exactly the backoff schedule.
///
/// Assertions:
/// - Confirms the recorded sleeps follow `min(base * 2^n, cap)`.
/// - Confirms the simulated clock advanced by their sum.
#[tokio::test]
async fn backoff_schedule_is_recorded_by_mock_clock() {
    let mock = MockClock::new();
    let clock: SharedClock = Arc::new(mock.clone());
    let backoff =
        ExponentialBackoff::new(Duration::from_millis(100), Duration::from_millis(300)).unwrap();

    for attempt in 1..=3 {
        clock.sleep(backoff.delay(attempt)).await;
    }

    assert_eq!(
        mock.sleep_calls(),
        vec![Duration::from_millis(200), Duration::from_millis(300), Duration::from_millis(300)]
    );
    assert_eq!(mock.elapsed(), Duration::from_millis(800));
}

/// Validates that dropping a held sleep leaves the clock untouched, which
/// is what a cancelled backoff wait looks like.
///
/// Assertions:
/// - Ensures the clock did not advance after the select picked the other arm.
#[tokio::test]
async fn dropped_held_sleep_does_not_advance() {
    let mock = MockClock::new();
    mock.hold_sleeps(true);
    let cancel = tokio::sync::Notify::new();
    cancel.notify_one();

    tokio::select! {
        biased;
        () = checksync_common::time::Clock::sleep(&mock, Duration::from_secs(10)) => {
            panic!("held sleep should not complete");
        }
        () = cancel.notified() => {}
    }

    assert_eq!(mock.elapsed(), Duration::ZERO);
    assert_eq!(mock.sleep_calls().len(), 1);
}
