//! Mock clock for deterministic testing
//!
//! `MockClock` never waits on real time. By default `sleep` records the
//! requested duration, advances the simulated clock and returns immediately,
//! which makes retry backoff observable without slowing tests down.
//!
//! With [`MockClock::hold_sleeps`] enabled, sleeps park until
//! [`MockClock::release_sleeps`] is called (or the sleeping future is
//! dropped), which is how cancellation of a backoff wait is tested.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use checksync_common::testing::MockClock;
//! use checksync_common::time::Clock;
//!
//! # tokio_test_block_on(async {
//! let clock = MockClock::new();
//! let start = clock.now();
//! clock.sleep(Duration::from_secs(5)).await;
//! assert_eq!(clock.now().duration_since(start), Duration::from_secs(5));
//! assert_eq!(clock.sleep_calls(), vec![Duration::from_secs(5)]);
//! # });
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::time::Clock;

#[derive(Debug, Default)]
struct MockState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
    hold: bool,
}

/// Mock clock for deterministic testing
#[derive(Debug, Clone)]
pub struct MockClock {
    start: Instant,
    base_system_time: SystemTime,
    state: Arc<Mutex<MockState>>,
    release: Arc<Notify>,
    sleep_started: Arc<Notify>,
}

impl MockClock {
    /// Create a new mock clock
    ///
    /// The clock starts at the current real time but only moves when advanced
    /// manually or by a completed `sleep`.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            base_system_time: SystemTime::now(),
            state: Arc::new(Mutex::new(MockState::default())),
            release: Arc::new(Notify::new()),
            sleep_started: Arc::new(Notify::new()),
        }
    }

    /// Advance the mock clock by a duration
    pub fn advance(&self, duration: Duration) {
        self.state.lock().elapsed += duration;
    }

    /// Set the mock clock to a specific elapsed time
    pub fn set_elapsed(&self, duration: Duration) {
        self.state.lock().elapsed = duration;
    }

    /// Get the current elapsed time
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.state.lock().elapsed
    }

    /// Every duration passed to `sleep`, in call order.
    #[must_use]
    pub fn sleep_calls(&self) -> Vec<Duration> {
        self.state.lock().sleeps.clone()
    }

    /// When `true`, subsequent sleeps park until [`Self::release_sleeps`].
    pub fn hold_sleeps(&self, hold: bool) {
        self.state.lock().hold = hold;
    }

    /// Complete every currently parked sleep.
    pub fn release_sleeps(&self) {
        self.release.notify_waiters();
    }

    /// Wait until at least `count` sleeps have been requested.
    pub async fn wait_for_sleeps(&self, count: usize) {
        loop {
            let started = self.sleep_started.notified();
            tokio::pin!(started);
            started.as_mut().enable();

            if self.state.lock().sleeps.len() >= count {
                return;
            }
            started.await;
        }
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for MockClock {
    fn now(&self) -> Instant {
        self.start + self.elapsed()
    }

    fn system_time(&self) -> SystemTime {
        self.base_system_time + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        let released = self.release.notified();
        tokio::pin!(released);
        released.as_mut().enable();

        let held = {
            let mut state = self.state.lock();
            state.sleeps.push(duration);
            state.hold
        };
        self.sleep_started.notify_waiters();

        if held {
            released.await;
        }
        self.advance(duration);
    }
}
