//! Time abstraction for testability
//!
//! Everything in the sync engine that reads the wall clock or waits (retry
//! backoff, network debounce windows) goes through [`Clock`], so tests can
//! substitute the deterministic `MockClock` from `testing`.
//!
//! # Examples
//!
//! ```
//! use checksync_common::time::{Clock, SystemClock};
//!
//! let clock = SystemClock;
//! let stamp = clock.utc_now();
//! assert!(clock.millis_since_epoch() > 0);
//! # let _ = stamp;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Shared, dynamically dispatched clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Trait for time operations to enable testing
#[async_trait]
pub trait Clock: Send + Sync {
    /// Get current instant (monotonic time)
    fn now(&self) -> Instant;

    /// Get current system time (wall clock)
    fn system_time(&self) -> SystemTime;

    /// Wait for `duration` to elapse on this clock.
    async fn sleep(&self, duration: Duration);

    /// Current wall clock time as a UTC timestamp.
    fn utc_now(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from(self.system_time())
    }

    /// Get milliseconds since UNIX epoch
    #[allow(clippy::cast_possible_truncation)]
    fn millis_since_epoch(&self) -> u64 {
        self.system_time().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
    }
}

/// Real system clock implementation backed by tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn system_time(&self) -> SystemTime {
        SystemTime::now()
    }

    async fn sleep(&self, duration: Duration) {
        tracing::trace!(?duration, "Clock sleep");
        tokio::time::sleep(duration).await;
    }
}
