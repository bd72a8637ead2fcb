//! Testing utilities and helpers
//!
//! - **[`time`]**: deterministic clock for backoff and debounce tests
//!
//! ```rust
//! use std::time::Duration;
//!
//! use checksync_common::testing::MockClock;
//!
//! let clock = MockClock::new();
//! clock.advance(Duration::from_secs(5));
//! assert_eq!(clock.elapsed(), Duration::from_secs(5));
//! ```

pub mod time;

pub use time::MockClock;
