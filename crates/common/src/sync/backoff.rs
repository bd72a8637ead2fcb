//! Capped exponential backoff.
//!
//! `delay(n) = min(base * 2^n, cap)`. The sequence is non-decreasing in `n`
//! and never exceeds `cap`, including for attempt numbers large enough to
//! overflow the multiplication.

use std::time::Duration;

use crate::error::{CommonError, CommonResult};

/// Default delay before the first retry
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default upper bound on any single retry delay
pub const DEFAULT_CAP_DELAY: Duration = Duration::from_secs(60);

/// Capped exponential backoff without jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExponentialBackoff {
    base: Duration,
    cap: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self { base: DEFAULT_BASE_DELAY, cap: DEFAULT_CAP_DELAY }
    }
}

impl ExponentialBackoff {
    /// Create a backoff policy, validating that `0 < base <= cap`.
    pub fn new(base: Duration, cap: Duration) -> CommonResult<Self> {
        if base.is_zero() {
            return Err(CommonError::config_field("base_delay", "must be greater than zero"));
        }

        if base > cap {
            return Err(CommonError::config_field(
                "cap_delay",
                format!("cap_delay ({cap:?}) cannot be smaller than base_delay ({base:?})"),
            ));
        }

        Ok(Self { base, cap })
    }

    /// Delay before the retry that follows `attempt` failures.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        2_u32
            .checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }

    /// Base delay.
    #[must_use]
    pub const fn base(&self) -> Duration {
        self.base
    }

    /// Upper bound on any delay.
    #[must_use]
    pub const fn cap(&self) -> Duration {
        self.cap
    }
}
