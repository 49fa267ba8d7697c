use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

/// Limiter for log lines on the packet path.
///
/// Lines past the quota are counted and reported with the next line that
/// gets through.
pub struct LogLimiter<C: Clock = DefaultClock> {
    limiter: RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<C::Instant>>,
    suppressed: AtomicU64,
}

impl LogLimiter {
    /// Allow `per_second` lines on average, with bursts of up to `burst`.
    pub fn new(per_second: u32, burst: u32) -> Self {
        LogLimiter {
            limiter: RateLimiter::direct(quota(per_second, burst)),
            suppressed: AtomicU64::new(0),
        }
    }
}

impl<C: Clock> LogLimiter<C> {
    pub fn with_clock(quota: Quota, clock: &C) -> Self {
        LogLimiter {
            limiter: RateLimiter::direct_with_clock(quota, clock),
            suppressed: AtomicU64::new(0),
        }
    }

    /// Check whether a line may be logged now.
    ///
    /// Returns the number of lines suppressed since the last allowed one,
    /// or `None` if this line should be dropped.
    pub fn check(&self) -> Option<u64> {
        if self.limiter.check().is_ok() {
            Some(self.suppressed.swap(0, Ordering::Relaxed))
        } else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            None
        }
    }
}

impl Default for LogLimiter {
    /// Two lines per second, bursts of ten.
    fn default() -> Self {
        LogLimiter::new(2, 10)
    }
}

fn quota(per_second: u32, burst: u32) -> Quota {
    let rate = NonZeroU32::new(per_second).unwrap_or(NonZeroU32::MIN);
    let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
    Quota::per_second(rate).allow_burst(burst)
}
