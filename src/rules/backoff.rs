use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Default length of the insert backoff window after a full set.
pub const DEFAULT_BACKOFF_INTERVAL: Duration = Duration::from_secs(1);

/// Monotonic time source in nanoseconds.
///
/// Readings are always positive so that a zero deadline is in the past.
pub trait Clock: Send + Sync {
    fn now_nanos(&self) -> u64;
}

/// Clock backed by `Instant`, counted from its creation.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_nanos(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64 + 1
    }
}

/// Shared insert backoff deadline of one rule instance.
///
/// A single atomic word: relaxed reads on the packet path, one
/// compare-exchange when a full set is hit. A stale read only costs an
/// extra or a missed insert attempt.
#[derive(Debug, Default)]
pub struct Backoff {
    deadline: AtomicU64,
}

impl Backoff {
    /// A backoff whose deadline lies infinitely in the past.
    pub fn inactive() -> Self {
        Backoff {
            deadline: AtomicU64::new(0),
        }
    }

    /// True while `now` is before the deadline.
    #[inline]
    pub fn is_active(&self, now: u64) -> bool {
        self.deadline.load(Ordering::Relaxed) > now
    }

    /// Open a window ending `interval` after `now`.
    ///
    /// Returns false if another caller moved the deadline first; that
    /// caller's window stands.
    pub fn engage(&self, now: u64, interval: Duration) -> bool {
        let current = self.deadline.load(Ordering::Relaxed);
        let next = now.saturating_add(interval.as_nanos() as u64);
        if current >= next {
            return false;
        }

        self.deadline
            .compare_exchange(current, next, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    /// Current deadline in clock nanoseconds (0 when never engaged).
    pub fn deadline(&self) -> u64 {
        self.deadline.load(Ordering::Relaxed)
    }
}

/// Hand-driven clock for tests.
#[cfg(test)]
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicU64,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        ManualClock {
            now: AtomicU64::new(1),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_nanos() as u64, Ordering::Relaxed);
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now_nanos(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_inactive() {
        let backoff = Backoff::inactive();
        assert!(!backoff.is_active(1));
        assert_eq!(backoff.deadline(), 0);
    }

    #[test]
    fn test_engage_window() {
        let clock = ManualClock::new();
        let backoff = Backoff::inactive();

        assert!(backoff.engage(clock.now_nanos(), Duration::from_secs(1)));
        assert!(backoff.is_active(clock.now_nanos()));

        clock.advance(Duration::from_millis(999));
        assert!(backoff.is_active(clock.now_nanos()));

        // Deadline itself is no longer "in the future"
        clock.advance(Duration::from_millis(1));
        assert!(!backoff.is_active(clock.now_nanos()));
    }

    #[test]
    fn test_engage_does_not_shorten() {
        let backoff = Backoff::inactive();

        assert!(backoff.engage(100, Duration::from_nanos(50)));
        assert!(!backoff.engage(90, Duration::from_nanos(50)));
        assert_eq!(backoff.deadline(), 150);
    }

    #[test]
    fn test_monotonic_clock_positive() {
        let clock = MonotonicClock::new();
        let a = clock.now_nanos();
        let b = clock.now_nanos();
        assert!(a >= 1);
        assert!(b >= a);
    }
}
