//! Injected monotonic time sources
//!
//! Runners never read a wall clock to compute due times. They call the
//! [`Clock`] they were built with, which lets tests substitute a
//! [`ManualClock`] and step time explicitly.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Zero-argument function returning the current monotonic time
pub type Clock = Arc<dyn Fn() -> Duration + Send + Sync>;

/// Process-wide origin for [`monotonic_clock`]
static CLOCK_BASE: Lazy<Instant> = Lazy::new(Instant::now);

/// Create a clock measuring time elapsed since a process-wide base instant.
pub fn monotonic_clock() -> Clock {
    Arc::new(|| CLOCK_BASE.elapsed())
}

/// Fake clock for deterministic tests
///
/// Clones share the same underlying time, so a test can keep one handle and
/// hand [`ManualClock::clock`] to the component under test.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    /// Current time in nanoseconds
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a manual clock reading `start`
    pub fn new(start: Duration) -> Self {
        Self {
            nanos: Arc::new(AtomicU64::new(to_nanos(start))),
        }
    }

    /// Current reading
    pub fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }

    /// Jump to an absolute reading.
    ///
    /// Monotonicity is the caller's responsibility; moving backwards only
    /// delays items that were already due.
    pub fn set(&self, now: Duration) {
        self.nanos.store(to_nanos(now), Ordering::Release);
    }

    /// Move time forward by `delta`
    pub fn advance(&self, delta: Duration) {
        self.nanos.fetch_add(to_nanos(delta), Ordering::AcqRel);
    }

    /// A [`Clock`] reading this manual clock
    pub fn clock(&self) -> Clock {
        let nanos = Arc::clone(&self.nanos);
        Arc::new(move || Duration::from_nanos(nanos.load(Ordering::Acquire)))
    }
}

fn to_nanos(d: Duration) -> u64 {
    u64::try_from(d.as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_clock_never_goes_backwards() {
        let clock = monotonic_clock();
        let a = clock();
        let b = clock();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock_advance_and_set() {
        let manual = ManualClock::new(Duration::from_secs(5));
        let clock = manual.clock();
        assert_eq!(clock(), Duration::from_secs(5));

        manual.advance(Duration::from_millis(250));
        assert_eq!(clock(), Duration::from_millis(5250));

        manual.set(Duration::from_secs(60));
        assert_eq!(manual.now(), Duration::from_secs(60));
        assert_eq!(clock(), Duration::from_secs(60));
    }

    #[test]
    fn test_manual_clock_clones_share_time() {
        let manual = ManualClock::default();
        let other = manual.clone();
        other.advance(Duration::from_secs(1));
        assert_eq!(manual.now(), Duration::from_secs(1));
    }
}
