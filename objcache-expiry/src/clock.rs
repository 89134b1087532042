//! A pluggable time source so the expiry engine can be driven by a fake
//! clock in tests (spec §8 boundary behaviors need to force specific
//! `now` values, e.g. the epoch-reset scenario).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch, as an `f64` so sub-second precision
/// survives until it's rounded into a 32-bit heap key.
pub trait Clock: Send + Sync {
    /// Current time, in seconds since the Unix epoch.
    fn now(&self) -> f64;
}

/// The real wall clock.
#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before Unix epoch")
            .as_secs_f64()
    }
}

/// A settable clock for deterministic tests, in particular the
/// key-space epoch-reset boundary behavior (spec §8).
#[derive(Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    /// Creates a manual clock starting at `now` seconds since the epoch.
    pub fn new(now: f64) -> Self {
        ManualClock(AtomicU64::new(now.to_bits()))
    }

    /// Sets the current time.
    pub fn set(&self, now: f64) {
        self.0.store(now.to_bits(), Ordering::Release);
    }

    /// Advances the current time by `delta` seconds.
    pub fn advance(&self, delta: f64) {
        self.set(self.now() + delta);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1000.0);
        assert_eq!(clock.now(), 1000.0);
        clock.advance(5.0);
        assert_eq!(clock.now(), 1005.0);
    }

    #[test]
    fn system_clock_is_roughly_now() {
        let clock = SystemClock;
        let t = clock.now();
        assert!(t > 1_700_000_000.0);
    }
}
