//! # Chain Clocks
//!
//! Each chain has its own notion of "now". The two chains in a registry pair
//! are never assumed to agree, so a [`Clock`] belongs to a chain, not to the
//! process.
//!
//! [`ManualClock`] lets tests and the demo scenario move time forward
//! explicitly instead of sleeping.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::types::Timestamp;

/// Source of the current block timestamp for one chain.
pub trait Clock: Send + Sync {
    /// Current unix time in seconds.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now().timestamp().max(0) as Timestamp
    }
}

/// A clock that only moves when told to. Monotonic: [`set`](Self::set)
/// refuses to go backwards.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a clock starting at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: AtomicU64::new(start),
        }
    }

    /// Creates a clock starting at the current wall-clock time.
    pub fn starting_now() -> Self {
        Self::new(SystemClock.now())
    }

    /// Moves the clock forward by `secs` and returns the new time.
    pub fn advance(&self, secs: u64) -> Timestamp {
        self.now.fetch_add(secs, Ordering::SeqCst) + secs
    }

    /// Jumps to `ts` if it is not in the past. Returns the resulting time.
    pub fn set(&self, ts: Timestamp) -> Timestamp {
        self.now.fetch_max(ts, Ordering::SeqCst).max(ts)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now(), 1_000);
        assert_eq!(clock.advance(300), 1_300);
        assert_eq!(clock.now(), 1_300);
    }

    #[test]
    fn manual_clock_never_goes_backwards() {
        let clock = ManualClock::new(5_000);
        assert_eq!(clock.set(4_000), 5_000);
        assert_eq!(clock.now(), 5_000);
        assert_eq!(clock.set(6_000), 6_000);
        assert_eq!(clock.now(), 6_000);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now() > 1_577_836_800);
    }
}
