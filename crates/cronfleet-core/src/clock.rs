//! Time source for the lease protocol.
//!
//! The engine, the ledger pruning and the TTL-aware stores never call
//! `SystemTime::now()` directly; they read a [`Clock`]. Tests share one
//! [`ManualClock`] between the store and every simulated instance.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;

    /// Seconds since the Unix epoch.
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1000
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_millis(&self) -> u64 {
        (**self).now_millis()
    }
}

/// The operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    /// Start at the given Unix time in seconds.
    pub fn at_secs(secs: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(secs * 1000)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_secs(&self, secs: u64) {
        self.millis.store(secs * 1000, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_shared_time() {
        let clock = ManualClock::at_secs(1_000);
        let other = clock.clone();

        clock.advance(Duration::from_secs(61));
        assert_eq!(other.now_secs(), 1_061);
        assert_eq!(other.now_millis(), 1_061_000);

        other.set_secs(5);
        assert_eq!(clock.now_secs(), 5);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_secs() > 1_577_836_800);
    }

    #[test]
    fn arc_clock_delegates() {
        let clock = Arc::new(ManualClock::at_secs(42));
        assert_eq!(clock.now_secs(), 42);
    }
}
