//! Wall-time abstraction.
//!
//! Every component that needs "now" goes through [`Clock`], so tests can
//! drive the accrual engine with a scripted clock instead of sleeping.
//! Only [`SystemClock`] touches `std::time::SystemTime`.

use std::sync::atomic::{AtomicI64, Ordering};

/// Source of current wall time.
pub trait Clock: Send + Sync {
    /// Current wall time in whole seconds since the Unix epoch.
    fn epoch_secs(&self) -> i64;

    /// Current wall time in milliseconds since the Unix epoch.
    fn epoch_millis(&self) -> i64;
}

/// The real system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn epoch_secs(&self) -> i64 {
        self.epoch_millis() / 1000
    }

    fn epoch_millis(&self) -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

/// Settable clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    pub fn new(epoch_secs: i64) -> Self {
        Self {
            millis: AtomicI64::new(epoch_secs * 1000),
        }
    }

    pub fn set_secs(&self, epoch_secs: i64) {
        self.millis.store(epoch_secs * 1000, Ordering::SeqCst);
    }

    pub fn advance_secs(&self, secs: i64) {
        self.millis.fetch_add(secs * 1000, Ordering::SeqCst);
    }

    pub fn advance_millis(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn epoch_secs(&self) -> i64 {
        self.millis.load(Ordering::SeqCst) / 1000
    }

    fn epoch_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(1000);
        assert_eq!(clock.epoch_secs(), 1000);
        assert_eq!(clock.epoch_millis(), 1_000_000);

        clock.advance_secs(5);
        assert_eq!(clock.epoch_secs(), 1005);

        clock.set_secs(42);
        assert_eq!(clock.epoch_secs(), 42);
    }

    #[test]
    fn system_clock_is_sane() {
        let clock = SystemClock;
        // Well past 2020-01-01 and consistent between the two units.
        assert!(clock.epoch_secs() > 1_577_836_800);
        assert!((clock.epoch_millis() / 1000 - clock.epoch_secs()).abs() <= 1);
    }
}
