//! Wall-clock abstraction so bucket and monitor timing can be faked in tests.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> SystemTime;

    /// Whole seconds since the unix epoch, as sent to the shared store.
    fn epoch_seconds(&self) -> i64 {
        to_epoch_seconds(self.now())
    }
}

/// Convert a wall-clock instant to epoch seconds; instants before 1970 clamp to zero.
pub fn to_epoch_seconds(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Latest instant representable on every platform (9999-12-31T23:59:59Z).
pub const MAX_EPOCH_SECONDS: i64 = 253_402_300_799;

/// Convert epoch seconds back to a wall-clock instant, clamped to `0..=MAX_EPOCH_SECONDS`.
pub fn from_epoch_seconds(secs: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(secs.clamp(0, MAX_EPOCH_SECONDS).unsigned_abs())
}

/// Clock backed by `SystemTime::now()`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually driven clock for deterministic tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<SystemTime>>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self { now: Arc::new(Mutex::new(start)) }
    }

    /// Start at a whole number of epoch seconds.
    pub fn at_epoch_seconds(secs: i64) -> Self {
        Self::new(from_epoch_seconds(secs))
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().expect("manual clock poisoned");
        *now += by;
    }

    pub fn rewind(&self, by: Duration) {
        let mut now = self.now.lock().expect("manual clock poisoned");
        *now -= by;
    }

    pub fn set(&self, to: SystemTime) {
        *self.now.lock().expect("manual clock poisoned") = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().expect("manual clock poisoned")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_seconds_round_trip() {
        let t = from_epoch_seconds(1_700_000_000);
        assert_eq!(to_epoch_seconds(t), 1_700_000_000);
        assert_eq!(from_epoch_seconds(-5), UNIX_EPOCH);
    }

    #[test]
    fn manual_clock_moves_both_ways() {
        let clock = ManualClock::at_epoch_seconds(1_000);
        clock.advance(Duration::from_secs(30));
        assert_eq!(clock.epoch_seconds(), 1_030);
        clock.rewind(Duration::from_secs(60));
        assert_eq!(clock.epoch_seconds(), 970);
    }
}
