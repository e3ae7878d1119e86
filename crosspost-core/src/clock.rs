//! Injected wall-clock access.
//!
//! Every component that needs "now" takes an `Arc<dyn Clock>` at
//! construction instead of calling `Utc::now()` directly. This is what
//! makes the scheduler/engine/importer tests deterministic: a `FixedClock`
//! stands in for `SystemClock` without touching the process clock.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A source of the current UTC instant.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// The real clock, backed by the process's wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Build the production clock.
pub fn system() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}

/// A clock that starts at a fixed instant and can be advanced explicitly.
/// Used by tests that need to assert on exact timestamps or simulate time
/// passing (lease expiry, scheduled-post due times) without sleeping.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(start.timestamp_millis()),
        }
    }

    /// Advance the clock by `delta` and return the new instant.
    pub fn advance(&self, delta: chrono::Duration) -> DateTime<Utc> {
        let new_millis = self.millis.fetch_add(delta.num_milliseconds(), Ordering::SeqCst)
            + delta.num_milliseconds();
        DateTime::from_timestamp_millis(new_millis).expect("valid timestamp")
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.millis.load(Ordering::SeqCst)).expect("valid timestamp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_advances_monotonically() {
        let clock = FixedClock::new(Utc::now());
        let t0 = clock.now();
        let t1 = clock.advance(chrono::Duration::seconds(5));
        assert!(t1 > t0);
        assert_eq!(clock.now(), t1);
    }
}
