//! Wall-clock source for lockout deadlines.
//!
//! Lock expiry is persisted as Unix milliseconds, so the clock must be a
//! wall clock rather than a monotonic one. Components take an
//! `Arc<dyn Clock>` so tests can move time without sleeping.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

pub trait Clock: Send + Sync {
    /// Current time in Unix milliseconds
    fn now_millis(&self) -> i64;
}

/// Reads `chrono::Utc::now()`
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Manually advanced clock for deterministic lockout tests
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: AtomicI64::new(start.timestamp_millis()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let millis = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.now.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::default();
        let start = clock.now_millis();

        clock.advance(Duration::from_secs(30));
        assert_eq!(clock.now_millis() - start, 30_000);
    }

    #[test]
    fn test_system_clock_is_recent() {
        let drift = (SystemClock.now_millis() - Utc::now().timestamp_millis()).abs();
        assert!(drift < 5_000);
    }
}
