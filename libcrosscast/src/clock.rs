//! Clock and delay abstraction
//!
//! Expiry math and processing polls read time and sleep through this trait,
//! so tests can drive a container through Created → Processing → Ready
//! without real elapsed time.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

#[async_trait]
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Pause the current task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Production clock backed by the system time and tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Deterministic clock for tests. `sleep` returns immediately and advances
/// the reported time by the requested duration; every sleep is recorded so
/// tests can assert on poll pacing.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    slept: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        ManualClock {
            now: Mutex::new(start),
            slept: Mutex::new(Vec::new()),
        }
    }

    /// Move the clock forward without a sleep call.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    }

    /// Durations passed to `sleep`, in call order.
    pub fn sleeps(&self) -> Vec<Duration> {
        self.slept.lock().unwrap().clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        ManualClock::starting_at(Utc::now())
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        self.slept.lock().unwrap().push(duration);
        self.advance(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_advances_on_sleep() {
        let start = Utc::now();
        let clock = ManualClock::starting_at(start);

        clock.sleep(Duration::from_secs(3)).await;
        clock.sleep(Duration::from_secs(3)).await;

        assert_eq!(clock.now(), start + chrono::Duration::seconds(6));
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_secs(3), Duration::from_secs(3)]
        );
    }

    #[tokio::test]
    async fn test_manual_clock_advance_without_sleep() {
        let start = Utc::now();
        let clock = ManualClock::starting_at(start);

        clock.advance(Duration::from_secs(90));

        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_system_clock_tracks_real_time() {
        let clock = SystemClock;
        let before = Utc::now();
        let observed = clock.now();
        let after = Utc::now();
        assert!(observed >= before && observed <= after);
    }
}
