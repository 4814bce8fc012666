//! Time source abstraction used by the limiter and the blocking client.

use std::time::{Duration, Instant};

/// Monotonic clock plus blocking sleep.
#[cfg_attr(test, mockall::automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation.
///
/// `now` goes through tokio's clock so that paused test runtimes and the
/// limiter's async path observe the same time. Outside a runtime this is
/// plain `Instant::now()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let a = clock.now();
        clock.sleep(Duration::from_millis(5));
        let b = clock.now();
        assert!(b >= a + Duration::from_millis(5));
    }

    #[test]
    fn test_mock_clock() {
        let start = Instant::now();
        let mut clock = MockClock::new();
        clock.expect_now().returning(move || start);
        clock
            .expect_sleep()
            .with(mockall::predicate::eq(Duration::from_secs(1)))
            .times(1)
            .return_const(());

        assert_eq!(clock.now(), start);
        clock.sleep(Duration::from_secs(1));
    }
}
