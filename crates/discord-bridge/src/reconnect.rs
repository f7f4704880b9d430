//! Gateway reconnect back-off

use std::time::Duration;

/// Jittered exponential back-off between gateway sessions
#[derive(Debug, Clone)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
    pub factor: f64,
    failures: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            factor: 2.0,
            failures: 0,
        }
    }

    /// Delay before the next attempt; advances the failure count
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.delay_for(self.failures);
        self.failures = self.failures.saturating_add(1);
        delay
    }

    /// A session that got as far as READY starts the sequence over
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    fn delay_for(&self, failures: u32) -> Duration {
        let base = self.initial.as_millis() as f64 * self.factor.powi(failures.min(32) as i32);
        let capped = base.min(self.max.as_millis() as f64);

        // Up to 25% extra so many bridges do not reconnect in lockstep
        let jitter = capped * 0.25 * spread(failures);
        Duration::from_millis((capped + jitter) as u64)
    }
}

/// Deterministic fraction in [0, 1) from the attempt number
fn spread(failures: u32) -> f64 {
    let hash = failures.wrapping_mul(2_654_435_761);
    hash as f64 / u32::MAX as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_then_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_secs(2));
        let first = backoff.next_delay();
        let second = backoff.next_delay();
        let third = backoff.next_delay();
        assert!(second > first);
        assert!(third > second);

        for _ in 0..20 {
            assert!(backoff.next_delay() <= Duration::from_millis(2500));
        }
    }

    #[test]
    fn test_reset() {
        let mut backoff = Backoff::default();
        backoff.next_delay();
        backoff.next_delay();
        assert_eq!(backoff.failures(), 2);

        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_failure_count_does_not_overflow() {
        let backoff = Backoff {
            failures: u32::MAX,
            ..Backoff::default()
        };
        assert!(backoff.delay_for(u32::MAX) <= Duration::from_secs(75));
    }
}
