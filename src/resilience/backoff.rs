//! Exponential backoff with jitter.

use rand::Rng;
use std::time::Duration;

/// Delay schedule for repeated faults: `base * 2^(attempt-1)`, capped at `max`,
/// plus up to 10% random jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    /// Consecutive faults recorded since the last reset.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Register a fault and return how long to wait before trying again.
    pub fn next_delay(&mut self) -> Duration {
        self.attempt = self.attempt.saturating_add(1);
        let capped = self.capped_delay();
        capped + jitter(capped)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    fn capped_delay(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt.saturating_sub(1));
        self.base.saturating_mul(factor).min(self.max)
    }
}

fn jitter(delay: Duration) -> Duration {
    let range_ms = delay.as_millis() as u64 / 10;
    if range_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..range_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut backoff = Backoff::new(Duration::from_millis(100), Duration::from_millis(1000));

        let d1 = backoff.next_delay();
        assert!(d1 >= Duration::from_millis(100) && d1 < Duration::from_millis(110));

        let d2 = backoff.next_delay();
        assert!(d2 >= Duration::from_millis(200));

        for _ in 0..20 {
            backoff.next_delay();
        }
        let capped = backoff.next_delay();
        assert!(capped >= Duration::from_millis(1000) && capped < Duration::from_millis(1100));
        assert_eq!(backoff.attempt(), 23);
    }

    #[test]
    fn test_reset_restarts_schedule() {
        let mut backoff = Backoff::new(Duration::from_millis(50), Duration::from_secs(5));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.attempt(), 0);
        assert!(backoff.next_delay() < Duration::from_millis(55));
    }
}
