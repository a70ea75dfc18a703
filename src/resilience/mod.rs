//! Reconnect backoff for the delivery worker.
//!
//! After a drain cycle aborts with messages still queued, the worker waits
//! before reconnecting. The wait grows exponentially per consecutive failed
//! cycle and resets once a cycle empties the outbox.

use std::time::Duration;

use crate::config::RetryConfig;

/// Exponential backoff with optional jitter.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    failures: u32,
}

impl Backoff {
    /// Creates a backoff with no recorded failures.
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Records a failed cycle and returns how long to wait before the next one.
    pub fn next_delay(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let delay = self.calculate_delay(self.failures);
        tracing::debug!(
            failures = self.failures,
            delay_ms = delay.as_millis() as u64,
            "Backing off before reconnect"
        );
        delay
    }

    /// Clears the failure count after a successful cycle.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Returns the number of consecutive failed cycles.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Calculates the delay for a given attempt.
    fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_delay =
            self.config.initial_delay.as_millis() as f64 * self.config.multiplier.powi(exponent);

        let delay_ms = base_delay.min(self.config.max_delay.as_millis() as f64);

        // Add jitter if enabled
        let final_delay = if self.config.jitter {
            let jitter = rand::random::<f64>() * 0.3 * delay_ms;
            delay_ms + jitter
        } else {
            delay_ms
        };

        Duration::from_millis(final_delay as u64)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(jitter: bool) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let mut backoff = Backoff::new(config(false));
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
        assert_eq!(backoff.next_delay(), Duration::from_millis(200));
        assert_eq!(backoff.next_delay(), Duration::from_millis(400));
        assert_eq!(backoff.next_delay(), Duration::from_millis(800));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.next_delay(), Duration::from_millis(1000));
        assert_eq!(backoff.failures(), 6);
    }

    #[test]
    fn test_backoff_reset() {
        let mut backoff = Backoff::new(config(false));
        backoff.next_delay();
        backoff.next_delay();
        backoff.reset();
        assert_eq!(backoff.failures(), 0);
        assert_eq!(backoff.next_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let mut backoff = Backoff::new(config(true));
        for _ in 0..20 {
            backoff.reset();
            let delay = backoff.next_delay();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(130));
        }
    }
}
