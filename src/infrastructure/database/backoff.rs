//! Exponential backoff for the startup connect loop

use std::time::Duration;

use rand::Rng;

/// Exponential backoff configuration
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Wait after the first failed attempt
    pub base_delay: Duration,
    /// Upper bound for any single wait
    pub max_delay: Duration,
    /// Jitter factor (0.0 to 1.0), disabled by default
    pub jitter_factor: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.0,
        }
    }
}

/// Exponential backoff calculator: `min(max_delay, base_delay * 2^attempt)`
pub struct ExponentialBackoff {
    config: BackoffConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a new exponential backoff with default configuration
    pub fn new() -> Self {
        Self::with_config(BackoffConfig::default())
    }

    /// Create a new exponential backoff with custom configuration
    pub fn with_config(config: BackoffConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Un-jittered wait for a 0-based attempt index.
    ///
    /// Saturates at `max_delay` instead of overflowing for large indices.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt);
        let delay = factor.and_then(|f| self.config.base_delay.checked_mul(f));

        match delay {
            Some(d) => d.min(self.config.max_delay),
            None => self.config.max_delay,
        }
    }

    /// Get the next delay duration and advance the attempt counter
    pub fn next_delay(&mut self) -> Duration {
        let capped = self.delay_for(self.attempt);
        self.attempt = self.attempt.saturating_add(1);

        if self.config.jitter_factor <= 0.0 {
            return capped;
        }

        let secs = capped.as_secs_f64();
        let jitter_range = secs * self.config.jitter_factor.min(1.0);
        let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
        let jittered = (secs + jitter).clamp(0.0, self.config.max_delay.as_secs_f64());

        Duration::from_secs_f64(jittered)
    }

}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_schedule_matches_formula() {
        let backoff = ExponentialBackoff::new();

        for i in 0..10u32 {
            let expected = std::cmp::min(60, 2u64 * 2u64.pow(i));
            assert_eq!(backoff.delay_for(i), Duration::from_secs(expected), "attempt {}", i);
        }
    }

    #[test]
    fn test_delays_are_non_decreasing() {
        let mut backoff = ExponentialBackoff::new();
        let mut previous = Duration::ZERO;

        for _ in 0..20 {
            let delay = backoff.next_delay();
            assert!(delay >= previous);
            assert!(delay <= Duration::from_secs(60));
            previous = delay;
        }
    }

    #[test]
    fn test_large_attempt_index_saturates() {
        let backoff = ExponentialBackoff::new();
        assert_eq!(backoff.delay_for(40), Duration::from_secs(60));
        assert_eq!(backoff.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn test_jitter_stays_within_cap() {
        let config = BackoffConfig {
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.5,
        };
        let mut backoff = ExponentialBackoff::with_config(config);

        for _ in 0..50 {
            assert!(backoff.next_delay() <= Duration::from_secs(60));
        }
    }
}
