//! Backoff policy for transient transcription failures.
//!
//! Delays double from `base_delay` up to `max_delay`. A `Retry-After` hint
//! from the service raises the delay but never past `max_delay`, and jitter
//! only ever shortens it, so `max_delay` is a hard ceiling.

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first request. `0` sends every request once.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Fraction of each delay that may be shaved off at random, in `0.0..=1.0`.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        // Rate-limit windows of the transcription API are measured in
        // seconds, so start at 2s and allow up to a minute.
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Whether another request may follow `retries_done` retries.
    pub fn allows(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }

    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32, retry_after: Option<Duration>) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        let mut delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if let Some(hint) = retry_after {
            delay = delay.max(hint.min(self.max_delay));
        }

        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter > 0.0 {
            delay = delay.mul_f64(1.0 - jitter * rand::random::<f64>());
        }
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exact(base_ms: u64, max_ms: u64) -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            base_delay: Duration::from_millis(base_ms),
            max_delay: Duration::from_millis(max_ms),
            jitter: 0.0,
        }
    }

    #[test]
    fn test_backoff_doubles_until_capped() {
        let config = exact(500, 3_000);
        assert_eq!(config.backoff(1, None), Duration::from_millis(500));
        assert_eq!(config.backoff(2, None), Duration::from_millis(1_000));
        assert_eq!(config.backoff(3, None), Duration::from_millis(2_000));
        assert_eq!(config.backoff(4, None), Duration::from_millis(3_000));
        assert_eq!(config.backoff(40, None), Duration::from_millis(3_000));
    }

    #[test]
    fn test_retry_after_raises_delay_within_cap() {
        let config = exact(500, 3_000);
        assert_eq!(
            config.backoff(1, Some(Duration::from_secs(2))),
            Duration::from_secs(2)
        );
        // Shorter hints do not shorten the backoff.
        assert_eq!(
            config.backoff(3, Some(Duration::from_millis(10))),
            Duration::from_millis(2_000)
        );
        assert_eq!(
            config.backoff(1, Some(Duration::from_secs(600))),
            Duration::from_millis(3_000)
        );
    }

    #[test]
    fn test_jitter_never_exceeds_the_cap() {
        let config = RetryConfig {
            jitter: 0.5,
            ..exact(1_000, 4_000)
        };
        for retry in 1..=6 {
            for _ in 0..50 {
                let delay = config.backoff(retry, Some(Duration::from_secs(30)));
                assert!(delay <= Duration::from_millis(4_000));
                assert!(delay >= Duration::from_millis(2_000));
            }
        }
    }

    #[test]
    fn test_allows() {
        let config = RetryConfig::default();
        assert!(config.allows(0));
        assert!(config.allows(2));
        assert!(!config.allows(3));
        assert!(!config.clone().with_max_retries(0).allows(0));
    }
}
