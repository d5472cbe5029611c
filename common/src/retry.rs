// Retry strategy with exponential backoff and jitter, used for GitHub calls

use rand::Rng;
use std::time::Duration;

/// Retry strategy trait for calculating retry delays
pub trait RetryStrategy: Send + Sync {
    /// Delay before retry number `attempt` (0-based).
    /// Returns None once the retry budget is spent.
    fn next_delay(&self, attempt: u32) -> Option<Duration>;

    /// Maximum number of attempts, the first one included
    fn max_attempts(&self) -> u32;

    fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts()
    }
}

/// Exponential backoff: base, base*2, base*4, ... capped at max, plus jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_delay_ms: u64,
    max_delay_ms: u64,
    /// 0.0 to 1.0
    jitter_factor: f64,
    max_attempts: u32,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            jitter_factor: 0.1,
            max_attempts: 3,
        }
    }
}

impl ExponentialBackoff {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_config(
        base_delay_ms: u64,
        max_delay_ms: u64,
        jitter_factor: f64,
        max_attempts: u32,
    ) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            jitter_factor: jitter_factor.clamp(0.0, 1.0),
            max_attempts,
        }
    }

    fn calculate_base_delay(&self, attempt: u32) -> u64 {
        let factor = 2_u64.saturating_pow(attempt);
        self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms)
    }

    fn add_jitter_ms(&self, base_delay_ms: u64) -> u64 {
        let jitter_range_ms = (base_delay_ms as f64 * self.jitter_factor) as u64;
        if jitter_range_ms == 0 {
            return base_delay_ms;
        }
        base_delay_ms + rand::thread_rng().gen_range(0..=jitter_range_ms)
    }
}

impl RetryStrategy for ExponentialBackoff {
    fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if !self.should_retry(attempt) {
            return None;
        }
        let base = self.calculate_base_delay(attempt);
        Some(Duration::from_millis(self.add_jitter_ms(base)))
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exponential_backoff_sequence() {
        let strategy = ExponentialBackoff::with_config(100, 1000, 0.0, 10);
        assert_eq!(strategy.calculate_base_delay(0), 100);
        assert_eq!(strategy.calculate_base_delay(1), 200);
        assert_eq!(strategy.calculate_base_delay(2), 400);
        assert_eq!(strategy.calculate_base_delay(3), 800);
        assert_eq!(strategy.calculate_base_delay(4), 1000);
        assert_eq!(strategy.calculate_base_delay(40), 1000);
    }

    #[test]
    fn test_retry_budget() {
        let strategy = ExponentialBackoff::with_config(100, 1000, 0.0, 3);
        assert_eq!(strategy.next_delay(0), Some(Duration::from_millis(100)));
        assert_eq!(strategy.next_delay(1), Some(Duration::from_millis(200)));
        assert_eq!(strategy.next_delay(2), None);
    }

    #[test]
    fn test_single_attempt_never_retries() {
        let strategy = ExponentialBackoff::new(1);
        assert!(!strategy.should_retry(0));
        assert!(strategy.next_delay(0).is_none());
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let strategy = ExponentialBackoff::with_config(1000, 10_000, 0.1, 5);
        for _ in 0..20 {
            let delay = strategy.next_delay(0).unwrap().as_millis();
            assert!((1000..=1100).contains(&delay), "delay {delay} out of range");
        }
    }

    #[test]
    fn test_jitter_factor_clamping() {
        assert_eq!(ExponentialBackoff::with_config(1, 1, -0.5, 1).jitter_factor, 0.0);
        assert_eq!(ExponentialBackoff::with_config(1, 1, 1.5, 1).jitter_factor, 1.0);
    }
}
