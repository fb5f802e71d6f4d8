//! Exponential backoff schedule shared by the model and enrichment clients.

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Always at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Adds up to 50% random extra delay to each backoff.
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: Duration::from_secs(30),
            jitter: true,
        }
    }

    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Deterministic part of the delay before retry `retry` (1-based): base, 2×base, 4×base, …
    pub fn base_delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Delay to sleep before retry `retry` (1-based), including jitter when enabled.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let delay = self.base_delay_for(retry);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let extra_ms = rand::thread_rng().gen_range(0..=delay.as_millis() as u64 / 2);
        delay + Duration::from_millis(extra_ms)
    }

    /// Sum of the deterministic backoff across a fully exhausted run of attempts.
    pub fn total_base_backoff(&self) -> Duration {
        (1..self.max_attempts).map(|r| self.base_delay_for(r)).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delays_double() {
        let policy = RetryPolicy::new(4, Duration::from_millis(100)).without_jitter();
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
        assert_eq!(policy.total_base_backoff(), Duration::from_millis(700));
    }

    #[test]
    fn test_delay_is_capped() {
        let mut policy = RetryPolicy::new(10, Duration::from_secs(1)).without_jitter();
        policy.max_delay = Duration::from_secs(5);
        assert_eq!(policy.delay_for(8), Duration::from_secs(5));
    }

    #[test]
    fn test_jitter_stays_within_half_of_base() {
        let policy = RetryPolicy::new(3, Duration::from_millis(200));
        for _ in 0..50 {
            let delay = policy.delay_for(2);
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(600));
        }
    }

    #[test]
    fn test_zero_attempts_clamped_to_one() {
        let policy = RetryPolicy::new(0, Duration::from_millis(10));
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.total_base_backoff(), Duration::ZERO);
    }
}
