//! # Backoff Calculator
//!
//! Retry scheduling policy for messages that failed transiently.
//!
//! ## Overview
//!
//! The policy is pluggable through the [`RetryPolicy`] trait. Two policies
//! ship with the crate:
//!
//! - [`ExponentialBackoff`]: `base * multiplier^(attempts - 1)`, capped at
//!   `max_delay`, with optional additive jitter
//! - [`FixedInterval`]: the same delay after every attempt
//!
//! Both stop after `max_attempts`; the delivery coordinator then marks the
//! message `FAILED` as exhausted instead of queueing it again.
//!
//! [`BackoffCalculator`] wraps the configured policy and turns delays into
//! absolute `next_retry_at` timestamps.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{RetryConfig, RetryStrategy};

/// Decides how long to wait before the next attempt and when to give up
pub trait RetryPolicy: Send + Sync + Debug {
    /// Delay to wait after `attempts` attempts have been made
    fn delay_for(&self, attempts: u32) -> Duration;

    /// Total attempts allowed, including the first
    fn max_attempts(&self) -> u32;

    fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts()
    }

    fn name(&self) -> &'static str;
}

/// Exponential backoff with a cap and optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    pub max_attempts: u32,
    /// Maximum jitter as a fraction of the delay; `None` disables jitter
    pub jitter: Option<f64>,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, multiplier: f64, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base,
            multiplier,
            max_delay,
            max_attempts,
            jitter: None,
        }
    }

    pub fn with_jitter(mut self, max_percentage: f64) -> Self {
        self.jitter = Some(max_percentage);
        self
    }

    fn capped_delay_ms(&self, attempts: u32) -> u64 {
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let base_ms = self.base.as_millis() as f64;
        let max_ms = self.max_delay.as_millis() as f64;
        let delay = base_ms * self.multiplier.powi(exponent);

        if delay.is_nan() {
            return max_ms as u64;
        }
        delay.min(max_ms) as u64
    }

    /// Add up to `percentage` of the delay
    fn apply_jitter(delay_ms: u64, percentage: f64) -> u64 {
        let jitter_range = (delay_ms as f64 * percentage) as u64;
        if jitter_range == 0 {
            return delay_ms;
        }

        let jitter = rand::thread_rng().gen_range(0..=jitter_range);
        delay_ms.saturating_add(jitter)
    }
}

impl RetryPolicy for ExponentialBackoff {
    fn delay_for(&self, attempts: u32) -> Duration {
        let delay_ms = self.capped_delay_ms(attempts);
        let delay_ms = match self.jitter {
            Some(percentage) => Self::apply_jitter(delay_ms, percentage),
            None => delay_ms,
        };
        Duration::from_millis(delay_ms)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn name(&self) -> &'static str {
        "exponential"
    }
}

/// Constant delay between attempts
#[derive(Debug, Clone)]
pub struct FixedInterval {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy for FixedInterval {
    fn delay_for(&self, _attempts: u32) -> Duration {
        self.interval
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Turns the configured policy into retry timestamps
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    policy: Arc<dyn RetryPolicy>,
}

impl BackoffCalculator {
    pub fn new(policy: Arc<dyn RetryPolicy>) -> Self {
        Self { policy }
    }

    /// Build the policy selected by `retry.strategy`
    pub fn from_config(config: &RetryConfig) -> Self {
        let policy: Arc<dyn RetryPolicy> = match config.strategy {
            RetryStrategy::Exponential => {
                let backoff = ExponentialBackoff::new(
                    config.base_delay(),
                    config.multiplier,
                    config.max_delay(),
                    config.max_attempts,
                );
                if config.jitter_enabled {
                    Arc::new(backoff.with_jitter(config.jitter_max_percentage))
                } else {
                    Arc::new(backoff)
                }
            }
            RetryStrategy::Fixed => Arc::new(FixedInterval {
                interval: config.base_delay(),
                max_attempts: config.max_attempts,
            }),
        };
        Self::new(policy)
    }

    pub fn policy(&self) -> &dyn RetryPolicy {
        self.policy.as_ref()
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts()
    }

    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.policy.is_exhausted(attempts)
    }

    /// When a message that has now made `attempts` attempts may be retried
    pub fn next_retry_at(&self, attempts: u32, from: DateTime<Utc>) -> DateTime<Utc> {
        let delay = self.policy.delay_for(attempts);
        chrono::Duration::from_std(delay)
            .ok()
            .and_then(|delay| from.checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

impl Default for BackoffCalculator {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exponential() -> ExponentialBackoff {
        ExponentialBackoff::new(Duration::from_secs(1), 2.0, Duration::from_secs(10), 5)
    }

    #[test]
    fn test_exponential_delays_double_until_cap() {
        let policy = exponential();
        let delays: Vec<u64> = (1..=6).map(|n| policy.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![1, 2, 4, 8, 10, 10]);
    }

    #[test]
    fn test_zero_attempts_uses_base_delay() {
        assert_eq!(exponential().delay_for(0), Duration::from_secs(1));
    }

    #[test]
    fn test_huge_attempt_counts_stay_capped() {
        assert_eq!(exponential().delay_for(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_jitter_only_adds_delay() {
        let policy = exponential().with_jitter(0.5);
        for _ in 0..50 {
            let delay = policy.delay_for(3);
            assert!(delay >= Duration::from_secs(4));
            assert!(delay <= Duration::from_secs(6));
        }
    }

    #[test]
    fn test_fixed_interval() {
        let policy = FixedInterval {
            interval: Duration::from_millis(250),
            max_attempts: 3,
        };
        assert_eq!(policy.delay_for(1), policy.delay_for(7));
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }

    #[test]
    fn test_calculator_from_config() {
        let config = RetryConfig {
            strategy: RetryStrategy::Fixed,
            base_delay_ms: 500,
            max_attempts: 2,
            ..RetryConfig::default()
        };
        let calculator = BackoffCalculator::from_config(&config);
        assert_eq!(calculator.policy().name(), "fixed");
        assert_eq!(calculator.max_attempts(), 2);

        let now = Utc::now();
        assert_eq!(
            calculator.next_retry_at(1, now),
            now + chrono::Duration::milliseconds(500)
        );
    }
}
