//! Retry policy and backoff decision engine.
//!
//! [`decide`] is a pure function from (failure kind, attempt number, policy)
//! to a decision; it never touches clocks or scheduler state, which keeps
//! failure policy testable in isolation from sequencing.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::FailureKind;

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * multiplier^(attempt - 1)
    #[default]
    Exponential,
    /// delay = base * attempt
    Linear,
    /// delay = base
    Constant,
}

/// Jitter strategy applied on top of the computed backoff.
///
/// Jitter is additive: the deterministic backoff is a floor, never reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter.
    None,
    /// Add a uniform sample from [0, jitter_ms].
    #[default]
    Full,
    /// Add jitter_ms/2 plus a uniform sample from [0, jitter_ms/2].
    Equal,
}

/// Configuration for retry behavior of a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts, including the initial one.
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Cap on the deterministic backoff in milliseconds.
    pub max_delay_ms: u64,
    /// Backoff multiplier for the exponential strategy.
    pub multiplier: u32,
    /// Upper bound on added jitter in milliseconds.
    pub jitter_ms: u64,
    /// Backoff strategy.
    pub backoff: BackoffStrategy,
    /// Jitter strategy.
    pub jitter: JitterStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            multiplier: 2,
            jitter_ms: 100,
            backoff: BackoffStrategy::Exponential,
            jitter: JitterStrategy::Full,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    #[must_use]
    pub fn no_retries() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: u32) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter bound.
    #[must_use]
    pub fn with_jitter_ms(mut self, jitter: u64) -> Self {
        self.jitter_ms = jitter;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff = strategy;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, strategy: JitterStrategy) -> Self {
        self.jitter = strategy;
        self
    }

    /// Computes the deterministic backoff after the given attempt (1-based),
    /// capped at `max_delay_ms`, jitter excluded.
    #[must_use]
    pub fn backoff_ms(&self, attempt: u32) -> u64 {
        let n = attempt.max(1);
        let delay = match self.backoff {
            BackoffStrategy::Exponential => self
                .base_delay_ms
                .saturating_mul(u64::from(self.multiplier).saturating_pow(n - 1)),
            BackoffStrategy::Linear => self.base_delay_ms.saturating_mul(u64::from(n)),
            BackoffStrategy::Constant => self.base_delay_ms,
        };
        delay.min(self.max_delay_ms)
    }

    fn jitter_sample(&self) -> u64 {
        if self.jitter_ms == 0 {
            return 0;
        }
        match self.jitter {
            JitterStrategy::None => 0,
            JitterStrategy::Full => rand::thread_rng().gen_range(0..=self.jitter_ms),
            JitterStrategy::Equal => {
                let half = self.jitter_ms / 2;
                half + rand::thread_rng().gen_range(0..=half)
            }
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Schedule another attempt after the delay.
    RetryAfter(Duration),
    /// Stop retrying; the stage run dead-letters.
    Abandon,
}

/// Decides whether a failed attempt is retried.
///
/// `attempt` is the 1-based number of the attempt that just failed. Abandon
/// is forced once `attempt >= policy.max_attempts`, regardless of kind; a
/// non-retryable kind abandons immediately. The engine never looks past the
/// kind tag.
#[must_use]
pub fn decide(kind: FailureKind, attempt: u32, policy: &RetryPolicy) -> RetryDecision {
    if attempt >= policy.max_attempts || !kind.is_retryable() {
        return RetryDecision::Abandon;
    }

    let delay_ms = policy.backoff_ms(attempt).saturating_add(policy.jitter_sample());
    RetryDecision::RetryAfter(Duration::from_millis(delay_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(policy: RetryPolicy) -> RetryPolicy {
        policy.with_jitter(JitterStrategy::None)
    }

    #[test]
    fn test_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay_ms, 1000);
        assert_eq!(policy.multiplier, 2);
        assert_eq!(policy.backoff, BackoffStrategy::Exponential);
    }

    #[test]
    fn test_exponential_backoff_schedule() {
        let policy = no_jitter(RetryPolicy::new().with_base_delay_ms(1000).with_multiplier(2));

        assert_eq!(policy.backoff_ms(1), 1000);
        assert_eq!(policy.backoff_ms(2), 2000);
        assert_eq!(policy.backoff_ms(3), 4000);
    }

    #[test]
    fn test_linear_and_constant_backoff() {
        let linear = no_jitter(
            RetryPolicy::new()
                .with_base_delay_ms(100)
                .with_backoff(BackoffStrategy::Linear),
        );
        assert_eq!(linear.backoff_ms(3), 300);

        let constant = no_jitter(
            RetryPolicy::new()
                .with_base_delay_ms(100)
                .with_backoff(BackoffStrategy::Constant),
        );
        assert_eq!(constant.backoff_ms(7), 100);
    }

    #[test]
    fn test_backoff_capped_at_max() {
        let policy = no_jitter(
            RetryPolicy::new()
                .with_base_delay_ms(1000)
                .with_max_delay_ms(5000),
        );
        assert_eq!(policy.backoff_ms(10), 5000);
    }

    #[test]
    fn test_three_attempt_schedule_delays() {
        // max_attempts 3, base 1s, multiplier 2: the 2nd/3rd attempts are
        // delayed by >= 1s / >= 2s, jitter excluded.
        let policy = RetryPolicy::new()
            .with_max_attempts(3)
            .with_base_delay_ms(1000)
            .with_multiplier(2)
            .with_jitter_ms(50);

        match decide(FailureKind::Transient, 1, &policy) {
            RetryDecision::RetryAfter(d) => assert!(d >= Duration::from_millis(1000)),
            RetryDecision::Abandon => panic!("attempt 1 must be retried"),
        }
        match decide(FailureKind::Transient, 2, &policy) {
            RetryDecision::RetryAfter(d) => assert!(d >= Duration::from_millis(2000)),
            RetryDecision::Abandon => panic!("attempt 2 must be retried"),
        }
        assert_eq!(
            decide(FailureKind::Transient, 3, &policy),
            RetryDecision::Abandon
        );
    }

    #[test]
    fn test_abandon_forced_at_max_attempts_regardless_of_kind() {
        let policy = RetryPolicy::new().with_max_attempts(2);
        assert_eq!(
            decide(FailureKind::Transient, 2, &policy),
            RetryDecision::Abandon
        );
        assert_eq!(
            decide(FailureKind::Transient, 5, &policy),
            RetryDecision::Abandon
        );
    }

    #[test]
    fn test_fatal_kinds_abandon_immediately() {
        let policy = RetryPolicy::new().with_max_attempts(10);
        assert_eq!(
            decide(FailureKind::Permanent, 1, &policy),
            RetryDecision::Abandon
        );
        assert_eq!(
            decide(FailureKind::Cancelled, 1, &policy),
            RetryDecision::Abandon
        );
    }

    #[test]
    fn test_timeout_is_retryable() {
        let policy = no_jitter(RetryPolicy::new().with_max_attempts(3));
        assert!(matches!(
            decide(FailureKind::Timeout, 1, &policy),
            RetryDecision::RetryAfter(_)
        ));
    }

    #[test]
    fn test_jitter_is_additive() {
        let policy = RetryPolicy::new()
            .with_base_delay_ms(100)
            .with_jitter_ms(1000)
            .with_jitter(JitterStrategy::Full);

        for _ in 0..20 {
            match decide(FailureKind::Transient, 1, &policy) {
                RetryDecision::RetryAfter(d) => {
                    assert!(d >= Duration::from_millis(100));
                    assert!(d <= Duration::from_millis(1100));
                }
                RetryDecision::Abandon => panic!("must retry"),
            }
        }
    }

    #[test]
    fn test_no_retries_policy() {
        let policy = RetryPolicy::no_retries();
        assert_eq!(
            decide(FailureKind::Transient, 1, &policy),
            RetryDecision::Abandon
        );
    }
}
