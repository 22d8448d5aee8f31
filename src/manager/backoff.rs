//! Exponential backoff with a retry ceiling.
//!
//! After the N-th consecutive failure the manager waits
//! `min(initial * 2^N, max)` before dialing again, and stops once N
//! reaches the ceiling. With the defaults that is 2 s, 4 s, 8 s, 10 s,
//! then give up on the fifth failure.

use std::time::Duration;

// ============================================================================
// RetryDecision
// ============================================================================

/// What to do after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Dial again after `delay`.
    Retry {
        /// Consecutive failures so far.
        attempt: u32,
        /// Wait before the next dial.
        delay: Duration,
    },
    /// Stop retrying.
    GiveUp {
        /// Consecutive failures so far.
        attempts: u32,
    },
}

// ============================================================================
// BackoffPolicy
// ============================================================================

/// Retry ceiling plus capped exponential delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    max_retries: u32,
    initial_delay: Duration,
    max_delay: Duration,
    enabled: bool,
}

impl BackoffPolicy {
    /// Creates an enabled policy.
    #[inline]
    #[must_use]
    pub const fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            enabled: true,
        }
    }

    /// Turns automatic retries on or off.
    #[inline]
    #[must_use]
    pub const fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Retry ceiling.
    #[inline]
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (1-indexed).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        1u32.checked_shl(attempt)
            .and_then(|factor| self.initial_delay.checked_mul(factor))
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Decides what follows failure number `retry_count`.
    #[must_use]
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        if !self.enabled || retry_count >= self.max_retries {
            RetryDecision::GiveUp {
                attempts: retry_count,
            }
        } else {
            RetryDecision::Retry {
                attempt: retry_count,
                delay: self.delay_for(retry_count),
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;

    fn default_policy() -> BackoffPolicy {
        BackoffPolicy::new(5, Duration::from_millis(1000), Duration::from_millis(10_000))
    }

    #[test]
    fn test_default_delays() {
        let policy = default_policy();
        let delays: Vec<u128> = (1..=5).map(|n| policy.delay_for(n).as_millis()).collect();
        assert_eq!(delays, vec![2000, 4000, 8000, 10_000, 10_000]);
    }

    #[test]
    fn test_decide_until_ceiling() {
        let policy = default_policy();
        assert_eq!(
            policy.decide(1),
            RetryDecision::Retry {
                attempt: 1,
                delay: Duration::from_millis(2000)
            }
        );
        assert!(matches!(policy.decide(4), RetryDecision::Retry { .. }));
        assert_eq!(policy.decide(5), RetryDecision::GiveUp { attempts: 5 });
        assert_eq!(policy.decide(9), RetryDecision::GiveUp { attempts: 9 });
    }

    #[test]
    fn test_disabled_gives_up_immediately() {
        let policy = default_policy().with_enabled(false);
        assert_eq!(policy.decide(1), RetryDecision::GiveUp { attempts: 1 });
    }

    #[test]
    fn test_huge_attempt_saturates_at_cap() {
        let policy = default_policy();
        assert_eq!(policy.delay_for(31), Duration::from_millis(10_000));
        assert_eq!(policy.delay_for(64), Duration::from_millis(10_000));
    }

    proptest! {
        #[test]
        fn prop_delay_matches_formula(attempt in 0u32..40) {
            let policy = default_policy();
            let expected = 1000u128
                .checked_mul(1u128 << attempt.min(100))
                .map_or(10_000, |ms| ms.min(10_000));
            prop_assert_eq!(policy.delay_for(attempt).as_millis(), expected);
        }

        #[test]
        fn prop_delay_never_exceeds_cap(attempt in any::<u32>(), initial in 1u64..5_000, cap in 5_000u64..60_000) {
            let policy = BackoffPolicy::new(5, Duration::from_millis(initial), Duration::from_millis(cap));
            prop_assert!(policy.delay_for(attempt) <= Duration::from_millis(cap));
        }

        #[test]
        fn prop_retries_below_ceiling(max in 1u32..20, count in 0u32..40) {
            let policy = BackoffPolicy::new(max, Duration::from_millis(1000), Duration::from_millis(10_000));
            let retrying = matches!(policy.decide(count), RetryDecision::Retry { .. });
            prop_assert_eq!(retrying, count < max);
        }
    }
}
