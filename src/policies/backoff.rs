//! # Backoff policy for retried tasks.
//!
//! [`BackoffPolicy`] controls how retry visibility delays grow with the
//! attempt number. The executor consults it when a retry disposition carries
//! no explicit countdown or timestamp.
//!
//! The delay for attempt `n` is `first × factor^n`, clamped to `max`, then
//! jitter is applied. The base delay is derived purely from the attempt
//! number, so jitter output never feeds back into subsequent calculations.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use patchwork::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.delay_for(0), Duration::from_millis(100));
//! assert_eq!(backoff.delay_for(1), Duration::from_millis(200));
//! // 100ms × 2^10 = 102_400ms → capped at max=10s
//! assert_eq!(backoff.delay_for(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Retry delay policy.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay for the first retry (attempt 0).
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter policy applied to the clamped base delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a policy with:
    /// - `first = 100ms`
    /// - `max = 30s`
    /// - `factor = 2.0` (exponential)
    /// - `jitter = None`
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Computes the visibility delay for the given attempt number (0-indexed).
    ///
    /// The base is `first × factor^attempt`, clamped to `max`; overflow and
    /// non-finite intermediate values clamp to `max` as well. Jitter applies
    /// to the clamped base and is never fed back into later attempts.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base =
            if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
                self.max
            } else {
                Duration::from_secs_f64(unclamped_secs)
            };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn plain(first_ms: u64, max_s: u64, factor: f64) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(first_ms),
            max: Duration::from_secs(max_s),
            factor,
            jitter: JitterPolicy::None,
        }
    }

    #[rstest]
    #[case(0, 100)]
    #[case(1, 200)]
    #[case(2, 400)]
    #[case(3, 800)]
    #[case(4, 1600)]
    fn exponential_growth_without_jitter(#[case] attempt: u32, #[case] expect_ms: u64) {
        let policy = plain(100, 30, 2.0);
        assert_eq!(policy.delay_for(attempt), Duration::from_millis(expect_ms));
    }

    #[test]
    fn constant_factor_keeps_first_delay() {
        let policy = plain(500, 30, 1.0);
        for attempt in 0..10 {
            assert_eq!(policy.delay_for(attempt), Duration::from_millis(500));
        }
    }

    #[test]
    fn delays_clamp_to_max() {
        let policy = plain(100, 1, 2.0);
        assert_eq!(policy.delay_for(10), Duration::from_secs(1));
    }

    #[test]
    fn first_exceeding_max_clamps_to_max() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(policy.delay_for(0), Duration::from_secs(5));
    }

    #[test]
    fn huge_attempt_clamps_instead_of_overflowing() {
        let policy = plain(100, 60, 2.0);
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(60));
    }

    #[test]
    fn full_jitter_stays_within_base() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(1000),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::Full,
        };
        for attempt in 0..50 {
            assert!(policy.delay_for(attempt) <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn equal_jitter_stays_within_half_to_full_base() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(1000),
            max: Duration::from_secs(30),
            factor: 1.0,
            jitter: JitterPolicy::Equal,
        };
        for attempt in 0..50 {
            let delay = policy.delay_for(attempt);
            assert!(delay >= Duration::from_millis(500));
            assert!(delay <= Duration::from_millis(1000));
        }
    }

    #[test]
    fn decorrelated_jitter_spans_a_real_range() {
        let policy = BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::Decorrelated,
        };

        let mut lowest = Duration::from_secs(999);
        let mut highest = Duration::ZERO;
        for _ in 0..100 {
            let delay = policy.delay_for(8);
            lowest = lowest.min(delay);
            highest = highest.max(delay);
        }
        assert!(lowest >= Duration::from_millis(100), "below floor: {lowest:?}");
        assert!(highest >= Duration::from_secs(5), "range too narrow: {highest:?}");
    }
}
