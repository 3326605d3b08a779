//! # Jitter policy for retry delays.
//!
//! [`JitterPolicy`] adds randomness to backoff delays so that many tasks
//! retried at once do not hammer a recovering collaborator in lockstep.
//!
//! - [`JitterPolicy::None`] — no randomization, predictable delays
//! - [`JitterPolicy::Full`] — random delay in [0, base]
//! - [`JitterPolicy::Equal`] — base/2 + random[0, base/2]
//! - [`JitterPolicy::Decorrelated`] — range grows from the previous delay

use std::time::Duration;

use rand::Rng;

/// Randomization strategy for retry delays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Use the exact backoff delay. Predictable; fine for a single retrier.
    #[default]
    None,

    /// Random delay in [0, base]. Maximum load spreading; can shrink the
    /// delay to zero.
    Full,

    /// base/2 + random[0, base/2]. Preserves ~75% of the base on average;
    /// a balanced default when jitter is wanted.
    Equal,

    /// random[floor, prev × 3] capped at max. Requires context; use
    /// [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to the given delay.
    ///
    /// For `Decorrelated` this returns the input unchanged; use
    /// [`apply_decorrelated`](Self::apply_decorrelated), which takes the
    /// required context.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Self::full_jitter(delay),
            JitterPolicy::Equal => Self::equal_jitter(delay),
            JitterPolicy::Decorrelated => delay,
        }
    }

    /// Applies decorrelated jitter with full context.
    ///
    /// Falls back to `apply(prev)` when the policy is not `Decorrelated`.
    pub fn apply_decorrelated(&self, floor: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }

        let mut rng = rand::rng();
        let floor_ms = floor.as_millis() as u64;
        let prev_ms = prev.as_millis() as u64;
        let max_ms = max.as_millis() as u64;

        let upper = (prev_ms.saturating_mul(3)).min(max_ms).max(floor_ms);
        if floor_ms >= upper {
            return floor;
        }
        Duration::from_millis(rng.random_range(floor_ms..=upper))
    }

    fn full_jitter(delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=ms))
    }

    fn equal_jitter(delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        let half = ms / 2;
        let jitter = if half == 0 {
            0
        } else {
            rand::rng().random_range(0..=half)
        };
        Duration::from_millis(half + jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_identity() {
        let d = Duration::from_millis(250);
        assert_eq!(JitterPolicy::None.apply(d), d);
    }

    #[test]
    fn zero_delay_stays_zero() {
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(JitterPolicy::Equal.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn decorrelated_floor_meets_upper_bound() {
        // prev so small that floor >= 3×prev: jitter collapses to the floor
        let out = JitterPolicy::Decorrelated.apply_decorrelated(
            Duration::from_millis(100),
            Duration::from_millis(10),
            Duration::from_secs(30),
        );
        assert_eq!(out, Duration::from_millis(100));
    }
}
