//! # Backoff policy for resubscribing after an error.
//!
//! [`BackoffPolicy`] decides how long the [`retry`](crate::Observable::retry_with)
//! operator waits before it resubscribes to a failed source. The delay before
//! retry number `n` (0-indexed) is `first × factor^n`, clamped to `max`, then
//! jittered. The base is derived from the attempt number only, so jitter output
//! never feeds back into later delays.
//!
//! [`Observable::retry`](crate::Observable::retry) uses [`BackoffPolicy::fixed`]
//! with [`RETRY_DELAY`](crate::RETRY_DELAY).
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use rill::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(10),
//!     max: Duration::from_millis(100),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(10));
//! assert_eq!(backoff.next(1), Duration::from_millis(20));
//! assert_eq!(backoff.next(10), Duration::from_millis(100));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Delay schedule between resubscriptions.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay before the first resubscription.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter applied to each computed delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a constant 1ms delay (`factor = 1.0`, `max = 1s`, no jitter).
    fn default() -> Self {
        Self::fixed(Duration::from_millis(1))
    }
}

impl BackoffPolicy {
    /// Constant delay, no jitter.
    pub fn fixed(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay.max(Duration::from_secs(1)),
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Exponential growth from `first`, capped at `max`.
    pub fn exponential(first: Duration, max: Duration) -> Self {
        Self {
            first,
            max,
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Returns a copy with a different jitter policy.
    pub fn with_jitter(mut self, jitter: JitterPolicy) -> Self {
        self.jitter = jitter;
        self
    }

    /// Computes the delay before retry number `attempt` (0-indexed).
    ///
    /// Non-finite or overflowing intermediate values clamp to [`BackoffPolicy::max`].
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(secs)
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

    #[test]
    fn test_default_is_constant_short_delay() {
        let policy = BackoffPolicy::default();
        for attempt in 0..20 {
            assert_eq!(policy.next(attempt), Duration::from_millis(1));
        }
    }

    #[test]
    fn test_exponential_doubles_until_cap() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(5), Duration::from_millis(40));
        let got: Vec<_> = (0..6).map(|a| policy.next(a)).collect();
        assert_eq!(
            got,
            vec![
                Duration::from_millis(5),
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(40),
                Duration::from_millis(40),
            ]
        );
    }

    #[test]
    fn test_first_above_max_is_clamped() {
        let policy = BackoffPolicy {
            first: Duration::from_secs(10),
            max: Duration::from_secs(5),
            factor: 1.0,
            jitter: JitterPolicy::None,
        };
        assert_eq!(policy.next(0), Duration::from_secs(5));
    }

    #[test]
    fn test_overflow_clamps_to_max() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(policy.next(u32::MAX), Duration::from_secs(10));
    }

    #[test]
    fn test_equal_jitter_stays_within_half_and_base() {
        let policy = BackoffPolicy::fixed(Duration::from_millis(100)).with_jitter(JitterPolicy::Equal);
        for attempt in 0..50 {
            let delay = policy.next(attempt);
            assert!(delay >= Duration::from_millis(50), "{delay:?}");
            assert!(delay <= Duration::from_millis(100), "{delay:?}");
        }
    }

    #[test]
    fn test_full_jitter_never_exceeds_base() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(10), Duration::from_secs(1))
                .with_jitter(JitterPolicy::Full);
        for attempt in 0..12 {
            let base = (10.0 * 2.0f64.powi(attempt as i32)).min(1000.0);
            assert!(policy.next(attempt) <= Duration::from_millis(base as u64));
        }
    }

    #[test]
    fn test_decorrelated_respects_floor() {
        let policy =
            BackoffPolicy::exponential(Duration::from_millis(10), Duration::from_secs(2))
                .with_jitter(JitterPolicy::Decorrelated);
        for _ in 0..100 {
            let delay = policy.next(6);
            assert!(delay >= Duration::from_millis(10));
            assert!(delay <= Duration::from_secs(2));
        }
    }
}
