//! # Jitter policy for resubscription delays.
//!
//! [`JitterPolicy`] randomizes retry delays so that many subscriptions failing on
//! the same upstream do not resubscribe in lockstep.
//!
//! - [`JitterPolicy::None`] — exact delay
//! - [`JitterPolicy::Full`] — random in `[0, delay]`
//! - [`JitterPolicy::Equal`] — `delay/2 + random[0, delay/2]`
//! - [`JitterPolicy::Decorrelated`] — random in `[base, prev × 3]`, capped at max

use rand::Rng;
use std::time::Duration;

/// Randomization applied to a computed backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// No jitter.
    #[default]
    None,
    /// Random delay in `[0, delay]`.
    Full,
    /// `delay/2 + random[0, delay/2]`.
    Equal,
    /// Random delay in `[base, prev × 3]`, capped at max.
    ///
    /// Needs context; see [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`.
    ///
    /// `Decorrelated` returns the input unchanged here.
    pub fn apply(&self, delay: Duration) -> Duration {
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => Self::full(delay),
            JitterPolicy::Equal => Self::equal(delay),
        }
    }

    /// Applies decorrelated jitter given the floor, the previous delay and the cap.
    ///
    /// Falls back to [`apply`](Self::apply) for other policies.
    pub fn apply_decorrelated(&self, base: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }

        let base_us = base.as_micros() as u64;
        let upper = (prev.as_micros() as u64)
            .saturating_mul(3)
            .min(max.as_micros() as u64)
            .max(base_us);

        if base_us >= upper {
            return base;
        }
        Duration::from_micros(rand::rng().random_range(base_us..=upper))
    }

    fn full(delay: Duration) -> Duration {
        let us = delay.as_micros() as u64;
        if us == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::rng().random_range(0..=us))
    }

    fn equal(delay: Duration) -> Duration {
        let us = delay.as_micros() as u64;
        let half = us / 2;
        if half == 0 {
            return delay;
        }
        Duration::from_micros(half + rand::rng().random_range(0..=half))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_is_identity() {
        let d = Duration::from_millis(7);
        assert_eq!(JitterPolicy::None.apply(d), d);
        assert_eq!(JitterPolicy::Decorrelated.apply(d), d);
    }

    #[test]
    fn test_zero_delay_stays_zero() {
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(JitterPolicy::Equal.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_decorrelated_collapses_to_base_when_range_empty() {
        let base = Duration::from_millis(10);
        let got = JitterPolicy::Decorrelated.apply_decorrelated(base, Duration::ZERO, base);
        assert_eq!(got, base);
    }
}
