//! # Escalating wait schedule.
//!
//! [`WaitPolicy`] describes how a party that cannot make progress backs off:
//! a caught-up ring-buffer reader, or a writer facing a full buffer. Each
//! consecutive unproductive round escalates one step:
//!
//! ```text
//! round:  0 .. spin ─► spin .. spin+yields ─► sleeps first_sleep·2^k (≤ max_sleep) ─► park
//! step:   Spin          Yield                  Sleep(d)                              Park(park)
//! ```
//!
//! A productive round resets the [`Waiter`]. The thresholds are tuning, not
//! contract; only the escalation order is guaranteed.
//!
//! On a cooperative scheduler `Yield` and `Park` are never produced: there is no
//! other thread to yield to or wake a parked reader, so the schedule tops out at
//! a fixed `Sleep(max_sleep)` reschedule instead.

use std::time::Duration;

/// Thresholds of the escalating wait schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Rounds of busy-spinning before yielding.
    pub spin: u32,
    /// Rounds of thread yields before sleeping (concurrent schedulers only).
    pub yields: u32,
    /// First sleep duration; doubles each round.
    pub first_sleep: Duration,
    /// Longest sleep; reaching it switches to the final step.
    pub max_sleep: Duration,
    /// Upper bound of one condition-wait on concurrent schedulers.
    pub park: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            spin: 64,
            yields: 16,
            first_sleep: Duration::from_micros(50),
            max_sleep: Duration::from_millis(1),
            park: Duration::from_millis(10),
        }
    }
}

/// One step of the wait schedule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WaitStep {
    /// Retry immediately (`spin_loop` hint).
    Spin,
    /// Give the thread up once, then retry.
    Yield,
    /// Retry after the given delay.
    Sleep(Duration),
    /// Condition-wait for a producer signal, at most the given duration.
    Park(Duration),
}

impl WaitPolicy {
    /// Returns the step for the given unproductive `round`.
    pub fn step(&self, round: u32, concurrent: bool) -> WaitStep {
        if round < self.spin {
            return WaitStep::Spin;
        }
        let round = round - self.spin;
        let yields = if concurrent { self.yields } else { 0 };
        if round < yields {
            return WaitStep::Yield;
        }

        let exp = (round - yields).min(31);
        let sleep = self
            .first_sleep
            .checked_mul(1u32 << exp)
            .unwrap_or(self.max_sleep)
            .min(self.max_sleep);

        if sleep < self.max_sleep {
            WaitStep::Sleep(sleep)
        } else if concurrent {
            WaitStep::Park(self.park)
        } else {
            WaitStep::Sleep(self.max_sleep)
        }
    }
}

/// Round counter walking a [`WaitPolicy`].
#[derive(Clone, Debug)]
pub struct Waiter {
    policy: WaitPolicy,
    concurrent: bool,
    round: u32,
}

impl Waiter {
    /// Creates a waiter at round zero.
    pub fn new(policy: WaitPolicy, concurrent: bool) -> Self {
        Self {
            policy,
            concurrent,
            round: 0,
        }
    }

    /// Returns the next step and escalates.
    pub fn step(&mut self) -> WaitStep {
        let step = self.policy.step(self.round, self.concurrent);
        self.round = self.round.saturating_add(1);
        step
    }

    /// Called after a productive round.
    pub fn reset(&mut self) {
        self.round = 0;
    }

    /// Number of unproductive rounds since the last reset.
    pub fn rounds(&self) -> u32 {
        self.round
    }

    /// Performs a blocking step on the calling thread.
    ///
    /// Used by the write path, which is a plain call rather than a scheduled task.
    pub fn block(&mut self) {
        match self.step() {
            WaitStep::Spin => std::hint::spin_loop(),
            WaitStep::Yield => std::thread::yield_now(),
            WaitStep::Sleep(d) | WaitStep::Park(d) => std::thread::sleep(d),
        }
    }
}
