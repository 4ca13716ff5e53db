//! Delay and wait policies.
//!
//! This module groups the knobs that control **how long** the engine waits:
//!
//! ## Contents
//! - [`BackoffPolicy`] delay between resubscriptions of the retry operator (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy to spread simultaneous retries
//! - [`WaitPolicy`]    escalating spin → yield → sleep → park schedule used by the
//!   ring buffer when a reader is caught up or the writer finds the buffer full
//!
//! ## Quick wiring
//! ```text
//! retry_with(n, BackoffPolicy) ── backoff.next(attempt) ──► scheduler.schedule_after(delay, resubscribe)
//! SubjectConfig { wait: WaitPolicy, .. }
//!      └─► RingBuffer reader task: Waiter::step() ──► again() / after(delay) / park
//!      └─► RingBuffer::next while full: Waiter::step() ──► spin / yield / sleep
//! ```
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=1ms, factor=1.0 (constant), max=1s, jitter=None.
//! - `JitterPolicy::None`.
//! - `WaitPolicy::default()` → 64 spins, 16 yields, sleeps growing 50µs → 1ms, park 10ms.

mod backoff;
mod jitter;
mod wait;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use wait::{WaitPolicy, WaitStep, Waiter};
