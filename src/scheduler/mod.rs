//! # Schedulers: where stream work runs.
//!
//! A [`Scheduler`] runs zero-argument tasks either **cooperatively** (one run
//! queue drained by whoever calls [`Scheduler::wait`]) or **concurrently** (a pool
//! of workers). Both expose the same contract, so every operator and subject works
//! on either one.
//!
//! ## Contract
//! ```text
//! schedule(task)                    run once, as soon as possible
//! schedule_recursive(task)          run; task may call again.again() to be re-enqueued
//! schedule_after(delay, task)       run once after delay
//! schedule_after_recursive(d, task) run after d; task may call again.after(d2)
//! is_concurrent()                   cooperative = false, concurrent = true
//! wait()                            block until no task is queued or outstanding
//! ```
//!
//! ## Rules
//! - Recursion never grows the call stack: a continuation is re-enqueued, never
//!   re-entered. On a concurrent scheduler it may run on a different worker.
//! - Every submission returns a [`TaskHandle`]; canceling it turns the pending run
//!   (and every later continuation) into a no-op.
//! - Callers check their subscriber's cancellation before and after invoking user
//!   code; the scheduler raises no domain errors of its own.
//!
//! ## Choosing
//! - [`CooperativeScheduler`]: deterministic, single-threaded; work runs inside
//!   `wait()` on the caller's thread. Default for [`Observable::subscribe`](crate::Observable::subscribe).
//! - [`ConcurrentScheduler`]: tokio-backed; tasks run on the blocking pool.

mod concurrent;
mod cooperative;

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

pub use concurrent::{ConcurrentConfig, ConcurrentScheduler};
pub use cooperative::CooperativeScheduler;

/// One-shot unit of work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Self-resubmitting unit of work; the [`Again`] handle requests the next run.
pub type RecursiveTask = Box<dyn FnMut(&mut Again) + Send + 'static>;

/// Shared scheduler reference passed through subscriptions.
pub type SchedulerRef = Arc<dyn Scheduler>;

/// Continuation handle given to a recursive task.
///
/// If neither method is called before the task returns, the task is finished.
#[derive(Debug, Default)]
pub struct Again {
    next: Option<Duration>,
}

impl Again {
    /// Re-enqueues the task to run again as soon as possible.
    pub fn again(&mut self) {
        self.next = Some(Duration::ZERO);
    }

    /// Re-enqueues the task to run again after `delay`.
    pub fn after(&mut self, delay: Duration) {
        self.next = Some(delay);
    }

    /// Consumes the request made during the last run.
    pub(crate) fn take(&mut self) -> Option<Duration> {
        self.next.take()
    }
}

/// Cancel handle for a scheduled task.
#[derive(Clone, Debug, Default)]
pub struct TaskHandle {
    token: CancellationToken,
}

impl TaskHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Cancels the task; pending and future runs become no-ops.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns `true` once [`cancel`](Self::cancel) was called.
    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// Execution context for stream work.
pub trait Scheduler: Send + Sync + 'static {
    /// Runs `task` after `delay`; the task may request further runs through [`Again`].
    fn schedule_after_recursive(&self, delay: Duration, task: RecursiveTask) -> TaskHandle;

    /// Returns `true` if tasks may run in parallel on several workers.
    fn is_concurrent(&self) -> bool;

    /// Blocks until nothing is queued or outstanding.
    ///
    /// On a cooperative scheduler this drains the queue on the calling thread.
    fn wait(&self);

    /// Number of queued or outstanding tasks.
    fn count(&self) -> usize;

    /// Runs `task` once, as soon as possible.
    fn schedule(&self, task: Task) -> TaskHandle {
        self.schedule_after(Duration::ZERO, task)
    }

    /// Runs `task`, then again each time it calls [`Again::again`].
    fn schedule_recursive(&self, task: RecursiveTask) -> TaskHandle {
        self.schedule_after_recursive(Duration::ZERO, task)
    }

    /// Runs `task` once after `delay`.
    fn schedule_after(&self, delay: Duration, task: Task) -> TaskHandle {
        let mut task = Some(task);
        self.schedule_after_recursive(
            delay,
            Box::new(move |_: &mut Again| {
                if let Some(task) = task.take() {
                    task();
                }
            }),
        )
    }
}

/// Returns a fresh cooperative scheduler.
pub fn cooperative() -> SchedulerRef {
    Arc::new(CooperativeScheduler::new())
}

/// Returns the process-wide concurrent scheduler (default tokio runtime settings).
///
/// # Panics
///
/// Panics if the backing runtime cannot be built on first use (the OS refused to
/// spawn its threads). Use [`ConcurrentScheduler::new`] to handle that error.
pub fn concurrent() -> SchedulerRef {
    static SHARED: OnceLock<SchedulerRef> = OnceLock::new();
    SHARED
        .get_or_init(|| {
            let sched = ConcurrentScheduler::new(ConcurrentConfig::default())
                .expect("failed to build the shared concurrent scheduler runtime");
            Arc::new(sched)
        })
        .clone()
}
