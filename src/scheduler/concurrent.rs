//! # Concurrent scheduler backed by tokio.
//!
//! Each submission becomes one async driver on a tokio runtime. The driver
//! sleeps for the requested delay (cancellable), then hands the synchronous task
//! to the blocking pool; when the task asks to run again the driver loops, so
//! successive runs of one recursive task may land on different worker threads.
//!
//! ```text
//! schedule_after_recursive(d, task)
//!   └─► runtime.spawn(driver)
//!          loop {
//!            ├─► select { sleep(d), handle.cancelled() → exit }
//!            ├─► spawn_blocking(task(&mut again)).await
//!            └─► again.after(d') ? continue : exit
//!          }
//!          └─► outstanding -= 1 (guard; also on panic)
//! ```
//!
//! ## Rules
//! - `wait()` blocks on a condvar until the outstanding count is zero.
//! - A panicking task is logged and counted as finished; it does not poison the scheduler.
//! - Dropping an owned runtime uses `shutdown_background`, so the last reference
//!   may be released from inside one of the scheduler's own tasks.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tokio::runtime::{Builder, Handle, Runtime};

use super::{Again, RecursiveTask, Scheduler, TaskHandle};

/// Settings for an owned tokio runtime.
///
/// ## Sentinel values
/// - `workers = 0` → tokio default (one per core)
/// - `max_blocking_threads = 0` → tokio default (512)
#[derive(Clone, Debug)]
pub struct ConcurrentConfig {
    /// Async worker threads driving timers and dispatch.
    pub workers: usize,
    /// Upper bound of threads running tasks.
    pub max_blocking_threads: usize,
    /// Thread name prefix.
    pub thread_name: String,
}

impl Default for ConcurrentConfig {
    fn default() -> Self {
        Self {
            workers: 0,
            max_blocking_threads: 0,
            thread_name: "rill-worker".to_string(),
        }
    }
}

impl ConcurrentConfig {
    /// Returns the worker count as an `Option` (`None` = runtime default).
    #[inline]
    pub fn worker_threads(&self) -> Option<usize> {
        (self.workers > 0).then_some(self.workers)
    }

    /// Returns the blocking thread cap as an `Option` (`None` = runtime default).
    #[inline]
    pub fn blocking_threads(&self) -> Option<usize> {
        (self.max_blocking_threads > 0).then_some(self.max_blocking_threads)
    }
}

#[derive(Default)]
struct Outstanding {
    count: Mutex<usize>,
    zero: Condvar,
}

impl Outstanding {
    fn enter(self: &Arc<Self>) -> OutstandingGuard {
        *self.count.lock() += 1;
        OutstandingGuard(self.clone())
    }
}

struct OutstandingGuard(Arc<Outstanding>);

impl Drop for OutstandingGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.zero.notify_all();
        }
    }
}

/// Multi-worker scheduler.
pub struct ConcurrentScheduler {
    runtime: Option<Runtime>,
    handle: Handle,
    outstanding: Arc<Outstanding>,
}

impl ConcurrentScheduler {
    /// Builds a scheduler with its own multi-thread runtime.
    ///
    /// # Errors
    ///
    /// Returns the I/O error reported by tokio if the runtime threads cannot be spawned.
    pub fn new(cfg: ConcurrentConfig) -> std::io::Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_time().thread_name(cfg.thread_name.clone());
        if let Some(n) = cfg.worker_threads() {
            builder.worker_threads(n);
        }
        if let Some(n) = cfg.blocking_threads() {
            builder.max_blocking_threads(n);
        }
        let runtime = builder.build()?;
        let handle = runtime.handle().clone();
        Ok(Self {
            runtime: Some(runtime),
            handle,
            outstanding: Arc::new(Outstanding::default()),
        })
    }

    /// Uses an existing runtime (which must have the time driver enabled).
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            runtime: None,
            handle,
            outstanding: Arc::new(Outstanding::default()),
        }
    }
}

impl Drop for ConcurrentScheduler {
    fn drop(&mut self) {
        if let Some(rt) = self.runtime.take() {
            rt.shutdown_background();
        }
    }
}

impl Scheduler for ConcurrentScheduler {
    fn schedule_after_recursive(&self, delay: Duration, task: RecursiveTask) -> TaskHandle {
        let handle = TaskHandle::new();
        let token = handle.token().clone();
        let guard = self.outstanding.enter();

        self.handle.spawn(async move {
            let _guard = guard;
            let mut task = task;
            let mut delay = delay;
            loop {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = token.cancelled() => break,
                    }
                }
                if token.is_cancelled() {
                    break;
                }

                let run = tokio::task::spawn_blocking(move || {
                    let mut again = Again::default();
                    task(&mut again);
                    (task, again.take())
                })
                .await;

                match run {
                    Ok((back, Some(next))) => {
                        task = back;
                        delay = next;
                    }
                    Ok((_, None)) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "scheduled task panicked");
                        break;
                    }
                }
            }
        });
        handle
    }

    fn is_concurrent(&self) -> bool {
        true
    }

    fn wait(&self) {
        let mut count = self.outstanding.count.lock();
        while *count > 0 {
            self.outstanding.zero.wait(&mut count);
        }
    }

    fn count(&self) -> usize {
        *self.outstanding.count.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn scheduler() -> ConcurrentScheduler {
        ConcurrentScheduler::new(ConcurrentConfig {
            workers: 2,
            ..ConcurrentConfig::default()
        })
        .expect("runtime")
    }

    #[test]
    fn test_config_sentinels() {
        let cfg = ConcurrentConfig::default();
        assert_eq!(cfg.worker_threads(), None);
        assert_eq!(cfg.blocking_threads(), None);
        let cfg = ConcurrentConfig {
            workers: 3,
            max_blocking_threads: 8,
            ..cfg
        };
        assert_eq!(cfg.worker_threads(), Some(3));
        assert_eq!(cfg.blocking_threads(), Some(8));
    }

    #[test]
    fn test_wait_blocks_until_all_tasks_ran() {
        let sched = scheduler();
        let hits = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let h = hits.clone();
            sched.schedule(Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }));
        }
        sched.wait();
        assert_eq!(hits.load(Ordering::SeqCst), 100);
        assert_eq!(sched.count(), 0);
    }

    #[test]
    fn test_tasks_run_in_parallel() {
        let sched = scheduler();
        let threads = Arc::new(Mutex::new(HashSet::new()));
        for _ in 0..8 {
            let t = threads.clone();
            sched.schedule(Box::new(move || {
                std::thread::sleep(Duration::from_millis(20));
                t.lock().insert(std::thread::current().id());
            }));
        }
        sched.wait();
        assert!(threads.lock().len() > 1);
    }

    #[test]
    fn test_recursive_after_and_count() {
        let sched = scheduler();
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let start = Instant::now();
        sched.schedule_after_recursive(
            Duration::from_millis(5),
            Box::new(move |again: &mut Again| {
                if r.fetch_add(1, Ordering::SeqCst) + 1 < 4 {
                    again.after(Duration::from_millis(5));
                }
            }),
        );
        assert_eq!(sched.count(), 1);
        sched.wait();
        assert_eq!(runs.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_cancel_during_delay() {
        let sched = scheduler();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let handle = sched.schedule_after(
            Duration::from_secs(30),
            Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        handle.cancel();
        sched.wait();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_task_still_releases_wait() {
        let sched = scheduler();
        sched.schedule(Box::new(|| panic!("boom")));
        sched.wait();
        assert_eq!(sched.count(), 0);
    }

    #[test]
    fn test_from_handle() {
        let rt = Builder::new_multi_thread().enable_time().build().expect("runtime");
        let sched = ConcurrentScheduler::from_handle(rt.handle().clone());
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        sched.schedule(Box::new(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        sched.wait();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(sched.is_concurrent());
    }
}
