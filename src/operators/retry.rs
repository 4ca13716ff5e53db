//! Retry: resubscribe to a failed source after a backoff delay.
//!
//! ```text
//! subscribe ─► attach(child 0) ── error ─► attempts < limit? ─► schedule_after(backoff.next(k)) ─► attach(child k+1)
//!                                                     └─ no ─► forward error
//! ```
//!
//! Values and completion of every attempt are forwarded as they arrive. The
//! resubscription runs on the scheduler the retrying stream was subscribed on.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::error::RxError;
use crate::observable::{Item, Notification, Observable, Observer};
use crate::operators::RETRY_DELAY;
use crate::policies::BackoffPolicy;
use crate::scheduler::{SchedulerRef, TaskHandle};
use crate::subscriber::Subscriber;

struct Retry<T> {
    source: Observable<T>,
    backoff: BackoffPolicy,
    limit: u32,
    attempts: AtomicU32,
    pending: Mutex<Option<TaskHandle>>,
    obs: Observer<T>,
    sched: SchedulerRef,
    sub: Subscriber,
}

impl<T: Item> Retry<T> {
    fn attach(self: &Arc<Self>) {
        if self.sub.canceled() {
            return;
        }
        let this = self.clone();
        let observer = Observer::new(move |n| match n {
            Notification::Error(e) => this.failed(e),
            n => this.obs.notify(n),
        });
        self.source.run(observer, self.sched.clone(), self.sub.add_child());
    }

    fn failed(self: &Arc<Self>, err: RxError) {
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel);
        if attempt >= self.limit || self.sub.canceled() {
            self.obs.error(err);
            return;
        }

        let delay = self.backoff.next(attempt);
        tracing::debug!(
            attempt = attempt + 1,
            limit = self.limit,
            delay_ms = delay.as_millis() as u64,
            error = %err.as_label(),
            "resubscribing after error"
        );
        let this = self.clone();
        let handle = self.sched.schedule_after(delay, Box::new(move || this.attach()));
        self.pending.lock().replace(handle);
        if self.sub.canceled() {
            self.cancel_pending();
        }
    }

    fn cancel_pending(&self) {
        if let Some(handle) = self.pending.lock().take() {
            handle.cancel();
        }
    }
}

impl<T: Item> Observable<T> {
    /// Resubscribes up to `count` times after an error, waiting
    /// [`RETRY_DELAY`] each time. The error of the last attempt is forwarded.
    ///
    /// # Example
    /// ```
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicUsize, Ordering};
    /// use rill::{Observable, RxError, cooperative};
    ///
    /// let calls = Arc::new(AtomicUsize::new(0));
    /// let c = calls.clone();
    /// let flaky = Observable::defer(move || {
    ///     if c.fetch_add(1, Ordering::SeqCst) < 2 {
    ///         Observable::throw(RxError::failed("flaky"))
    ///     } else {
    ///         Observable::just(42)
    ///     }
    /// });
    /// assert_eq!(flaky.retry(2).to_vec(cooperative()).unwrap(), vec![42]);
    /// ```
    pub fn retry(&self, count: u32) -> Observable<T> {
        self.retry_with(count, BackoffPolicy::fixed(RETRY_DELAY))
    }

    /// Like [`retry`](Observable::retry), with the delay before resubscription
    /// number `k` taken from `backoff.next(k)`.
    pub fn retry_with(&self, count: u32, backoff: BackoffPolicy) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |obs: Observer<T>, sched: SchedulerRef, sub: Subscriber| {
            let retry = Arc::new(Retry {
                source: source.clone(),
                backoff,
                limit: count,
                attempts: AtomicU32::new(0),
                pending: Mutex::new(None),
                obs,
                sched,
                sub: sub.clone(),
            });
            let weak = Arc::downgrade(&retry);
            sub.on_unsubscribe(move || {
                if let Some(retry) = weak.upgrade() {
                    retry.cancel_pending();
                }
            });
            retry.attach();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::SubscribeOptions;
    use crate::scheduler::{concurrent, cooperative};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    fn flaky(failures: usize, calls: &Arc<AtomicUsize>) -> Observable<i32> {
        let calls = calls.clone();
        Observable::defer(move || {
            if calls.fetch_add(1, Ordering::SeqCst) < failures {
                Observable::from_iter([0]).concat_with(&Observable::throw(RxError::failed("flaky")))
            } else {
                Observable::from_iter([1, 2])
            }
        })
    }

    #[test]
    fn test_recovers_within_limit() {
        let calls = Arc::new(AtomicUsize::new(0));
        let got = flaky(2, &calls).retry(2).to_vec(cooperative()).unwrap();
        assert_eq!(got, vec![0, 0, 1, 2]);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_forwards_error_when_exhausted() {
        let calls = Arc::new(AtomicUsize::new(0));
        let res = flaky(5, &calls).retry(1).to_vec(cooperative());
        assert!(matches!(res, Err(RxError::Failed { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_zero_retries_forwards_first_error() {
        let calls = Arc::new(AtomicUsize::new(0));
        assert!(flaky(1, &calls).retry(0).to_vec(cooperative()).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backoff_delays_resubscription() {
        let calls = Arc::new(AtomicUsize::new(0));
        let backoff = BackoffPolicy::fixed(Duration::from_millis(20));
        let start = Instant::now();
        let got = flaky(2, &calls).retry_with(3, backoff).to_vec(cooperative()).unwrap();
        assert!(start.elapsed() >= Duration::from_millis(40));
        assert_eq!(got, vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_retry_on_concurrent_scheduler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let got = flaky(3, &calls).retry(3).to_vec(concurrent()).unwrap();
        assert_eq!(got, vec![0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_attempts_do_not_accumulate_callbacks() {
        let calls = Arc::new(AtomicUsize::new(0));
        let retrying = flaky(200, &calls).retry_with(200, BackoffPolicy::fixed(Duration::ZERO));
        let captured = Arc::new(Mutex::new(None::<Subscriber>));
        let c = captured.clone();
        let wrapped = Observable::create(move |obs: Observer<i32>, sched: SchedulerRef, sub: Subscriber| {
            *c.lock() = Some(sub.clone());
            retrying.run(obs, sched, sub);
        });

        let sched = cooperative();
        let sub = wrapped.subscribe(Observer::new(|_| {}), SubscribeOptions::new().with_scheduler(sched.clone()));
        let inner = captured.lock().clone().unwrap();
        let peak = Arc::new(AtomicUsize::new(0));
        let (p, watched) = (peak.clone(), inner.clone());
        let sampler = sched.schedule_recursive(Box::new(move |again: &mut crate::scheduler::Again| {
            p.fetch_max(watched.pending_callbacks(), Ordering::SeqCst);
            if watched.subscribed() {
                again.after(Duration::from_micros(100));
            }
        }));
        assert!(sub.wait().is_ok());
        sampler.cancel();
        assert_eq!(calls.load(Ordering::SeqCst), 201);
        assert!(peak.load(Ordering::SeqCst) <= 4, "peak {}", peak.load(Ordering::SeqCst));
    }

    #[test]
    fn test_unsubscribe_cancels_pending_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let sched = cooperative();
        let errors = Arc::new(Mutex::new(0));
        let e = errors.clone();
        let sub = flaky(10, &calls)
            .retry_with(5, BackoffPolicy::fixed(Duration::from_secs(30)))
            .subscribe_fn(
                |_| {},
                move |_| *e.lock() += 1,
                || {},
                SubscribeOptions::new().with_scheduler(sched.clone()),
            );
        let canceler = sub.clone();
        sched.schedule_after(Duration::from_millis(5), Box::new(move || canceler.unsubscribe()));
        let start = Instant::now();
        sched.wait();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(*errors.lock(), 0);
    }
}
