//! Timeout: fail when the source stays silent for too long.
//!
//! ```text
//! subscribe ─► arm(gen 1) ─► timer ─┐
//! next(v)   ─► arm(gen k+1), forward v   (older timers see a stale generation)
//! terminal  ─► disarm, forward
//! timer(gen) == current gen && !fired ─► fired, Timeout error
//! ```
//!
//! Every decision is taken under one lock; deliveries happen after it is released.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::RxError;
use crate::observable::{Item, Notification, Observable, Observer};
use crate::scheduler::{SchedulerRef, TaskHandle};
use crate::subscriber::Subscriber;

#[derive(Default)]
struct Timer {
    generation: u64,
    handle: Option<TaskHandle>,
    fired: bool,
}

struct Timeout<T> {
    timer: Mutex<Timer>,
    window: Duration,
    obs: Observer<T>,
    sched: SchedulerRef,
}

impl<T: Item> Timeout<T> {
    /// Replaces the running timer. Returns `false` once the race is decided.
    fn arm(self: &Arc<Self>) -> bool {
        let mut timer = self.timer.lock();
        if timer.fired {
            return false;
        }
        timer.generation += 1;
        let generation = timer.generation;
        let this = self.clone();
        let handle = self
            .sched
            .schedule_after(self.window, Box::new(move || this.expire(generation)));
        if let Some(old) = timer.handle.replace(handle) {
            old.cancel();
        }
        true
    }

    /// Settles the race in favor of the caller. Returns `false` if it was already settled.
    fn disarm(&self) -> bool {
        let mut timer = self.timer.lock();
        if std::mem::replace(&mut timer.fired, true) {
            return false;
        }
        if let Some(handle) = timer.handle.take() {
            handle.cancel();
        }
        true
    }

    fn expire(&self, generation: u64) {
        {
            let mut timer = self.timer.lock();
            if timer.fired || timer.generation != generation {
                return;
            }
            timer.fired = true;
            timer.handle = None;
        }
        tracing::debug!(window_ms = self.window.as_millis() as u64, "source timed out");
        self.obs.error(RxError::Timeout {
            timeout: self.window,
        });
    }

    fn observe(self: &Arc<Self>, n: Notification<T>) {
        match n {
            Notification::Next(v) => {
                if self.arm() {
                    self.obs.next(v);
                }
            }
            n => {
                if self.disarm() {
                    self.obs.notify(n);
                }
            }
        }
    }
}

impl<T: Item> Observable<T> {
    /// Fails with [`RxError::Timeout`] when no value arrives within `window` of
    /// subscribing or of the previous value.
    ///
    /// # Example
    /// ```
    /// use std::time::Duration;
    /// use rill::{Observable, RxError, cooperative};
    ///
    /// let silent = Observable::<i32>::never().timeout(Duration::from_millis(5));
    /// assert!(matches!(silent.to_vec(cooperative()), Err(RxError::Timeout { .. })));
    /// ```
    pub fn timeout(&self, window: Duration) -> Observable<T> {
        let source = self.clone();
        Observable::create(move |obs: Observer<T>, sched: SchedulerRef, sub: Subscriber| {
            let state = Arc::new(Timeout {
                timer: Mutex::new(Timer::default()),
                window,
                obs: obs.serialized(),
                sched: sched.clone(),
            });
            state.arm();
            let disarm = state.clone();
            sub.on_unsubscribe(move || {
                disarm.disarm();
            });
            source.run(Observer::new(move |n| state.observe(n)), sched, sub.add_child());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::SubscribeOptions;
    use crate::scheduler::{concurrent, cooperative};
    use std::time::Instant;

    #[test]
    fn test_fast_source_is_untouched() {
        let start = Instant::now();
        let got = Observable::from_iter([1, 2, 3])
            .timeout(Duration::from_secs(30))
            .to_vec(cooperative())
            .unwrap();
        assert_eq!(got, vec![1, 2, 3]);
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_silence_after_value_times_out() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        let sub = Observable::just(1)
            .concat_with(&Observable::never())
            .timeout(Duration::from_millis(10))
            .subscribe_fn(
                move |v| l.lock().push(v),
                |_| {},
                || {},
                SubscribeOptions::new().with_scheduler(cooperative()),
            );
        match sub.wait() {
            Err(RxError::Timeout { timeout }) => assert_eq!(timeout, Duration::from_millis(10)),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(*log.lock(), vec![1]);
    }

    #[test]
    fn test_slow_value_loses_the_race() {
        let res = Observable::timer(Duration::from_millis(200))
            .timeout(Duration::from_millis(10))
            .to_vec(cooperative());
        assert!(matches!(res, Err(RxError::Timeout { .. })));
    }

    #[test]
    fn test_value_within_window_wins() {
        let got = Observable::timer(Duration::from_millis(5))
            .timeout(Duration::from_millis(500))
            .to_vec(concurrent())
            .unwrap();
        assert_eq!(got, vec![0]);
    }

    #[test]
    fn test_unsubscribe_disarms_timer() {
        let sched = cooperative();
        let errors = Arc::new(Mutex::new(0));
        let e = errors.clone();
        let sub = Observable::<i32>::never().timeout(Duration::from_secs(30)).subscribe_fn(
            |_| {},
            move |_| *e.lock() += 1,
            || {},
            SubscribeOptions::new().with_scheduler(sched.clone()),
        );
        sub.unsubscribe();
        let start = Instant::now();
        sched.wait();
        assert!(start.elapsed() < Duration::from_secs(5));
        assert_eq!(*errors.lock(), 0);
    }
}
