//! Source constructors.
//!
//! Every source emits from scheduled tasks, never from inside `subscribe`, and
//! emits one item per scheduler run so sibling streams interleave.

use std::sync::Arc;
use std::time::Duration;

use crate::error::RxError;
use crate::observable::{Item, Observable, Observer};
use crate::scheduler::{Again, SchedulerRef};
use crate::subscriber::Subscriber;

impl<T: Item> Observable<T> {
    /// Emits every item of `items`, then completes.
    pub fn from_iter(items: impl IntoIterator<Item = T>) -> Self {
        let items: Arc<[T]> = items.into_iter().collect();
        Self::create(move |obs: Observer<T>, sched: SchedulerRef, sub: Subscriber| {
            let items = items.clone();
            let guard = sub.clone();
            let mut index = 0;
            let handle = sched.schedule_recursive(Box::new(move |again: &mut Again| {
                if guard.canceled() {
                    return;
                }
                match items.get(index) {
                    Some(v) => {
                        index += 1;
                        obs.next(v.clone());
                        again.again();
                    }
                    None => obs.complete(),
                }
            }));
            sub.on_unsubscribe(move || handle.cancel());
        })
    }

    /// Emits `value`, then completes.
    pub fn just(value: T) -> Self {
        Self::from_iter([value])
    }

    /// Completes without emitting.
    pub fn empty() -> Self {
        Self::from_iter(std::iter::empty())
    }

    /// Never emits and never terminates.
    pub fn never() -> Self {
        Self::create(|_, _, _| {})
    }

    /// Fails with `err` without emitting.
    pub fn throw(err: RxError) -> Self {
        Self::create(move |obs: Observer<T>, sched: SchedulerRef, sub: Subscriber| {
            let err = err.clone();
            let handle = sched.schedule(Box::new(move || obs.error(err)));
            sub.on_unsubscribe(move || handle.cancel());
        })
    }

    /// Calls `factory` on every subscribe and subscribes to the stream it returns.
    pub fn defer(factory: impl Fn() -> Observable<T> + Send + Sync + 'static) -> Self {
        Self::create(move |obs, sched, sub| factory().run(obs, sched, sub))
    }
}

impl Observable<u64> {
    /// Emits `0, 1, 2, ...` every `period`, first after one period. Never completes.
    pub fn interval(period: Duration) -> Self {
        Self::create(move |obs: Observer<u64>, sched: SchedulerRef, sub: Subscriber| {
            let guard = sub.clone();
            let mut n = 0u64;
            let handle = sched.schedule_after_recursive(
                period,
                Box::new(move |again: &mut Again| {
                    if guard.canceled() {
                        return;
                    }
                    obs.next(n);
                    n += 1;
                    again.after(period);
                }),
            );
            sub.on_unsubscribe(move || handle.cancel());
        })
    }

    /// Emits `0` after `delay`, then completes.
    pub fn timer(delay: Duration) -> Self {
        Self::create(move |obs: Observer<u64>, sched: SchedulerRef, sub: Subscriber| {
            let handle = sched.schedule_after(
                delay,
                Box::new(move || {
                    obs.next(0);
                    obs.complete();
                }),
            );
            sub.on_unsubscribe(move || handle.cancel());
        })
    }
}
