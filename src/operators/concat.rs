//! Concat: inner streams one after another, in arrival order.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::observable::{Item, Notification, Observable, Observer};
use crate::scheduler::SchedulerRef;
use crate::subscriber::Subscriber;

struct Queue<T> {
    pending: VecDeque<Observable<T>>,
    active: bool,
    outer_done: bool,
}

struct Concat<T> {
    queue: Mutex<Queue<T>>,
    obs: Observer<T>,
    sched: SchedulerRef,
    sub: Subscriber,
}

impl<T: Item> Concat<T> {
    /// Queues `inner`; starts it on the scheduler if nothing is running.
    fn push(self: &Arc<Self>, inner: Observable<T>) {
        let start = {
            let mut q = self.queue.lock();
            q.pending.push_back(inner);
            !std::mem::replace(&mut q.active, true)
        };
        if start {
            self.schedule_next();
        }
    }

    fn outer_complete(&self) {
        let finished = {
            let mut q = self.queue.lock();
            q.outer_done = true;
            !q.active && q.pending.is_empty()
        };
        if finished {
            self.obs.complete();
        }
    }

    fn schedule_next(self: &Arc<Self>) {
        let this = self.clone();
        self.sched.schedule(Box::new(move || this.start_next()));
    }

    fn start_next(self: &Arc<Self>) {
        if self.sub.canceled() {
            return;
        }
        let (next, finished) = {
            let mut q = self.queue.lock();
            let next = q.pending.pop_front();
            if next.is_none() {
                q.active = false;
            }
            (next, q.outer_done)
        };
        let Some(inner) = next else {
            if finished {
                self.obs.complete();
            }
            return;
        };

        let this = self.clone();
        let observer = Observer::new(move |n| match n {
            Notification::Complete => this.schedule_next(),
            n => this.obs.notify(n),
        });
        inner.run(observer, self.sched.clone(), self.sub.add_child());
    }
}

fn concat_outer<U: Item, T: Item>(
    outer: Observable<U>,
    project: Arc<dyn Fn(U) -> Observable<T> + Send + Sync>,
) -> Observable<T> {
    Observable::create(move |obs: Observer<T>, sched: SchedulerRef, sub: Subscriber| {
        let state = Arc::new(Concat {
            queue: Mutex::new(Queue {
                pending: VecDeque::new(),
                active: false,
                outer_done: false,
            }),
            obs: obs.serialized(),
            sched: sched.clone(),
            sub: sub.clone(),
        });
        let project = project.clone();
        let outer_obs = Observer::new(move |n: Notification<U>| match n {
            Notification::Next(v) => state.push(project(v)),
            Notification::Error(e) => state.obs.error(e),
            Notification::Complete => state.outer_complete(),
        });
        outer.run(outer_obs, sched, sub.add_child());
    })
}

/// Subscribes the sources one at a time, each after the previous one completed.
///
/// # Example
/// ```
/// use rill::{Observable, concat, cooperative};
///
/// let all = concat(vec![Observable::from_iter([1, 2, 3]), Observable::from_iter([4, 5])]);
/// assert_eq!(all.to_vec(cooperative()).unwrap(), vec![1, 2, 3, 4, 5]);
/// ```
pub fn concat<T: Item>(sources: Vec<Observable<T>>) -> Observable<T> {
    Observable::from_iter(sources).concat_all()
}

impl<T: Item> Observable<T> {
    /// Continues with `other` after this stream completes.
    pub fn concat_with(&self, other: &Observable<T>) -> Observable<T> {
        concat(vec![self.clone(), other.clone()])
    }

    /// Maps every value to a stream and concatenates them in order.
    pub fn concat_map<R: Item>(
        &self,
        project: impl Fn(T) -> Observable<R> + Send + Sync + 'static,
    ) -> Observable<R> {
        concat_outer(self.clone(), Arc::new(project))
    }
}

impl<T: Item> Observable<Observable<T>> {
    /// Concatenates the inner streams emitted by this stream.
    pub fn concat_all(&self) -> Observable<T> {
        concat_outer(self.clone(), Arc::new(|inner: Observable<T>| inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RxError;
    use crate::scheduler::{concurrent, cooperative};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_concat_on_both_schedulers() {
        for sched in [cooperative(), concurrent()] {
            let all = concat(vec![Observable::from_iter([1, 2, 3]), Observable::from_iter([4, 5])]);
            assert_eq!(all.to_vec(sched).unwrap(), vec![1, 2, 3, 4, 5]);
        }
    }

    #[test]
    fn test_one_inner_at_a_time() {
        let subscribed = Arc::new(AtomicUsize::new(0));
        let s = subscribed.clone();
        let first = Observable::<i32>::never();
        let second = Observable::create(move |_: Observer<i32>, _, _| {
            s.fetch_add(1, Ordering::SeqCst);
        });
        let sched = cooperative();
        let sub = first.concat_with(&second).subscribe(
            Observer::new(|_| {}),
            crate::observable::SubscribeOptions::new().with_scheduler(sched.clone()),
        );
        sched.wait();
        assert_eq!(subscribed.load(Ordering::SeqCst), 0);
        sub.unsubscribe();
    }

    #[test]
    fn test_active_error_is_terminal() {
        let subscribed = Arc::new(AtomicUsize::new(0));
        let s = subscribed.clone();
        let tail = Observable::defer(move || {
            s.fetch_add(1, Ordering::SeqCst);
            Observable::just(9)
        });
        let failing = Observable::from_iter([1]).concat_with(&Observable::throw(RxError::failed("x")));
        let res = failing.concat_with(&tail).to_vec(cooperative());
        assert!(matches!(res, Err(RxError::Failed { .. })));
        assert_eq!(subscribed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_long_chain_does_not_grow_the_stack() {
        let sources: Vec<_> = (0..5_000).map(Observable::just).collect();
        let got = concat(sources).to_vec(cooperative()).unwrap();
        assert_eq!(got.len(), 5_000);
        assert_eq!(got[4_999], 4_999);
    }

    #[test]
    fn test_concat_map_preserves_order() {
        let got = Observable::from_iter([1, 2, 3])
            .concat_map(|i| Observable::from_iter(vec![i; i as usize]))
            .to_vec(concurrent())
            .unwrap();
        assert_eq!(got, vec![1, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn test_empty_outer_completes() {
        assert!(concat::<u8>(Vec::new()).to_vec(cooperative()).unwrap().is_empty());
    }
}
