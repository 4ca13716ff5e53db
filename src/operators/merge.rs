//! Merge: every inner stream subscribed at once, values forwarded as they arrive.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::observable::{Item, Notification, Observable, Observer};
use crate::scheduler::SchedulerRef;
use crate::subscriber::Subscriber;

/// Subscribes every source and forwards their values interleaved.
///
/// Completes after the last source completes; the first error from any source
/// terminates the merge and cancels the others.
///
/// # Example
/// ```
/// use rill::{Observable, cooperative, merge};
///
/// let mut got = merge(vec![Observable::from_iter([1, 2]), Observable::from_iter([3])])
///     .to_vec(cooperative())
///     .unwrap();
/// got.sort();
/// assert_eq!(got, vec![1, 2, 3]);
/// ```
pub fn merge<T: Item>(sources: Vec<Observable<T>>) -> Observable<T> {
    let sources: Arc<[Observable<T>]> = sources.into();
    Observable::create(move |obs: Observer<T>, sched: SchedulerRef, sub: Subscriber| {
        if sources.is_empty() {
            Observable::empty().run(obs, sched, sub);
            return;
        }
        let obs = obs.serialized();
        let live = Arc::new(AtomicUsize::new(sources.len()));
        for source in sources.iter() {
            if sub.canceled() {
                return;
            }
            source.run(counted(&obs, &live), sched.clone(), sub.add_child());
        }
    })
}

/// Forwards everything except `Complete`, which only counts down `live`.
fn counted<T: Item>(obs: &Observer<T>, live: &Arc<AtomicUsize>) -> Observer<T> {
    let (obs, live) = (obs.clone(), live.clone());
    Observer::new(move |n| match n {
        Notification::Complete => {
            if live.fetch_sub(1, Ordering::AcqRel) == 1 {
                obs.complete();
            }
        }
        n => obs.notify(n),
    })
}

/// Merges the streams produced by `project` for every value of `outer`.
///
/// The outer stream counts as one live source.
fn merge_outer<U: Item, T: Item>(
    outer: Observable<U>,
    project: Arc<dyn Fn(U) -> Observable<T> + Send + Sync>,
) -> Observable<T> {
    Observable::create(move |obs: Observer<T>, sched: SchedulerRef, sub: Subscriber| {
        let obs = obs.serialized();
        let live = Arc::new(AtomicUsize::new(1));

        let (o, l, s, parent, project) = (
            obs.clone(),
            live.clone(),
            sched.clone(),
            sub.clone(),
            project.clone(),
        );
        let outer_obs = Observer::new(move |n: Notification<U>| match n {
            Notification::Next(v) => {
                l.fetch_add(1, Ordering::AcqRel);
                project(v).run(counted(&o, &l), s.clone(), parent.add_child());
            }
            Notification::Error(e) => o.error(e),
            Notification::Complete => {
                if l.fetch_sub(1, Ordering::AcqRel) == 1 {
                    o.complete();
                }
            }
        });
        outer.run(outer_obs, sched, sub.add_child());
    })
}

impl<T: Item> Observable<T> {
    /// Merges this stream with `other`.
    pub fn merge_with(&self, other: &Observable<T>) -> Observable<T> {
        merge(vec![self.clone(), other.clone()])
    }

    /// Maps every value to a stream and merges all of them.
    pub fn merge_map<R: Item>(
        &self,
        project: impl Fn(T) -> Observable<R> + Send + Sync + 'static,
    ) -> Observable<R> {
        merge_outer(self.clone(), Arc::new(project))
    }
}

impl<T: Item> Observable<Observable<T>> {
    /// Merges every inner stream emitted by this stream.
    pub fn merge_all(&self) -> Observable<T> {
        merge_outer(self.clone(), Arc::new(|inner: Observable<T>| inner))
    }
}
