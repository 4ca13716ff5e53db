//! Combine-latest: a snapshot of every input's most recent value.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::observable::{Item, Notification, Observable, Observer};
use crate::scheduler::SchedulerRef;
use crate::subscriber::Subscriber;

struct Latest<T> {
    values: Vec<Option<T>>,
    missing: usize,
    active: usize,
}

/// Emits `[latest(a), latest(b), ...]` once every source produced a value, and
/// again on every later value of any source.
///
/// Fails on the first source error. Completes when every source completed, or
/// as soon as a source completes without ever producing a value.
///
/// # Example
/// ```
/// use rill::{Observable, combine_latest, cooperative};
///
/// let snapshots = combine_latest(vec![Observable::just(1), Observable::from_iter([10, 20])])
///     .to_vec(cooperative())
///     .unwrap();
/// assert_eq!(snapshots, vec![vec![1, 10], vec![1, 20]]);
/// ```
pub fn combine_latest<T: Item>(sources: Vec<Observable<T>>) -> Observable<Vec<T>> {
    let sources: Arc<[Observable<T>]> = sources.into();
    Observable::create(move |obs: Observer<Vec<T>>, sched: SchedulerRef, sub: Subscriber| {
        if sources.is_empty() {
            Observable::empty().run(obs, sched, sub);
            return;
        }
        let obs = obs.serialized();
        let latest = Arc::new(Mutex::new(Latest {
            values: vec![None; sources.len()],
            missing: sources.len(),
            active: sources.len(),
        }));
        for (index, source) in sources.iter().enumerate() {
            if sub.canceled() {
                return;
            }
            let (obs, latest) = (obs.clone(), latest.clone());
            let input = Observer::new(move |n: Notification<T>| match n {
                Notification::Next(v) => {
                    let snapshot: Option<Vec<T>> = {
                        let mut l = latest.lock();
                        if l.values[index].replace(v).is_none() {
                            l.missing -= 1;
                        }
                        (l.missing == 0).then(|| l.values.iter().flatten().cloned().collect())
                    };
                    if let Some(snapshot) = snapshot {
                        obs.next(snapshot);
                    }
                }
                Notification::Error(e) => obs.error(e),
                Notification::Complete => {
                    let finished = {
                        let mut l = latest.lock();
                        l.active -= 1;
                        l.active == 0 || l.values[index].is_none()
                    };
                    if finished {
                        obs.complete();
                    }
                }
            });
            source.run(input, sched.clone(), sub.add_child());
        }
    })
}

impl<T: Item> Observable<Observable<T>> {
    /// Collects the inner streams until this stream completes, then combines
    /// them with [`combine_latest`].
    pub fn combine_latest_all(&self) -> Observable<Vec<T>> {
        let outer = self.clone();
        Observable::create(move |obs: Observer<Vec<T>>, sched: SchedulerRef, sub: Subscriber| {
            let collected: Mutex<Vec<Observable<T>>> = Mutex::new(Vec::new());
            let (o, s, parent) = (obs.clone(), sched.clone(), sub.clone());
            let outer_obs = Observer::new(move |n: Notification<Observable<T>>| match n {
                Notification::Next(inner) => collected.lock().push(inner),
                Notification::Error(e) => o.error(e),
                Notification::Complete => {
                    let inputs = std::mem::take(&mut *collected.lock());
                    combine_latest(inputs).run(o.clone(), s.clone(), parent.add_child());
                }
            });
            outer.run(outer_obs, sched, sub.add_child());
        })
    }
}
