//! Subject flavors over the one ring buffer.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::SubjectConfig;
use crate::observable::{Item, Notification, Observable, Observer};
use crate::subject::ring::RingBuffer;

/// Hot multicast stream with an explicit producer face and consumer face.
pub struct Subject<T> {
    ring: Arc<RingBuffer<T>>,
    observer: Observer<T>,
    observable: Observable<T>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            ring: self.ring.clone(),
            observer: self.observer.clone(),
            observable: self.observable.clone(),
        }
    }
}

impl<T: Item> std::fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subject").field("ring", &self.ring).finish()
    }
}

/// Builds a subject from `config` and returns its two faces.
///
/// # Example
/// ```
/// use rill::{SubjectConfig, make_subject, cooperative};
///
/// let (tx, rx) = make_subject::<u32>(SubjectConfig::default().with_keep(2));
/// for v in 0..5 {
///     tx.next(v);
/// }
/// tx.complete();
/// assert_eq!(rx.to_vec(cooperative()).unwrap(), vec![3, 4]);
/// ```
pub fn make_subject<T: Item>(config: SubjectConfig) -> (Observer<T>, Observable<T>) {
    Subject::new(config).into_parts()
}

impl<T: Item> Subject<T> {
    /// Builds a subject from an explicit configuration.
    pub fn new(config: SubjectConfig) -> Self {
        let ring = Arc::new(RingBuffer::new(&config));

        let producer = ring.clone();
        let observer = Observer::new(move |n| match n {
            Notification::Next(v) => producer.next(v),
            Notification::Error(e) => producer.error(e),
            Notification::Complete => producer.complete(),
        });

        let consumer = ring.clone();
        let observable = Observable::create(move |obs, sched, sub| consumer.subscribe(obs, sched, sub));

        Self {
            ring,
            observer,
            observable,
        }
    }

    /// Plain multicast: subscribers see only what is emitted after they subscribe.
    ///
    /// `capacity = 0` uses the default ring size.
    pub fn publish(capacity: usize) -> Self {
        Self::new(SubjectConfig::default().with_capacity(capacity))
    }

    /// Replays the last `keep` items younger than `age` (`0s` = any age) to each new subscriber.
    pub fn replay(keep: usize, age: Duration) -> Self {
        Self::new(SubjectConfig::default().with_keep(keep).with_age(age))
    }

    /// Holds a current value, starting with `initial`; new subscribers get it first.
    pub fn behavior(initial: T) -> Self {
        let subject = Self::new(SubjectConfig::default().with_keep(1));
        subject.ring.next(initial);
        subject
    }

    /// Delivers only the last value, at completion. An error is forwarded without a value.
    pub fn last_value() -> Self {
        let mut subject = Self::new(SubjectConfig::default().with_keep(1));
        let replay = subject.observable.clone();
        subject.observable = Observable::create(move |obs: Observer<T>, sched, sub| {
            let last: Mutex<Option<T>> = Mutex::new(None);
            let inner = Observer::new(move |n| match n {
                Notification::Next(v) => *last.lock() = Some(v),
                Notification::Error(e) => obs.error(e),
                Notification::Complete => {
                    if let Some(v) = last.lock().take() {
                        obs.next(v);
                    }
                    obs.complete();
                }
            });
            replay.run(inner, sched, sub);
        });
        subject
    }

    /// Producer face.
    pub fn observer(&self) -> Observer<T> {
        self.observer.clone()
    }

    /// Consumer face.
    pub fn observable(&self) -> Observable<T> {
        self.observable.clone()
    }

    /// Splits into `(observer, observable)`.
    pub fn into_parts(self) -> (Observer<T>, Observable<T>) {
        (self.observer, self.observable)
    }

    /// Backing buffer, for diagnostics.
    pub fn buffer(&self) -> &Arc<RingBuffer<T>> {
        &self.ring
    }

    /// Returns `true` once the subject received its terminal notification.
    pub fn is_closed(&self) -> bool {
        self.ring.is_closed()
    }
}
