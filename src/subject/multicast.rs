//! Multicast / connect: one shared upstream subscription feeding a subject.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::RxError;
use crate::observable::{Item, Observable, SubscribeOptions};
use crate::scheduler::SchedulerRef;
use crate::subject::flavors::Subject;
use crate::subscriber::Subscription;

type Factory<T> = dyn Fn() -> Subject<T> + Send + Sync + 'static;

struct Connection<T> {
    subject: Subject<T>,
    upstream: Option<Subscription>,
}

struct Shared<T> {
    source: Observable<T>,
    factory: Box<Factory<T>>,
    connection: Mutex<Connection<T>>,
}

/// An observable whose upstream runs once, on demand, for every subscriber.
///
/// # Example
/// ```
/// use rill::{Observable, cooperative};
///
/// let shared = Observable::from_iter(vec![1, 2, 3]).publish_replay(8, std::time::Duration::ZERO);
/// shared.connect(cooperative()).wait().unwrap();
/// assert_eq!(shared.observable().to_vec(cooperative()).unwrap(), vec![1, 2, 3]);
/// ```
pub struct Connectable<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Connectable<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T: Item> Connectable<T> {
    fn new(source: Observable<T>, factory: Box<Factory<T>>) -> Self {
        let subject = factory();
        Self {
            shared: Arc::new(Shared {
                source,
                factory,
                connection: Mutex::new(Connection {
                    subject,
                    upstream: None,
                }),
            }),
        }
    }

    /// Consumer face of the current subject.
    pub fn observable(&self) -> Observable<T> {
        let shared = self.shared.clone();
        Observable::create(move |obs, sched, sub| {
            let subject = shared.connection.lock().subject.clone();
            subject.observable().run(obs, sched, sub);
        })
    }

    /// Subscribes the subject to the upstream on `scheduler`.
    ///
    /// While connected, returns the live upstream subscription. Once the
    /// subject has terminated, a fresh subject is built for the new connection.
    /// The upstream is subscribed without holding the connection lock, so a
    /// source may reach back into this connectable while it subscribes.
    pub fn connect(&self, scheduler: SchedulerRef) -> Subscription {
        let subject = {
            let mut conn = self.shared.connection.lock();
            if let Some(up) = conn.upstream.as_ref().filter(|up| up.subscribed()) {
                return up.clone();
            }
            if conn.subject.is_closed() {
                conn.subject = (self.shared.factory)();
            }
            conn.subject.clone()
        };

        let shared = self.shared.clone();
        let up = self.shared.source.subscribe(
            subject.observer(),
            SubscribeOptions::new()
                .with_scheduler(scheduler)
                .on_subscribe(move |up| {
                    let mut conn = shared.connection.lock();
                    if conn.upstream.as_ref().is_some_and(|live| live.subscribed()) {
                        // Another connect won the race.
                        up.unsubscribe();
                    } else {
                        conn.upstream = Some(up.clone());
                    }
                }),
        );
        if up.canceled() && matches!(up.error(), Some(RxError::Unsubscribed)) {
            if let Some(live) = self.shared.connection.lock().upstream.clone() {
                return live;
            }
        }
        up
    }

    /// Cancels the upstream subscription, if any.
    pub fn disconnect(&self) {
        let up = self.shared.connection.lock().upstream.take();
        if let Some(up) = up {
            up.unsubscribe();
        }
    }

    /// Connects when the `count`-th subscriber arrives (`0` is treated as `1`).
    ///
    /// The connection runs on that subscriber's scheduler.
    pub fn auto_connect(&self, count: usize) -> Observable<T> {
        let count = count.max(1);
        let arrived = Arc::new(AtomicUsize::new(0));
        let this = self.clone();
        let shared = self.observable();
        Observable::create(move |obs, sched: SchedulerRef, sub| {
            shared.run(obs, sched.clone(), sub);
            if arrived.fetch_add(1, Ordering::AcqRel) + 1 == count {
                this.connect(sched);
            }
        })
    }

    /// Connects on the first subscriber and disconnects when the last one leaves.
    pub fn ref_count(&self) -> Observable<T> {
        let refs = Arc::new(Mutex::new(0usize));
        let this = self.clone();
        let shared = self.observable();
        Observable::create(move |obs, sched: SchedulerRef, sub| {
            let first = {
                let mut n = refs.lock();
                *n += 1;
                *n == 1
            };
            shared.run(obs, sched.clone(), sub.clone());
            if first {
                this.connect(sched);
            }

            let (this, refs) = (this.clone(), refs.clone());
            sub.on_unsubscribe(move || {
                let last = {
                    let mut n = refs.lock();
                    *n = n.saturating_sub(1);
                    *n == 0
                };
                if last {
                    this.disconnect();
                }
            });
        })
    }
}

impl<T: Item> Observable<T> {
    /// Shares this stream through subjects built by `factory`.
    pub fn multicast(&self, factory: impl Fn() -> Subject<T> + Send + Sync + 'static) -> Connectable<T> {
        Connectable::new(self.clone(), Box::new(factory))
    }

    /// Multicast through a plain subject.
    pub fn publish(&self) -> Connectable<T> {
        self.multicast(|| Subject::publish(0))
    }

    /// Multicast through a replay subject.
    pub fn publish_replay(&self, keep: usize, age: Duration) -> Connectable<T> {
        self.multicast(move || Subject::replay(keep, age))
    }

    /// Multicast through a behavior subject seeded with `initial`.
    pub fn publish_behavior(&self, initial: T) -> Connectable<T> {
        self.multicast(move || Subject::behavior(initial.clone()))
    }

    /// Multicast through a last-value subject.
    pub fn publish_last(&self) -> Connectable<T> {
        self.multicast(Subject::last_value)
    }
}
