//! The observable type and the subscribe path.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::observable::{Item, Notification, Observer};
use crate::scheduler::{self, SchedulerRef};
use crate::subscriber::{Subscriber, Subscription};

type SubscribeFn<T> = dyn Fn(Observer<T>, SchedulerRef, Subscriber) + Send + Sync + 'static;
type Hook = Arc<dyn Fn(&Subscriber) + Send + Sync + 'static>;

/// A cold, re-subscribable stream of `T`.
///
/// Each subscription runs the subscribe function once with its own observer,
/// scheduler and subscriber.
pub struct Observable<T> {
    subscribe_fn: Arc<SubscribeFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            subscribe_fn: self.subscribe_fn.clone(),
        }
    }
}

impl<T> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}

/// Options of a single [`Observable::subscribe`] call.
///
/// # Example
/// ```
/// use rill::{Observable, Observer, SubscribeOptions, Subscriber, cooperative};
///
/// let parent = Subscriber::new();
/// let opts = SubscribeOptions::new()
///     .with_scheduler(cooperative())
///     .with_subscriber(parent.clone());
///
/// let sub = Observable::from_iter(vec![1, 2, 3]).subscribe(Observer::new(|_| {}), opts);
/// parent.unsubscribe();
/// assert!(sub.canceled());
/// ```
#[derive(Clone, Default)]
pub struct SubscribeOptions {
    scheduler: Option<SchedulerRef>,
    subscriber: Option<Subscriber>,
    on_subscribe: Option<Hook>,
    on_subscribed: Option<Hook>,
}

impl fmt::Debug for SubscribeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscribeOptions")
            .field("scheduler", &self.scheduler.as_ref().map(|s| s.is_concurrent()))
            .field("subscriber", &self.subscriber)
            .finish_non_exhaustive()
    }
}

impl SubscribeOptions {
    /// Default options: fresh cooperative scheduler, new root subscriber.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs the subscription on `scheduler`.
    pub fn with_scheduler(mut self, scheduler: SchedulerRef) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Joins the subscription to `parent`'s cancellation tree.
    pub fn with_subscriber(mut self, parent: Subscriber) -> Self {
        self.subscriber = Some(parent);
        self
    }

    /// Called with the new subscriber before the stream is subscribed.
    pub fn on_subscribe(mut self, f: impl Fn(&Subscriber) + Send + Sync + 'static) -> Self {
        self.on_subscribe = Some(Arc::new(f));
        self
    }

    /// Called with the new subscriber after the subscribe function returned.
    pub fn on_subscribed(mut self, f: impl Fn(&Subscriber) + Send + Sync + 'static) -> Self {
        self.on_subscribed = Some(Arc::new(f));
        self
    }
}

impl<T: Item> Observable<T> {
    /// Builds a stream from its subscribe function.
    ///
    /// The function receives the observer to deliver to, the scheduler to run
    /// work on and the subscriber to watch for cancellation. Deliveries after a
    /// terminal notification or after cancellation are dropped.
    pub fn create(f: impl Fn(Observer<T>, SchedulerRef, Subscriber) + Send + Sync + 'static) -> Self {
        Self {
            subscribe_fn: Arc::new(f),
        }
    }

    /// Subscribes `observer` and returns the subscription handle.
    ///
    /// On a cooperative scheduler nothing runs until the scheduler (or the
    /// returned subscription) is waited on.
    pub fn subscribe(&self, observer: Observer<T>, options: SubscribeOptions) -> Subscription {
        let scheduler = options.scheduler.unwrap_or_else(scheduler::cooperative);
        let subscriber = match options.subscriber {
            Some(parent) => parent.add_child(),
            None => Subscriber::new(),
        };

        if !scheduler.is_concurrent() {
            let drain = scheduler.clone();
            subscriber.on_wait(move || drain.wait());
        }

        if let Some(hook) = &options.on_subscribe {
            hook(&subscriber);
        }
        self.run(observer, scheduler, subscriber.clone());
        if let Some(hook) = &options.on_subscribed {
            hook(&subscriber);
        }
        subscriber
    }

    /// Invokes the subscribe function behind the delivery guard.
    ///
    /// Operators use this for inner subscriptions: no option handling, no
    /// wait override, the caller owns `subscriber`.
    pub(crate) fn run(&self, observer: Observer<T>, scheduler: SchedulerRef, subscriber: Subscriber) {
        if subscriber.canceled() {
            return;
        }
        let guarded = guard(observer, subscriber.clone());
        (self.subscribe_fn)(guarded, scheduler, subscriber);
    }
}

/// Enforces at most one terminal and nothing after terminal or cancel; a
/// terminal notification is forwarded first, then recorded on `subscriber`.
fn guard<T: Item>(observer: Observer<T>, subscriber: Subscriber) -> Observer<T> {
    let stopped = AtomicBool::new(false);
    Observer::new(move |n| {
        if stopped.load(Ordering::Acquire) || subscriber.canceled() {
            return;
        }
        match n {
            Notification::Next(v) => observer.next(v),
            Notification::Error(e) => {
                if stopped.swap(true, Ordering::AcqRel) {
                    return;
                }
                observer.error(e.clone());
                subscriber.done(Some(e));
            }
            Notification::Complete => {
                if stopped.swap(true, Ordering::AcqRel) {
                    return;
                }
                observer.complete();
                subscriber.done(None);
            }
        }
    })
}
