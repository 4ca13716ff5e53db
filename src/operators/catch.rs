//! Catch: continue with a fallback stream after an error.

use std::sync::Arc;

use crate::error::RxError;
use crate::observable::{Item, Notification, Observable, Observer};
use crate::scheduler::SchedulerRef;
use crate::subscriber::Subscriber;

impl<T: Item> Observable<T> {
    /// On error, continues with `fallback` instead of failing.
    pub fn catch(&self, fallback: &Observable<T>) -> Observable<T> {
        let fallback = fallback.clone();
        self.catch_with(move |_| fallback.clone())
    }

    /// On error, continues with the stream `handler` builds from the error.
    ///
    /// # Example
    /// ```
    /// use rill::{Observable, RxError, cooperative};
    ///
    /// let recovered = Observable::from_iter([1, 2])
    ///     .concat_with(&Observable::throw(RxError::failed("boom")))
    ///     .catch_with(|err| Observable::just(if err.is_contract_violation() { -1 } else { 0 }));
    /// assert_eq!(recovered.to_vec(cooperative()).unwrap(), vec![1, 2, 0]);
    /// ```
    pub fn catch_with(
        &self,
        handler: impl Fn(RxError) -> Observable<T> + Send + Sync + 'static,
    ) -> Observable<T> {
        let source = self.clone();
        let handler = Arc::new(handler);
        Observable::create(move |obs: Observer<T>, sched: SchedulerRef, sub: Subscriber| {
            let (o, s, parent, handler) = (obs.clone(), sched.clone(), sub.clone(), handler.clone());
            let observer = Observer::new(move |n| match n {
                Notification::Error(e) => {
                    tracing::debug!(error = %e.as_label(), "switching to fallback stream");
                    handler(e).run(o.clone(), s.clone(), parent.add_child());
                }
                n => o.notify(n),
            });
            source.run(observer, sched, sub.add_child());
        })
    }
}
