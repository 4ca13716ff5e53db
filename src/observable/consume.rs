//! Consumers: callback subscribe, blocking collect, async stream.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::stream::{self, BoxStream, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::RxError;
use crate::observable::{Item, Notification, Observable, Observer, SubscribeOptions};
use crate::scheduler::SchedulerRef;
use crate::subscriber::Subscription;

impl<T: Item> Observable<T> {
    /// Subscribes three callbacks.
    pub fn subscribe_fn(
        &self,
        on_next: impl Fn(T) + Send + Sync + 'static,
        on_error: impl Fn(RxError) + Send + Sync + 'static,
        on_complete: impl Fn() + Send + Sync + 'static,
        options: SubscribeOptions,
    ) -> Subscription {
        self.subscribe(Observer::from_callbacks(on_next, on_error, on_complete), options)
    }

    /// Subscribes on `scheduler`, waits for termination and returns every value.
    ///
    /// # Errors
    ///
    /// Returns the stream's terminal error, or [`RxError::Unsubscribed`] if the
    /// subscription was canceled from elsewhere.
    pub fn to_vec(&self, scheduler: SchedulerRef) -> Result<Vec<T>, RxError> {
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = values.clone();
        let sub = self.subscribe(
            Observer::new(move |n| {
                if let Notification::Next(v) = n {
                    sink.lock().push(v);
                }
            }),
            SubscribeOptions::new().with_scheduler(scheduler),
        );
        sub.wait()?;
        let mut values = values.lock();
        Ok(std::mem::take(&mut *values))
    }

    /// Converts the stream into an async [`Stream`] of results.
    ///
    /// The stream ends after the terminal notification; an error arrives as the
    /// last item. Dropping it cancels the subscription.
    ///
    /// Requires a concurrent scheduler: nobody would drain a cooperative one while
    /// the consumer awaits. Given a cooperative scheduler the stream yields a
    /// single [`RxError::ConcurrentSchedulerRequired`] and ends.
    pub fn into_stream(self, scheduler: SchedulerRef) -> RxStream<T> {
        if !scheduler.is_concurrent() {
            tracing::warn!(operator = "into_stream", "cooperative scheduler rejected");
            let err = RxError::ConcurrentSchedulerRequired {
                operator: "into_stream",
            };
            return RxStream {
                inner: stream::once(async move { Err(err) }).boxed(),
                subscription: None,
            };
        }

        let (tx, mut rx) = mpsc::unbounded_channel();
        // Dropping the sender on the terminal notification ends the stream.
        let tx = Mutex::new(Some(tx));
        let sub = self.subscribe(
            Observer::new(move |n| match n {
                Notification::Next(v) => {
                    if let Some(tx) = tx.lock().as_ref() {
                        let _ = tx.send(Ok(v));
                    }
                }
                Notification::Error(e) => {
                    if let Some(tx) = tx.lock().take() {
                        let _ = tx.send(Err(e));
                    }
                }
                Notification::Complete => {
                    tx.lock().take();
                }
            }),
            SubscribeOptions::new().with_scheduler(scheduler),
        );
        RxStream {
            inner: stream::poll_fn(move |cx| rx.poll_recv(cx)).boxed(),
            subscription: Some(sub),
        }
    }
}

/// Async view of an [`Observable`], produced by [`Observable::into_stream`].
pub struct RxStream<T> {
    inner: BoxStream<'static, Result<T, RxError>>,
    subscription: Option<Subscription>,
}

impl<T> Stream for RxStream<T> {
    type Item = Result<T, RxError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl<T> Drop for RxStream<T> {
    fn drop(&mut self) {
        if let Some(sub) = self.subscription.take() {
            sub.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{concurrent, cooperative};
    use std::time::Duration;

    #[test]
    fn test_subscribe_fn_routes_callbacks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b) = (log.clone(), log.clone());
        let sub = Observable::from_iter([1, 2]).subscribe_fn(
            move |v| a.lock().push(v),
            |_| {},
            move || b.lock().push(0),
            SubscribeOptions::new(),
        );
        assert!(sub.wait().is_ok());
        assert_eq!(*log.lock(), vec![1, 2, 0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_into_stream_on_concurrent_scheduler() {
        let items: Vec<_> = Observable::from_iter(1..=4)
            .into_stream(concurrent())
            .collect()
            .await;
        let items: Vec<i32> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(items, vec![1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_into_stream_ends_after_error() {
        let items: Vec<_> = Observable::from_iter([1])
            .concat_with(&Observable::throw(RxError::failed("late")))
            .into_stream(concurrent())
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Ok(1)));
        assert!(matches!(items[1], Err(RxError::Failed { .. })));
    }

    #[tokio::test]
    async fn test_into_stream_rejects_cooperative_scheduler() {
        let items: Vec<_> = Observable::from_iter(1..=4)
            .into_stream(cooperative())
            .collect()
            .await;
        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0],
            Err(RxError::ConcurrentSchedulerRequired {
                operator: "into_stream"
            })
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropping_stream_cancels_subscription() {
        let mut stream = Observable::interval(Duration::from_millis(1)).into_stream(concurrent());
        assert!(matches!(stream.next().await, Some(Ok(0))));
        let sub = stream.subscription.clone().unwrap();
        drop(stream);
        assert!(sub.canceled());
    }
}
