//! Notifications and the observer sink.

use std::cell::Cell;
use std::fmt;
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::error::RxError;

/// One signal travelling from a stream to its observer.
#[derive(Clone, Debug)]
pub enum Notification<T> {
    /// A value.
    Next(T),
    /// Terminal failure.
    Error(RxError),
    /// Terminal success.
    Complete,
}

impl<T> Notification<T> {
    /// Returns `true` for `Error` and `Complete`.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Notification::Next(_))
    }
}

type Sink<T> = dyn Fn(Notification<T>) + Send + Sync + 'static;

/// Cloneable next/error/complete sink.
pub struct Observer<T> {
    sink: Arc<Sink<T>>,
}

impl<T> Clone for Observer<T> {
    fn clone(&self) -> Self {
        Self {
            sink: self.sink.clone(),
        }
    }
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Observer<T> {
    /// Wraps a function receiving every notification.
    pub fn new(f: impl Fn(Notification<T>) + Send + Sync + 'static) -> Self {
        Self { sink: Arc::new(f) }
    }

    /// Builds an observer from three callbacks.
    pub fn from_callbacks(
        on_next: impl Fn(T) + Send + Sync + 'static,
        on_error: impl Fn(RxError) + Send + Sync + 'static,
        on_complete: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self::new(move |n| match n {
            Notification::Next(v) => on_next(v),
            Notification::Error(e) => on_error(e),
            Notification::Complete => on_complete(),
        })
    }

    /// Delivers one notification.
    #[inline]
    pub fn notify(&self, n: Notification<T>) {
        (self.sink)(n)
    }

    /// Delivers a value.
    #[inline]
    pub fn next(&self, value: T) {
        self.notify(Notification::Next(value))
    }

    /// Delivers a terminal error.
    #[inline]
    pub fn error(&self, err: RxError) {
        self.notify(Notification::Error(err))
    }

    /// Delivers terminal completion.
    #[inline]
    pub fn complete(&self) {
        self.notify(Notification::Complete)
    }

    /// Returns an observer that serializes deliveries from concurrent callers
    /// and drops everything after the first terminal notification.
    ///
    /// The lock is reentrant, so a delivery that synchronously triggers another
    /// delivery on the same thread does not deadlock.
    pub fn serialized(self) -> Self {
        let done = ReentrantMutex::new(Cell::new(false));
        Self::new(move |n| {
            let done = done.lock();
            if done.get() {
                return;
            }
            if n.is_terminal() {
                done.set(true);
            }
            self.notify(n);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Observer<i32>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        let obs = Observer::new(move |n: Notification<i32>| {
            l.lock().push(match n {
                Notification::Next(v) => v.to_string(),
                Notification::Error(e) => format!("error:{e}"),
                Notification::Complete => "complete".to_string(),
            })
        });
        (log, obs)
    }

    #[test]
    fn test_from_callbacks_routes_each_kind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let (a, b, c) = (log.clone(), log.clone(), log.clone());
        let obs = Observer::from_callbacks(
            move |v: i32| a.lock().push(format!("next {v}")),
            move |e| b.lock().push(format!("error {e}")),
            move || c.lock().push("complete".to_string()),
        );
        obs.next(1);
        obs.error(RxError::failed("x"));
        obs.complete();
        assert_eq!(
            *log.lock(),
            vec!["next 1", "error stream failed: x", "complete"]
        );
    }

    #[test]
    fn test_serialized_drops_after_terminal() {
        let (log, obs) = recorder();
        let obs = obs.serialized();
        obs.next(1);
        obs.complete();
        obs.next(2);
        obs.error(RxError::failed("late"));
        obs.complete();
        assert_eq!(*log.lock(), vec!["1", "complete"]);
    }

    #[test]
    fn test_serialized_is_safe_across_threads() {
        let (log, obs) = recorder();
        let obs = obs.serialized();
        let threads: Vec<_> = (0..4)
            .map(|t| {
                let o = obs.clone();
                std::thread::spawn(move || {
                    for i in 0..250 {
                        o.next(t * 1000 + i);
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        obs.complete();
        let log = log.lock();
        assert_eq!(log.len(), 1001);
        assert_eq!(log.last().map(String::as_str), Some("complete"));
    }

    #[test]
    fn test_serialized_allows_reentrant_delivery() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<Mutex<Option<Observer<i32>>>> = Arc::new(Mutex::new(None));
        let (l, s) = (log.clone(), slot.clone());
        let obs = Observer::new(move |n: Notification<i32>| {
            if let Notification::Next(v) = n {
                l.lock().push(v);
                if v == 1 {
                    let again = s.lock().clone();
                    if let Some(o) = again {
                        o.next(2);
                    }
                }
            }
        })
        .serialized();
        *slot.lock() = Some(obs.clone());
        obs.next(1);
        assert_eq!(*log.lock(), vec![1, 2]);
    }
}
