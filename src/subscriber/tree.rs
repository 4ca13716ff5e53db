//! Subscriber handle and its cancellation tree.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use slab::Slab;
use tokio_util::sync::CancellationToken;

use crate::error::RxError;
use crate::state::{AtomicState, SubscriberState};

type Callback = Box<dyn FnOnce() + Send + 'static>;
type WaitOverride = Arc<dyn Fn() + Send + Sync + 'static>;

/// How a subscription ended, as recorded by [`Subscriber::done`].
#[derive(Clone, Debug)]
enum Outcome {
    Completed,
    Failed(RxError),
}

struct Inner {
    state: AtomicState<SubscriberState>,
    callbacks: Mutex<Slab<Callback>>,
    outcome: Mutex<Option<Outcome>>,
    on_wait: Mutex<Option<WaitOverride>>,
    canceled: CancellationToken,
}

/// Cloneable lifecycle handle of one subscription.
///
/// All clones share one state; canceling any clone cancels them all.
#[derive(Clone)]
pub struct Subscriber {
    inner: Arc<Inner>,
}

/// The handle returned by `subscribe` and `connect`.
pub type Subscription = Subscriber;

impl Default for Subscriber {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("state", &self.inner.state.load())
            .field("callbacks", &self.inner.callbacks.lock().len())
            .finish()
    }
}

impl Subscriber {
    /// Creates an active root subscriber.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: AtomicState::new(SubscriberState::Active),
                callbacks: Mutex::new(Slab::new()),
                outcome: Mutex::new(None),
                on_wait: Mutex::new(None),
                canceled: CancellationToken::new(),
            }),
        }
    }

    /// Returns `true` while the subscriber is active.
    #[inline]
    pub fn subscribed(&self) -> bool {
        self.inner.state.is(SubscriberState::Active)
    }

    /// Returns `true` once cancellation started.
    #[inline]
    pub fn canceled(&self) -> bool {
        !self.subscribed()
    }

    /// Cancels the subscriber and its subtree.
    ///
    /// Idempotent: only the first call runs the callbacks.
    pub fn unsubscribe(&self) {
        if self
            .inner
            .state
            .transition(SubscriberState::Active, SubscriberState::Canceling)
            .is_err()
        {
            return;
        }

        let callbacks = std::mem::take(&mut *self.inner.callbacks.lock());
        for (_, cb) in callbacks {
            cb();
        }
        self.inner.on_wait.lock().take();

        let _ = self
            .inner
            .state
            .transition(SubscriberState::Canceling, SubscriberState::Canceled);
        self.inner.canceled.cancel();
    }

    /// Registers `cb` to run when the subscriber is canceled.
    ///
    /// Runs `cb` immediately if cancellation already started.
    pub fn on_unsubscribe(&self, cb: impl FnOnce() + Send + 'static) {
        if let Err(cb) = self.register(Box::new(cb)) {
            cb();
        }
    }

    /// Creates a child that is canceled together with `self`.
    ///
    /// A child created under a canceled parent starts canceled. A child that
    /// ends first removes its entry from the parent.
    pub fn add_child(&self) -> Subscriber {
        let child = Subscriber::new();
        let weak: Weak<Inner> = Arc::downgrade(&child.inner);
        let cancel_child: Callback = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                Subscriber { inner }.unsubscribe();
            }
        });
        match self.register(cancel_child) {
            Ok(key) => {
                let parent: Weak<Inner> = Arc::downgrade(&self.inner);
                child.on_unsubscribe(move || {
                    if let Some(inner) = parent.upgrade() {
                        inner.callbacks.lock().try_remove(key);
                    }
                });
            }
            Err(cancel_child) => cancel_child(),
        }
        child
    }

    /// Stores `cb` while active; hands it back once cancellation started.
    fn register(&self, cb: Callback) -> Result<usize, Callback> {
        let mut callbacks = self.inner.callbacks.lock();
        if self.subscribed() {
            Ok(callbacks.insert(cb))
        } else {
            Err(cb)
        }
    }

    /// Number of pending cancellation callbacks.
    pub(crate) fn pending_callbacks(&self) -> usize {
        self.inner.callbacks.lock().len()
    }

    /// Records how the subscription ended, then cancels it.
    ///
    /// `None` means normal completion. Ignored once canceled.
    pub fn done(&self, err: Option<RxError>) {
        if !self.subscribed() {
            return;
        }
        {
            let mut outcome = self.inner.outcome.lock();
            if outcome.is_none() {
                *outcome = Some(match err {
                    None => Outcome::Completed,
                    Some(e) => Outcome::Failed(e),
                });
            }
        }
        self.unsubscribe();
    }

    /// Returns the terminal error.
    ///
    /// - `None` while active, or after normal completion
    /// - `Some(e)` after `done(Some(e))`
    /// - `Some(RxError::Unsubscribed)` after a cancel without `done`
    pub fn error(&self) -> Option<RxError> {
        if self.subscribed() {
            return None;
        }
        match &*self.inner.outcome.lock() {
            None => Some(RxError::Unsubscribed),
            Some(Outcome::Completed) => None,
            Some(Outcome::Failed(e)) => Some(e.clone()),
        }
    }

    /// Installs a wait override, run by [`wait`](Self::wait) before it blocks.
    ///
    /// Cooperative subscriptions use it to drain their scheduler on the waiting thread.
    pub fn on_wait(&self, f: impl Fn() + Send + Sync + 'static) {
        *self.inner.on_wait.lock() = Some(Arc::new(f));
    }

    /// Blocks until the subscriber is canceled and reports how it ended.
    ///
    /// Do not call from inside an async runtime worker; use
    /// [`cancelled`](Self::cancelled) there.
    ///
    /// # Errors
    ///
    /// - the recorded stream error if it failed
    /// - [`RxError::Unsubscribed`] if it was canceled without completing
    pub fn wait(&self) -> Result<(), RxError> {
        let hook = self.inner.on_wait.lock().clone();
        if let Some(hook) = hook {
            hook();
        }
        if !self.inner.canceled.is_cancelled() {
            futures::executor::block_on(self.inner.canceled.cancelled());
        }
        match self.error() {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Resolves once cancellation has finished running callbacks.
    pub async fn cancelled(&self) {
        self.inner.canceled.cancelled().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counter() -> (Arc<AtomicUsize>, impl FnOnce() + Send + 'static) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (hits, move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let sub = Subscriber::new();
        let (hits, cb) = counter();
        sub.on_unsubscribe(cb);
        for _ in 0..5 {
            sub.unsubscribe();
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(sub.canceled());
    }

    #[test]
    fn test_racing_unsubscribes_fire_callbacks_once() {
        let sub = Subscriber::new();
        let mut counters = Vec::new();
        for _ in 0..10 {
            let (hits, cb) = counter();
            sub.on_unsubscribe(cb);
            counters.push(hits);
        }
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let s = sub.clone();
                std::thread::spawn(move || s.unsubscribe())
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        for hits in counters {
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn test_callback_after_cancel_runs_immediately() {
        let sub = Subscriber::new();
        sub.unsubscribe();
        let (hits, cb) = counter();
        sub.on_unsubscribe(cb);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_cancellation_propagates_down_only() {
        let parent = Subscriber::new();
        let child = parent.add_child();
        let grandchild = child.add_child();

        grandchild.unsubscribe();
        assert!(child.subscribed());
        assert!(parent.subscribed());

        let sibling = child.add_child();
        parent.unsubscribe();
        assert!(child.canceled());
        assert!(sibling.canceled());
    }

    #[test]
    fn test_finished_children_leave_parent() {
        let parent = Subscriber::new();
        for _ in 0..10_000 {
            parent.add_child().unsubscribe();
        }
        assert_eq!(parent.pending_callbacks(), 0);

        let live = parent.add_child();
        let done = parent.add_child();
        done.done(None);
        assert_eq!(parent.pending_callbacks(), 1);
        parent.unsubscribe();
        assert!(live.canceled());
        assert_eq!(parent.pending_callbacks(), 0);
    }

    #[test]
    fn test_reused_key_keeps_new_child() {
        let parent = Subscriber::new();
        let first = parent.add_child();
        first.unsubscribe();
        let second = parent.add_child();
        first.unsubscribe();
        parent.unsubscribe();
        assert!(second.canceled());
    }

    #[test]
    fn test_child_of_canceled_parent_starts_canceled() {
        let parent = Subscriber::new();
        parent.unsubscribe();
        let child = parent.add_child();
        assert!(child.canceled());
        assert!(matches!(child.error(), Some(RxError::Unsubscribed)));
    }

    #[test]
    fn test_error_is_none_while_active() {
        let sub = Subscriber::new();
        assert!(sub.error().is_none());
        sub.done(Some(RxError::failed("x")));
        assert_eq!(sub.error().map(|e| e.to_string()), Some("stream failed: x".into()));
    }

    #[test]
    fn test_wait_outcomes() {
        let completed = Subscriber::new();
        completed.done(None);
        assert!(completed.wait().is_ok());

        let failed = Subscriber::new();
        failed.done(Some(RxError::failed("boom")));
        assert!(matches!(failed.wait(), Err(RxError::Failed { .. })));

        let canceled = Subscriber::new();
        canceled.unsubscribe();
        assert!(matches!(canceled.wait(), Err(RxError::Unsubscribed)));
    }

    #[test]
    fn test_done_after_cancel_is_ignored() {
        let sub = Subscriber::new();
        sub.unsubscribe();
        sub.done(None);
        assert!(matches!(sub.wait(), Err(RxError::Unsubscribed)));
    }

    #[test]
    fn test_wait_blocks_until_canceled_elsewhere() {
        let sub = Subscriber::new();
        let s = sub.clone();
        let t = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            s.done(None);
        });
        assert!(sub.wait().is_ok());
        t.join().unwrap();
    }

    #[test]
    fn test_wait_override_runs_first() {
        let sub = Subscriber::new();
        let s = sub.clone();
        sub.on_wait(move || s.done(None));
        assert!(sub.wait().is_ok());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_after_callbacks() {
        let sub = Subscriber::new();
        let (hits, cb) = counter();
        sub.on_unsubscribe(cb);
        let s = sub.clone();
        tokio::spawn(async move { s.unsubscribe() });
        sub.cancelled().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
