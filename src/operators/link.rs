//! # Link: one inner stream of a switch.
//!
//! A link forwards one inner stream's values downstream and sequences its own
//! cancellation against in-flight deliveries, so the next inner stream is
//! subscribed only after this one has gone quiet.
//!
//! ```text
//! subscribe:  Unsubscribed ─► Subscribing ─► run(inner) ─► Idle
//! observe:    Idle ─► Busy ─► forward ─► Idle
//!                        ├─► Errored     (error forwarded)
//!                        └─► Completing ─► fire ─► Complete
//! cancel(cb): latch Unset ─► Setting ─► Set; unsubscribe inner; then
//!             Unsubscribed | Idle       ─► Completing ─► fire
//!             Subscribing | Busy        ─► Canceled   (the in-flight side fires)
//!             Errored | Completing | Complete ─► fire now
//! fire:       take callback (once) ─► run it ─► Completing ─► Complete
//! ```
//!
//! ## Rules
//! - The latch arms once; a second `cancel` is ignored.
//! - The callback runs at most once, from whichever side reaches a settled state.
//! - A value arriving while the link is busy, or synchronously from inside the
//!   inner subscribe call, is a reentrant delivery: the downstream receives
//!   [`RxError::ObserverBusy`]. A value from another thread during subscribe
//!   waits for the subscribe call to return.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::error::RxError;
use crate::observable::{Item, Notification, Observable, Observer};
use crate::scheduler::SchedulerRef;
use crate::state::{AtomicState, LatchState, LinkState};
use crate::subscriber::Subscriber;

type Callback = Box<dyn FnOnce() + Send + 'static>;
type CompleteHook = Box<dyn Fn() + Send + Sync + 'static>;

struct LinkInner<T> {
    state: AtomicState<LinkState>,
    latch: AtomicState<LatchState>,
    callback: Mutex<Option<Callback>>,
    subscribing_on: Mutex<Option<ThreadId>>,
    downstream: Observer<T>,
    subscriber: Subscriber,
    on_complete: CompleteHook,
}

/// State machine wrapping one inner subscription.
pub struct Link<T> {
    inner: Arc<LinkInner<T>>,
}

impl<T> Clone for Link<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Link<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("state", &self.inner.state)
            .field("latch", &self.inner.latch)
            .finish()
    }
}

impl<T: Item> Link<T> {
    /// Creates a link delivering values and errors to `downstream`.
    ///
    /// `subscriber` is the inner subscription; `on_complete` runs when the inner
    /// stream completes normally.
    pub fn new(
        downstream: Observer<T>,
        subscriber: Subscriber,
        on_complete: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(LinkInner {
                state: AtomicState::new(LinkState::Unsubscribed),
                latch: AtomicState::new(LatchState::Unset),
                callback: Mutex::new(None),
                subscribing_on: Mutex::new(None),
                downstream,
                subscriber,
                on_complete: Box::new(on_complete),
            }),
        }
    }

    /// Current state.
    pub fn state(&self) -> LinkState {
        self.inner.state.load()
    }

    /// Subscribes the inner stream.
    ///
    /// # Errors
    ///
    /// [`RxError::AlreadySubscribed`] if the link left `Unsubscribed`; the
    /// downstream receives the same error.
    pub fn subscribe(&self, source: &Observable<T>, scheduler: SchedulerRef) -> Result<(), RxError> {
        if self
            .inner
            .state
            .transition(LinkState::Unsubscribed, LinkState::Subscribing)
            .is_err()
        {
            // A link canceled before it ever subscribed is quietly finished.
            if self.state().is_settled() {
                return Ok(());
            }
            self.inner.downstream.error(RxError::AlreadySubscribed);
            return Err(RxError::AlreadySubscribed);
        }

        *self.inner.subscribing_on.lock() = Some(thread::current().id());
        let link = self.clone();
        source.run(
            Observer::new(move |n| link.observe(n)),
            scheduler,
            self.inner.subscriber.clone(),
        );
        *self.inner.subscribing_on.lock() = None;

        if let Err(LinkState::Canceled) = self
            .inner
            .state
            .transition(LinkState::Subscribing, LinkState::Idle)
        {
            self.finish_canceled();
        }
        Ok(())
    }

    /// Handles one notification of the inner stream.
    pub fn observe(&self, n: Notification<T>) {
        let mut entered = self.inner.state.transition(LinkState::Idle, LinkState::Busy);
        while let Err(LinkState::Subscribing) = entered {
            if *self.inner.subscribing_on.lock() == Some(thread::current().id()) {
                break;
            }
            thread::yield_now();
            entered = self.inner.state.transition(LinkState::Idle, LinkState::Busy);
        }
        match entered {
            Ok(()) => {}
            Err(LinkState::Busy) | Err(LinkState::Subscribing) => {
                self.inner.downstream.error(RxError::ObserverBusy);
                return;
            }
            Err(_) => return,
        }

        match n {
            Notification::Next(v) => {
                self.inner.downstream.next(v);
                if let Err(LinkState::Canceled) = self
                    .inner
                    .state
                    .transition(LinkState::Busy, LinkState::Idle)
                {
                    self.finish_canceled();
                }
            }
            Notification::Error(e) => {
                match self.inner.state.transition(LinkState::Busy, LinkState::Errored) {
                    Ok(()) => self.inner.downstream.error(e),
                    Err(LinkState::Canceled) => self.finish_canceled(),
                    Err(_) => {}
                }
            }
            Notification::Complete => {
                match self
                    .inner
                    .state
                    .transition(LinkState::Busy, LinkState::Completing)
                {
                    Ok(()) => {
                        (self.inner.on_complete)();
                        self.fire();
                    }
                    Err(LinkState::Canceled) => self.finish_canceled(),
                    Err(_) => {}
                }
            }
        }
    }

    /// Cancels the inner subscription and runs `callback` once the link is quiet.
    ///
    /// Runs `callback` synchronously if the link already settled. Only the first
    /// call arms the latch.
    pub fn cancel(&self, callback: impl FnOnce() + Send + 'static) {
        if self
            .inner
            .latch
            .transition(LatchState::Unset, LatchState::Setting)
            .is_err()
        {
            return;
        }
        *self.inner.callback.lock() = Some(Box::new(callback));
        let _ = self.inner.latch.transition(LatchState::Setting, LatchState::Set);

        self.inner.subscriber.unsubscribe();

        loop {
            let state = self.state();
            let next = match state {
                LinkState::Unsubscribed | LinkState::Idle => LinkState::Completing,
                LinkState::Subscribing | LinkState::Busy => LinkState::Canceled,
                LinkState::Canceled => return,
                LinkState::Errored | LinkState::Completing | LinkState::Complete => {
                    self.fire();
                    return;
                }
            };
            if self.inner.state.transition(state, next).is_ok() {
                if next == LinkState::Completing {
                    self.fire();
                }
                return;
            }
        }
    }

    /// The in-flight side observed a cancel: settle and fire.
    fn finish_canceled(&self) {
        if self
            .inner
            .state
            .transition(LinkState::Canceled, LinkState::Completing)
            .is_ok()
        {
            self.fire();
        }
    }

    fn fire(&self) {
        if self.inner.latch.is(LatchState::Set) {
            let callback = self.inner.callback.lock().take();
            if let Some(cb) = callback {
                cb();
            }
        }
        let _ = self
            .inner
            .state
            .transition(LinkState::Completing, LinkState::Complete);
    }
}
