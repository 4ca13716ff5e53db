//! # Tagged lifecycle states with lock-free transitions.
//!
//! Every lifecycle in the engine (subject buffer, subscription slot, subscriber,
//! switch link and its completion latch) is an enum implementing [`StateMachine`].
//! [`AtomicState`] stores the tag in an `AtomicU8` and only ever applies a
//! compare-and-swap for a transition the machine declares legal.
//!
//! ## Machines
//! ```text
//! BufferState      Active ─► Closing ─► Closed
//! SlotState        Free ─► Active ─► Closed
//!                   ▲        │          │
//!                   └────────┴──────────┘ (release)
//! SubscriberState  Active ─► Canceling ─► Canceled
//! LatchState       Unset ─► Setting ─► Set
//! LinkState        Unsubscribed ─► Subscribing ─► Idle ◄─► Busy
//!                        │              │          │        ├─► Errored
//!                        │              ▼          │        ├─► Canceled ─► Completing
//!                        └──────────► Completing ◄─┘        └─► Completing
//!                                       └─► Complete
//! ```
//!
//! ## Rules
//! - Transitions are monotonic except `Idle ⇄ Busy` and slot reuse (`→ Free`).
//! - An illegal request is rejected without touching the stored state.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};

/// A finite set of tagged states with a transition relation.
pub trait StateMachine: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    /// Every state of the machine (used for exhaustive checks).
    const ALL: &'static [Self];

    /// Encodes the state as its tag.
    fn to_u8(self) -> u8;

    /// Decodes a tag previously produced by [`StateMachine::to_u8`].
    fn from_u8(raw: u8) -> Self;

    /// Returns `true` if `self → to` is a legal transition.
    fn can_transition(self, to: Self) -> bool;
}

/// Atomic cell holding one state of machine `S`.
pub struct AtomicState<S> {
    raw: AtomicU8,
    _machine: PhantomData<S>,
}

impl<S: StateMachine> AtomicState<S> {
    /// Creates a cell in `initial`.
    pub fn new(initial: S) -> Self {
        Self {
            raw: AtomicU8::new(initial.to_u8()),
            _machine: PhantomData,
        }
    }

    /// Returns the current state.
    #[inline]
    pub fn load(&self) -> S {
        S::from_u8(self.raw.load(Ordering::Acquire))
    }

    /// Moves `from → to` if the transition is legal and the cell still holds `from`.
    ///
    /// On failure returns the state observed in the cell.
    #[inline]
    pub fn transition(&self, from: S, to: S) -> Result<(), S> {
        if !from.can_transition(to) {
            return Err(self.load());
        }
        self.raw
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(S::from_u8)
    }

    /// Returns `true` if the cell currently holds `state`.
    #[inline]
    pub fn is(&self, state: S) -> bool {
        self.load() == state
    }
}

impl<S: StateMachine> fmt::Debug for AtomicState<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AtomicState").field(&self.load()).finish()
    }
}

/// Lifecycle of a subject's ring buffer (producer side).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    /// Accepting values.
    Active,
    /// A terminal notification won the race and is being recorded.
    Closing,
    /// Terminal notification recorded; no more values.
    Closed,
}

impl StateMachine for BufferState {
    const ALL: &'static [Self] = &[Self::Active, Self::Closing, Self::Closed];

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }

    fn can_transition(self, to: Self) -> bool {
        matches!((self, to), (Self::Active, Self::Closing) | (Self::Closing, Self::Closed))
    }
}

/// Lifecycle of one subscription slot of a ring buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// Parked and reusable.
    Free,
    /// Claimed by a live subscriber.
    Active,
    /// Claimed, and the buffer has closed (mirrors [`BufferState::Closed`]).
    Closed,
}

impl StateMachine for SlotState {
    const ALL: &'static [Self] = &[Self::Free, Self::Active, Self::Closed];

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Free,
            1 => Self::Active,
            _ => Self::Closed,
        }
    }

    fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Free, Self::Active)
                | (Self::Active, Self::Closed)
                | (Self::Active, Self::Free)
                | (Self::Closed, Self::Free)
        )
    }
}

/// Lifecycle of a [`Subscriber`](crate::Subscriber).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Subscribed.
    Active,
    /// Cancellation won; callbacks are running.
    Canceling,
    /// Callbacks ran; terminal.
    Canceled,
}

impl StateMachine for SubscriberState {
    const ALL: &'static [Self] = &[Self::Active, Self::Canceling, Self::Canceled];

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::Canceling,
            _ => Self::Canceled,
        }
    }

    fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Active, Self::Canceling) | (Self::Canceling, Self::Canceled)
        )
    }
}

/// Lifecycle of a switch [`Link`](crate::Link).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Created, inner stream not subscribed yet.
    Unsubscribed,
    /// Inner subscribe call in progress.
    Subscribing,
    /// Subscribed, no delivery in flight.
    Idle,
    /// A delivery is in flight.
    Busy,
    /// Inner stream failed.
    Errored,
    /// Cancel requested while subscribing or busy; the in-flight side finishes it.
    Canceled,
    /// Quiescent after cancel or inner completion; the completion callback may fire.
    Completing,
    /// Finished.
    Complete,
}

impl StateMachine for LinkState {
    const ALL: &'static [Self] = &[
        Self::Unsubscribed,
        Self::Subscribing,
        Self::Idle,
        Self::Busy,
        Self::Errored,
        Self::Canceled,
        Self::Completing,
        Self::Complete,
    ];

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Unsubscribed,
            1 => Self::Subscribing,
            2 => Self::Idle,
            3 => Self::Busy,
            4 => Self::Errored,
            5 => Self::Canceled,
            6 => Self::Completing,
            _ => Self::Complete,
        }
    }

    fn can_transition(self, to: Self) -> bool {
        use LinkState::*;
        matches!(
            (self, to),
            (Unsubscribed, Subscribing)
                | (Unsubscribed, Completing)
                | (Subscribing, Idle)
                | (Subscribing, Canceled)
                | (Idle, Busy)
                | (Idle, Completing)
                | (Busy, Idle)
                | (Busy, Canceled)
                | (Busy, Errored)
                | (Busy, Completing)
                | (Canceled, Completing)
                | (Completing, Complete)
        )
    }
}

impl LinkState {
    /// Returns `true` once the link can no longer deliver and a completion callback may run.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Errored | Self::Completing | Self::Complete)
    }
}

/// One-shot latch guarding a link's completion callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatchState {
    /// No callback.
    Unset,
    /// Callback being stored.
    Setting,
    /// Callback stored (or already consumed).
    Set,
}

impl StateMachine for LatchState {
    const ALL: &'static [Self] = &[Self::Unset, Self::Setting, Self::Set];

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Unset,
            1 => Self::Setting,
            _ => Self::Set,
        }
    }

    fn can_transition(self, to: Self) -> bool {
        matches!((self, to), (Self::Unset, Self::Setting) | (Self::Setting, Self::Set))
    }
}
