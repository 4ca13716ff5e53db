//! # rill
//!
//! **Rill** is a reactive-stream execution engine for Rust.
//!
//! It provides the core that reactive operator libraries are built on:
//! schedulers, a cancellation tree, a multicast ring buffer behind every subject,
//! and the flattening operators (merge, concat, switch, combine-latest, retry,
//! catch). Element-wise operators (map, filter, take, ...) are left to the
//! embedding library.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │ Observable<T>│   │ Observable<T>│   │   Subject<T> │
//!     │ (cold source)│   │  (operator)  │   │ (hot, shared)│
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            │ subscribe(observer, options)        │ observer face: next/error/complete
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Subscriber tree (cancellation flows parent ─► children only)     │
//! │  - guard: at most one terminal, nothing after terminal or cancel  │
//! │  - done(err) records the terminal, wait() reports it              │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Scheduler                                                        │
//! │  - CooperativeScheduler: trampoline queue drained by wait()       │
//! │  - ConcurrentScheduler:  tokio runtime, tasks on the blocking pool│
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                       ┌────────────────────────┐
//!                       │  RingBuffer<T>         │
//!                       │  (one per subject)     │
//!                       └───┬────────────────┬───┘
//!                           ▼                ▼
//!                     reader slot 0    reader slot n
//!                     (own cursor,     (own cursor,
//!                      own scheduler)   own scheduler)
//! ```
//!
//! ### Subject data path
//! ```text
//! next(v) ──► full? ──► slowest live cursor > begin? ──► begin += 1
//!    │           └─ no ─► Waiter: spin ─► yield ─► sleep (re-check closed)
//!    └─► write cell[commit & mask] ─► commit += 1 ─► wake parked readers
//!
//! reader task (per slot, self-resubmitting)
//!   ├─ canceled?              ─► park cursor, release slot
//!   ├─ cursor == commit?      ─► closed? deliver terminal : back off (again / after / park)
//!   └─ cursor <  commit       ─► deliver cursor..commit (age filter), re-check cancel per item
//! ```
//!
//! ## Features
//! | Area             | Description                                                     | Key types / functions                           |
//! |------------------|-----------------------------------------------------------------|-------------------------------------------------|
//! | **Streams**      | Cold streams from a subscribe function, constructors, consumers | [`Observable`], [`Observer`], [`Notification`]  |
//! | **Subscription** | Cancellation tree, terminal error, blocking and async wait      | [`Subscriber`], [`Subscription`]                |
//! | **Scheduling**   | Cooperative and concurrent schedulers behind one trait          | [`Scheduler`], [`cooperative`], [`concurrent`]  |
//! | **Subjects**     | Hot multicast over a shared ring buffer, connectable sharing    | [`Subject`], [`make_subject`], [`Connectable`]  |
//! | **Operators**    | merge, concat, switch, combine-latest, retry, catch, timeout    | [`merge`], [`concat`], [`combine_latest`]       |
//! | **Policies**     | Retry backoff, jitter, ring-buffer wait escalation              | [`BackoffPolicy`], [`JitterPolicy`], [`WaitPolicy`] |
//! | **Errors**       | Typed terminal errors and contract violations                   | [`RxError`]                                     |
//! | **Configuration**| Ring capacity, retention, slot limit, wait policy               | [`SubjectConfig`]                               |
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use rill::{Observable, RxError, Subject, concurrent, cooperative, merge};
//!
//! // Cold streams on the cooperative scheduler: nothing runs until waited on.
//! let merged = merge(vec![Observable::from_iter([1, 2]), Observable::from_iter([3])]);
//! let mut values = merged.to_vec(cooperative()).unwrap();
//! values.sort();
//! assert_eq!(values, vec![1, 2, 3]);
//!
//! // A replay subject keeps the last two values for late subscribers.
//! let subject = Subject::replay(2, Duration::ZERO);
//! let tx = subject.observer();
//! for v in 0..5 {
//!     tx.next(v);
//! }
//! tx.complete();
//! assert_eq!(subject.observable().to_vec(concurrent()).unwrap(), vec![3, 4]);
//!
//! // Errors are values; retry resubscribes.
//! let failing = Observable::<i32>::throw(RxError::failed("boom")).retry(2);
//! assert!(failing.to_vec(cooperative()).is_err());
//! ```

mod config;
mod error;
mod observable;
mod operators;
mod policies;
mod scheduler;
mod state;
mod subject;
mod subscriber;

// ---- Public re-exports ----

pub use config::SubjectConfig;
pub use error::RxError;
pub use observable::{Item, Notification, Observable, Observer, RxStream, SubscribeOptions};
pub use operators::{Link, RETRY_DELAY, combine_latest, concat, merge};
pub use policies::{BackoffPolicy, JitterPolicy, WaitPolicy, WaitStep, Waiter};
pub use scheduler::{
    Again, ConcurrentConfig, ConcurrentScheduler, CooperativeScheduler, RecursiveTask, Scheduler,
    SchedulerRef, Task, TaskHandle, concurrent, cooperative,
};
pub use state::{
    AtomicState, BufferState, LatchState, LinkState, SlotState, StateMachine, SubscriberState,
};
pub use subject::{Connectable, PARKED, RingBuffer, Subject, make_subject};
pub use subscriber::{Subscriber, Subscription};
