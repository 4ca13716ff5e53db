//! # Observer / observable contract.
//!
//! An [`Observable`] is a subscribe function `(observer, scheduler, subscriber)`.
//! Subscribing wraps the observer in a guard, so every stream, including the ones
//! written by embedders, obeys the same delivery rules.
//!
//! ```text
//! Observable::subscribe(observer, options)
//!   ├─► scheduler  = options.scheduler  | fresh cooperative
//!   ├─► subscriber = options.subscriber.add_child() | new root
//!   ├─► cooperative? subscriber.on_wait(scheduler.wait)
//!   ├─► on_subscribe(&subscriber)
//!   ├─► subscribe_fn(guard(observer), scheduler, subscriber)
//!   │       guard: Next ──► observer            (dropped once stopped/canceled)
//!   │              Error/Complete ──► observer ──► subscriber.done(..)  (once)
//!   └─► on_subscribed(&subscriber)
//! ```
//!
//! ## Rules
//! - Within one subscription deliveries never overlap; sources that emit from
//!   several threads wrap their observer with [`Observer::serialized`].
//! - A terminal notification is delivered at most once and nothing follows it.
//! - Stream errors are values ([`Notification::Error`]), never panics.

mod consume;
mod create;
mod observer;
mod subscribe;

pub use consume::RxStream;
pub use observer::{Notification, Observer};
pub use subscribe::{Observable, SubscribeOptions};

/// Bound shared by every stream element type.
///
/// Values are cloned when a subject fans them out to several subscribers.
pub trait Item: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Item for T {}
