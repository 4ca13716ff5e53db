//! # Subscription tree.
//!
//! A [`Subscriber`] is the lifecycle handle of one delivery relationship. Handles
//! form parent → child trees: canceling a node cancels its whole subtree, while a
//! child's cancellation never reaches its parent.
//!
//! ```text
//! subscribe()
//!   └─► Subscriber (root)
//!         ├─► add_child() ── inner stream A
//!         ├─► add_child() ── inner stream B
//!         │       └─► add_child() ── ...
//!         └─► on_unsubscribe(cb)
//!
//! unsubscribe(root): Active ─► Canceling ─► callbacks in registration order ─► Canceled ─► wake waiters
//! ```
//!
//! ## Rules
//! - The lifecycle changes once; further `unsubscribe()` calls are no-ops.
//! - Every registered callback runs exactly once; the list is cleared afterwards.
//! - A callback registered after cancellation runs immediately on the caller's thread.
//! - `error()` is `None` while the subscriber is active.

mod tree;

pub use tree::{Subscriber, Subscription};
