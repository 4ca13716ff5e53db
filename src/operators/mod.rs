//! # Flattening and combining operators.
//!
//! Operators are plain [`Observable`](crate::Observable) constructors: each one
//! subscribes its sources through the crate-internal `run` path with children
//! of its own subscriber, so canceling the combined stream cancels every inner
//! subscription, and an inner terminal never cancels the outer one.
//!
//! ```text
//!                 ┌──────────────── subscriber (combined) ───────────────┐
//!                 │                                                      │
//!   merge         ├─► child a ─┐                                         │
//!                 ├─► child b ─┼─► serialized observer ─► downstream     │
//!                 └─► child c ─┘   (live count, fail fast)               │
//!   concat        queue ─► one child at a time ─► next via schedule()    │
//!   switch        outer ─► Link(current) ─cancel(cb)─► cb subscribes next│
//!   combine       latest[i] per child ─► snapshot once all present       │
//!   retry         child fails ─► schedule_after(backoff) ─► new child    │
//!   catch         child fails ─► fallback child                          │
//!   timeout       child + timer, one lock decides which path wins        │
//!                 └──────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//! - Any inner error is terminal for the combined stream (fail fast); siblings
//!   are abandoned through the subscriber tree, not drained.
//! - Downstream deliveries are serialized wherever several inner streams can
//!   deliver from different workers.
//! - A combined stream completes exactly once.

use std::time::Duration;

mod catch;
mod combine;
mod concat;
mod link;
mod merge;
mod retry;
mod switch;
mod timeout;

pub use combine::combine_latest;
pub use concat::concat;
pub use link::Link;
pub use merge::merge;

/// Delay before [`retry`](crate::Observable::retry) resubscribes to a failed source.
pub const RETRY_DELAY: Duration = Duration::from_millis(1);
