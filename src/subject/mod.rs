//! # Subjects: hot multicast streams over one ring buffer.
//!
//! Every subject flavor is the same [`RingBuffer`] with different retention
//! settings; only the last-value flavor layers extra logic on the consumer side.
//!
//! ```text
//!  Observer<T> ──next/error/complete──► RingBuffer ◄──subscribe── Observable<T>
//!                                        │  slots (spin gate)
//!                                        ├─► Slot 0 ── reader task on scheduler A
//!                                        ├─► Slot 1 ── reader task on scheduler B
//!                                        └─► Slot n (parked, reusable)
//! ```
//!
//! | flavor                      | keep | age | extra                         |
//! |-----------------------------|------|-----|-------------------------------|
//! | [`Subject::publish`]        | 0    | 0   |                               |
//! | [`Subject::replay`]         | k    | a   |                               |
//! | [`Subject::behavior`]       | 1    | 0   | seeded with the initial value |
//! | [`Subject::last_value`]     | 1    | 0   | delivers last value on close  |
//!
//! [`Connectable`] shares one upstream subscription through a subject
//! (`multicast`, `publish*`, `auto_connect`, `ref_count`).

mod flavors;
mod gate;
mod multicast;
mod ring;
mod slot;

pub use flavors::{Subject, make_subject};
pub use multicast::Connectable;
pub use ring::RingBuffer;
pub use slot::PARKED;
