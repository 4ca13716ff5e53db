//! # Subject configuration.
//!
//! Provides [`SubjectConfig`], the settings of one multicast ring buffer.
//!
//! Config is used in two ways:
//! 1. **Direct construction**: `make_subject(config)` / `Subject::new(config)`
//! 2. **Flavor presets**: `Subject::publish`, `Subject::replay`, `Subject::behavior`
//!    fill in `keep`/`age` and leave the rest at defaults.
//!
//! ## Sentinel values
//! - `age = 0s` → items never expire
//! - `keep = 0` → hot: a subscriber sees nothing emitted before it subscribed
//! - `keep = usize::MAX` → full retained history
//! - `capacity = 0` → [`DEFAULT_CAPACITY`]
//! - `max_slots = 0` → [`DEFAULT_MAX_SLOTS`]
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use rill::SubjectConfig;
//!
//! let cfg = SubjectConfig::default()
//!     .with_keep(2)
//!     .with_age(Duration::from_secs(5))
//!     .with_capacity(100);
//!
//! assert_eq!(cfg.effective_capacity(), 128);
//! assert_eq!(cfg.max_age(), Some(Duration::from_secs(5)));
//! ```

use std::time::Duration;

use crate::policies::WaitPolicy;

/// Smallest ring size ever allocated.
pub const MIN_CAPACITY: usize = 16;
/// Largest ring size ever allocated.
pub const MAX_CAPACITY: usize = 1 << 20;
/// Ring size used when `capacity = 0`.
pub const DEFAULT_CAPACITY: usize = 1024;
/// Slot limit used when `max_slots = 0`.
pub const DEFAULT_MAX_SLOTS: usize = 1024;

/// Settings of one multicast ring buffer.
///
/// ## Field semantics
/// - `age`: retention window for replay and delivery (`0s` = unbounded)
/// - `keep`: trailing items replayed to late subscribers (`0` = none)
/// - `capacity`: requested ring size, rounded up to a power of two above `keep`
/// - `max_slots`: concurrent subscriptions before `OutOfSubscriptions`
/// - `wait`: escalation thresholds of the read and write paths
///
/// ## Notes
/// All fields are public. Prefer the accessors over checking sentinels inline.
#[derive(Clone, Debug)]
pub struct SubjectConfig {
    /// Items older than this are skipped on delivery.
    pub age: Duration,

    /// Number of already-committed items a new subscriber starts behind `commit`.
    ///
    /// Retention never blocks the producer: the ring is sized strictly above
    /// `keep`, and only live cursors make a write wait.
    pub keep: usize,

    /// Requested ring size.
    pub capacity: usize,

    /// Maximum number of simultaneously claimed subscription slots.
    pub max_slots: usize,

    /// Backoff thresholds for caught-up readers and a writer facing a full ring.
    pub wait: WaitPolicy,
}

impl Default for SubjectConfig {
    /// Default configuration:
    ///
    /// - `age = 0s` (unbounded)
    /// - `keep = 0` (hot)
    /// - `capacity = 0` (→ 1024)
    /// - `max_slots = 0` (→ 1024)
    /// - `wait = WaitPolicy::default()`
    fn default() -> Self {
        Self {
            age: Duration::ZERO,
            keep: 0,
            capacity: 0,
            max_slots: 0,
            wait: WaitPolicy::default(),
        }
    }
}

impl SubjectConfig {
    /// Returns the retention window as an `Option`.
    ///
    /// - `None` → items never expire
    /// - `Some(d)` → items older than `d` are skipped
    #[inline]
    pub fn max_age(&self) -> Option<Duration> {
        (self.age > Duration::ZERO).then_some(self.age)
    }

    /// Returns the ring size: the smallest power of two that is at least the
    /// requested capacity and strictly greater than `keep`, clamped to
    /// `[MIN_CAPACITY, MAX_CAPACITY]`.
    pub fn effective_capacity(&self) -> usize {
        let requested = if self.capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            self.capacity
        };
        let need = requested.max(self.keep.saturating_add(1)).min(MAX_CAPACITY);
        need.next_power_of_two().clamp(MIN_CAPACITY, MAX_CAPACITY)
    }

    /// Returns the slot limit, never below 1.
    #[inline]
    pub fn effective_max_slots(&self) -> usize {
        if self.max_slots == 0 {
            DEFAULT_MAX_SLOTS
        } else {
            self.max_slots
        }
    }

    /// Sets the retention window.
    pub fn with_age(mut self, age: Duration) -> Self {
        self.age = age;
        self
    }

    /// Sets the replay count.
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep;
        self
    }

    /// Sets the requested ring size.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the slot limit.
    pub fn with_max_slots(mut self, max_slots: usize) -> Self {
        self.max_slots = max_slots;
        self
    }

    /// Sets the backoff thresholds.
    pub fn with_wait(mut self, wait: WaitPolicy) -> Self {
        self.wait = wait;
        self
    }
}
