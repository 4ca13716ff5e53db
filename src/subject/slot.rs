//! Subscription slot: one reader's cursor into the ring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::state::{AtomicState, SlotState};

/// Cursor value of a released slot; never constrains `begin`.
pub const PARKED: u64 = u64::MAX;

#[derive(Debug)]
pub(crate) struct Slot {
    pub(crate) state: AtomicState<SlotState>,
    cursor: AtomicU64,
    generation: AtomicU64,
    /// Microseconds since the ring's epoch at the last productive read.
    last_active: AtomicU64,
}

impl Slot {
    pub(crate) fn new() -> Self {
        Self {
            state: AtomicState::new(SlotState::Free),
            cursor: AtomicU64::new(PARKED),
            generation: AtomicU64::new(0),
            last_active: AtomicU64::new(0),
        }
    }

    /// Claims a free slot at `cursor`; returns the claim's generation.
    ///
    /// Caller holds the gate.
    pub(crate) fn claim(&self, cursor: u64, now: u64) -> Option<u64> {
        self.state.transition(SlotState::Free, SlotState::Active).ok()?;
        self.cursor.store(cursor, Ordering::Release);
        self.last_active.store(now, Ordering::Relaxed);
        Some(self.generation.fetch_add(1, Ordering::AcqRel) + 1)
    }

    /// Parks the cursor and frees the slot if `generation` still owns it.
    ///
    /// Caller holds the gate.
    pub(crate) fn release(&self, generation: u64) -> bool {
        if self.generation.load(Ordering::Acquire) != generation {
            return false;
        }
        let freed = self
            .state
            .transition(SlotState::Active, SlotState::Free)
            .or_else(|_| self.state.transition(SlotState::Closed, SlotState::Free))
            .is_ok();
        if freed {
            self.cursor.store(PARKED, Ordering::Release);
        }
        freed
    }

    /// Mirrors the buffer closing. Caller holds the gate.
    pub(crate) fn close(&self) {
        let _ = self.state.transition(SlotState::Active, SlotState::Closed);
    }

    #[inline]
    pub(crate) fn cursor(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn owned_by(&self, generation: u64) -> bool {
        self.generation.load(Ordering::Acquire) == generation && !self.state.is(SlotState::Free)
    }

    /// Moves the cursor of claim `generation`; `false` once the claim is gone.
    #[inline]
    pub(crate) fn advance(&self, generation: u64, cursor: u64, now: u64) -> bool {
        if !self.owned_by(generation) {
            return false;
        }
        self.cursor.store(cursor, Ordering::Release);
        self.last_active.store(now, Ordering::Relaxed);
        true
    }

    /// Live cursor, `None` for a free slot.
    pub(crate) fn live_cursor(&self) -> Option<u64> {
        if self.state.is(SlotState::Free) {
            return None;
        }
        Some(self.cursor()).filter(|c| *c != PARKED)
    }

    pub(crate) fn idle(&self, epoch: Instant) -> Duration {
        let last = Duration::from_micros(self.last_active.load(Ordering::Relaxed));
        epoch.elapsed().saturating_sub(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_and_release_cycle() {
        let slot = Slot::new();
        assert_eq!(slot.live_cursor(), None);

        let g1 = slot.claim(5, 0).unwrap();
        assert_eq!(slot.live_cursor(), Some(5));
        assert!(slot.claim(9, 0).is_none());

        assert!(slot.release(g1));
        assert_eq!(slot.cursor(), PARKED);
        assert_eq!(slot.live_cursor(), None);
    }

    #[test]
    fn test_stale_release_is_ignored_after_reuse() {
        let slot = Slot::new();
        let g1 = slot.claim(0, 0).unwrap();
        assert!(slot.release(g1));
        let g2 = slot.claim(3, 0).unwrap();
        assert!(!slot.release(g1));
        assert!(slot.owned_by(g2));
        assert_eq!(slot.live_cursor(), Some(3));
    }

    #[test]
    fn test_stale_advance_leaves_new_owner_cursor() {
        let slot = Slot::new();
        let g1 = slot.claim(4, 0).unwrap();
        assert!(slot.advance(g1, 5, 0));
        assert!(slot.release(g1));
        assert!(!slot.advance(g1, 6, 0));
        let g2 = slot.claim(2, 0).unwrap();
        assert!(!slot.advance(g1, 7, 0));
        assert_eq!(slot.live_cursor(), Some(2));
        assert!(slot.advance(g2, 3, 0));
        assert_eq!(slot.live_cursor(), Some(3));
    }

    #[test]
    fn test_closed_slot_still_reads_then_frees() {
        let slot = Slot::new();
        let g = slot.claim(2, 0).unwrap();
        slot.close();
        assert!(slot.state.is(SlotState::Closed));
        assert_eq!(slot.live_cursor(), Some(2));
        assert!(slot.release(g));
        assert!(slot.state.is(SlotState::Free));
    }
}
