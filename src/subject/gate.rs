//! Spin-CAS gate around the slot list.
//!
//! Acquisition is a `try_lock` compare-and-swap in a loop, escalating from
//! `spin_loop` hints to thread yields. It never parks the thread, so the
//! producer's full-ring check stays on the fast path.

use parking_lot::{Mutex, MutexGuard};

const SPINS_BEFORE_YIELD: u32 = 64;

/// Exclusive-access gate.
#[derive(Debug, Default)]
pub(crate) struct SpinGate<T> {
    inner: Mutex<T>,
}

impl<T> SpinGate<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Spins until the gate is acquired.
    pub(crate) fn enter(&self) -> MutexGuard<'_, T> {
        let mut spins = 0u32;
        loop {
            if let Some(guard) = self.inner.try_lock() {
                return guard;
            }
            if spins < SPINS_BEFORE_YIELD {
                spins += 1;
                std::hint::spin_loop();
            } else {
                std::thread::yield_now();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_gate_excludes_concurrent_mutation() {
        let gate = Arc::new(SpinGate::new(0u64));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let g = gate.clone();
                std::thread::spawn(move || {
                    for _ in 0..10_000 {
                        *g.enter() += 1;
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(*gate.enter(), 40_000);
    }
}
