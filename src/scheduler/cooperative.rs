//! # Cooperative (trampoline) scheduler.
//!
//! One run queue ordered by due time, then submission order. Nothing runs on
//! submission: [`wait`](CooperativeScheduler::wait) drains the queue on the
//! calling thread, so a task that schedules more work only appends to the queue
//! and the stack never grows with recursion depth.
//!
//! ## Rules
//! - A `wait()` issued from inside a running task returns immediately (re-entrancy guard).
//! - A second thread calling `wait()` blocks until the current drain ends, then drains the rest.
//! - When only delayed work remains the drain sleeps until the earliest due time.

use std::cell::Cell;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, ReentrantMutex};

use super::{Again, RecursiveTask, Scheduler, TaskHandle};

struct Entry {
    due: Instant,
    seq: u64,
    task: RecursiveTask,
    handle: TaskHandle,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    // Reversed: BinaryHeap is a max-heap, the earliest (due, seq) must pop first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Entry>,
    seq: u64,
}

/// Single-threaded trampoline scheduler.
pub struct CooperativeScheduler {
    queue: Mutex<Queue>,
    draining: ReentrantMutex<Cell<bool>>,
}

/// Clears the drain flag even if a task panics through `wait()`.
struct DrainGuard<'a>(&'a Cell<bool>);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Default for CooperativeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl CooperativeScheduler {
    /// Creates an empty scheduler.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(Queue::default()),
            draining: ReentrantMutex::new(Cell::new(false)),
        }
    }

    fn push(&self, due: Instant, task: RecursiveTask, handle: TaskHandle) {
        let mut q = self.queue.lock();
        q.seq += 1;
        let seq = q.seq;
        q.heap.push(Entry {
            due,
            seq,
            task,
            handle,
        });
    }

    /// Pops the next due entry, or reports how long until one is due.
    ///
    /// Canceled entries at the head are discarded without waiting for them.
    fn pop_due(&self) -> Result<Option<Entry>, Duration> {
        let mut q = self.queue.lock();
        while q.heap.peek().is_some_and(|e| e.handle.is_canceled()) {
            q.heap.pop();
        }
        let now = Instant::now();
        match q.heap.peek() {
            None => Ok(None),
            Some(e) if e.due <= now => Ok(q.heap.pop()),
            Some(e) => Err(e.due - now),
        }
    }

    fn run(&self, mut entry: Entry) {
        if entry.handle.is_canceled() {
            return;
        }
        let mut again = Again::default();
        (entry.task)(&mut again);

        if let Some(delay) = again.take() {
            if !entry.handle.is_canceled() {
                self.push(Instant::now() + delay, entry.task, entry.handle);
            }
        }
    }
}

impl Scheduler for CooperativeScheduler {
    fn schedule_after_recursive(&self, delay: Duration, task: RecursiveTask) -> TaskHandle {
        let handle = TaskHandle::new();
        self.push(Instant::now() + delay, task, handle.clone());
        handle
    }

    fn is_concurrent(&self) -> bool {
        false
    }

    fn wait(&self) {
        let flag = self.draining.lock();
        if flag.get() {
            return;
        }
        flag.set(true);
        let _guard = DrainGuard(&flag);

        loop {
            match self.pop_due() {
                Ok(Some(entry)) => self.run(entry),
                Ok(None) => break,
                Err(until) => std::thread::sleep(until),
            }
        }
    }

    fn count(&self) -> usize {
        self.queue.lock().heap.len()
    }
}
