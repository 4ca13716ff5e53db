//! # Multicast ring buffer.
//!
//! One producer face (`next` / `error` / `complete`) and any number of
//! independently paced readers, each owning a slot with its own cursor.
//!
//! ```text
//!             begin            cursor(slow)      cursor(fast)   commit=end
//!               │                   │                 │             │
//! seq:   ... [ b ][b+1][ ... ][ c ][ ... ][ ... ][ f ][ ... ][e-1] ▏ (next write)
//! cell:  seq & mask
//!
//! write:  full? (end − begin == size) ──► gate: slowest live cursor > begin ? begin += 1 : back off
//!         cell[end & mask] = (end, value, now) ──► end += 1 ──► commit = end ──► wake parked readers
//! read:   start = max(begin, commit − keep) ──► replay cursor..commit (age filter) ──► wait policy when caught up
//! close:  Active ─► Closing (record error) ─► Closed ──► slots Active ─► Closed ──► wake readers
//! ```
//!
//! ## Rules
//! - `begin ≤ every live cursor ≤ commit ≤ end` and `end − begin ≤ size`.
//! - `begin` only moves under the gate and only past cells no live cursor still needs.
//! - Retention (`keep`) never blocks the producer; only live cursors do.
//! - Values written after the buffer started closing are dropped.
//! - A canceled reader parks its cursor, so it stops constraining `begin`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::SubjectConfig;
use crate::error::RxError;
use crate::observable::{Item, Observer};
use crate::policies::{WaitPolicy, WaitStep, Waiter};
use crate::scheduler::{Again, SchedulerRef};
use crate::state::{AtomicState, BufferState, SlotState};
use crate::subject::gate::SpinGate;
use crate::subject::slot::Slot;
use crate::subscriber::Subscriber;

struct Entry<T> {
    seq: u64,
    value: T,
    stamp: Instant,
}

/// Bounded multicast store shared by a producer and its readers.
pub struct RingBuffer<T> {
    cells: Box<[Mutex<Option<Entry<T>>>]>,
    size: u64,
    mask: u64,
    begin: AtomicU64,
    end: AtomicU64,
    commit: AtomicU64,
    keep: u64,
    age: Option<Duration>,
    max_slots: usize,
    wait: WaitPolicy,
    state: AtomicState<BufferState>,
    error: Mutex<Option<RxError>>,
    writer: Mutex<()>,
    slots: SpinGate<Vec<Arc<Slot>>>,
    parked: AtomicUsize,
    wake_lock: Mutex<()>,
    wake: Condvar,
    epoch: Instant,
}

impl<T: Item> std::fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (begin, commit, end) = self.indices();
        f.debug_struct("RingBuffer")
            .field("size", &self.size)
            .field("begin", &begin)
            .field("commit", &commit)
            .field("end", &end)
            .field("state", &self.state.load())
            .finish()
    }
}

impl<T: Item> RingBuffer<T> {
    /// Allocates a buffer from `config`.
    pub fn new(config: &SubjectConfig) -> Self {
        let size = config.effective_capacity();
        let cells = (0..size).map(|_| Mutex::new(None)).collect();
        Self {
            cells,
            size: size as u64,
            mask: size as u64 - 1,
            begin: AtomicU64::new(0),
            end: AtomicU64::new(0),
            commit: AtomicU64::new(0),
            keep: u64::try_from(config.keep).unwrap_or(u64::MAX),
            age: config.max_age(),
            max_slots: config.effective_max_slots(),
            wait: config.wait,
            state: AtomicState::new(BufferState::Active),
            error: Mutex::new(None),
            writer: Mutex::new(()),
            slots: SpinGate::new(Vec::new()),
            parked: AtomicUsize::new(0),
            wake_lock: Mutex::new(()),
            wake: Condvar::new(),
            epoch: Instant::now(),
        }
    }

    /// Appends a value, backing off while the slowest reader would be overrun.
    ///
    /// Returns without writing once the buffer is closing or closed, including
    /// when that happens while waiting for space.
    pub fn next(&self, value: T) {
        let _writer = self.writer.lock();
        let mut waiter = Waiter::new(self.wait, true);
        let end = self.end.load(Ordering::Acquire);

        loop {
            if !self.state.is(BufferState::Active) {
                return;
            }
            let begin = self.begin.load(Ordering::Acquire);
            if end - begin < self.size {
                break;
            }
            {
                let slots = self.slots.enter();
                let slowest = slowest(&slots);
                if slowest > begin {
                    self.begin.store(begin + 1, Ordering::Release);
                    break;
                }
            }
            waiter.block();
        }

        *self.cells[(end & self.mask) as usize].lock() = Some(Entry {
            seq: end,
            value,
            stamp: Instant::now(),
        });
        self.end.store(end + 1, Ordering::Release);
        self.commit.store(end + 1, Ordering::SeqCst);
        self.wake_readers();
    }

    /// Closes the buffer with `err`. Only the first terminal call has an effect.
    pub fn error(&self, err: RxError) {
        self.close(Some(err));
    }

    /// Closes the buffer normally. Only the first terminal call has an effect.
    pub fn complete(&self) {
        self.close(None);
    }

    fn close(&self, err: Option<RxError>) {
        if self
            .state
            .transition(BufferState::Active, BufferState::Closing)
            .is_err()
        {
            return;
        }
        // A write already past its state check finishes before the close lands.
        let _writer = self.writer.lock();
        tracing::debug!(
            commit = self.commit.load(Ordering::Acquire),
            error = err.as_ref().map(RxError::as_label),
            "subject closing"
        );
        *self.error.lock() = err;
        let _ = self
            .state
            .transition(BufferState::Closing, BufferState::Closed);

        for slot in self.slots.enter().iter() {
            slot.close();
        }
        self.wake_all();
    }

    /// Attaches a reader delivering to `observer` on `scheduler` until
    /// `subscriber` is canceled or the buffer's terminal is delivered.
    pub fn subscribe(self: &Arc<Self>, observer: Observer<T>, scheduler: SchedulerRef, subscriber: Subscriber) {
        let Some((slot, generation)) = self.claim() else {
            tracing::warn!(max_slots = self.max_slots, "subject out of subscription slots");
            let err = RxError::OutOfSubscriptions {
                max: self.max_slots,
            };
            let handle = scheduler.schedule(Box::new(move || observer.error(err)));
            subscriber.on_unsubscribe(move || handle.cancel());
            return;
        };

        let concurrent = scheduler.is_concurrent();
        let running = Arc::new(AtomicBool::new(false));
        let mut reader = Reader {
            ring: self.clone(),
            slot: slot.clone(),
            generation,
            observer,
            subscriber: subscriber.clone(),
            waiter: Waiter::new(self.wait, concurrent),
            running: running.clone(),
        };
        let handle = scheduler.schedule_recursive(Box::new(move |again: &mut Again| reader.run(again)));

        let ring = self.clone();
        subscriber.on_unsubscribe(move || {
            if concurrent {
                // The reader releases its own slot on its next run.
                ring.wake_all();
            } else {
                handle.cancel();
                // A reader mid-run releases the slot itself when it returns.
                if !running.load(Ordering::SeqCst) {
                    ring.release(&slot, generation);
                }
            }
        });
    }

    fn claim(&self) -> Option<(Arc<Slot>, u64)> {
        let mut slots = self.slots.enter();
        let begin = self.begin.load(Ordering::Acquire);
        let commit = self.commit.load(Ordering::Acquire);
        let start = begin.max(commit.saturating_sub(self.keep));
        let now = self.now();

        let reused = slots
            .iter()
            .find_map(|s| s.claim(start, now).map(|g| (s.clone(), g)));
        let (slot, generation) = match reused {
            Some(claimed) => claimed,
            None if slots.len() < self.max_slots => {
                let slot = Arc::new(Slot::new());
                let generation = slot.claim(start, now)?;
                slots.push(slot.clone());
                (slot, generation)
            }
            None => return None,
        };
        if self.state.is(BufferState::Closed) {
            slot.close();
        }
        Some((slot, generation))
    }

    fn release(&self, slot: &Slot, generation: u64) {
        let _slots = self.slots.enter();
        slot.release(generation);
    }

    fn read(&self, seq: u64) -> Option<(T, Instant)> {
        let cell = self.cells[(seq & self.mask) as usize].lock();
        cell.as_ref()
            .filter(|e| e.seq == seq)
            .map(|e| (e.value.clone(), e.stamp))
    }

    fn now(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn wake_readers(&self) {
        if self.parked.load(Ordering::SeqCst) > 0 {
            self.wake_all();
        }
    }

    fn wake_all(&self) {
        let _lock = self.wake_lock.lock();
        self.wake.notify_all();
    }

    /// Condition-waits until `commit` moves past `cursor`, the buffer closes,
    /// a reader is canceled, or `timeout` elapses.
    fn park(&self, cursor: u64, timeout: Duration) {
        let mut lock = self.wake_lock.lock();
        self.parked.fetch_add(1, Ordering::SeqCst);
        if self.commit.load(Ordering::SeqCst) <= cursor && self.state.is(BufferState::Active) {
            self.wake.wait_for(&mut lock, timeout);
        }
        self.parked.fetch_sub(1, Ordering::SeqCst);
    }

    fn terminal(&self) -> Option<RxError> {
        self.error.lock().clone()
    }

    /// Number of retained items (`commit − begin`).
    pub fn len(&self) -> usize {
        let (begin, commit, _) = self.indices();
        (commit - begin) as usize
    }

    /// Returns `true` if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ring size (power of two).
    pub fn capacity(&self) -> usize {
        self.size as usize
    }

    /// Returns `(begin, commit, end)`.
    pub fn indices(&self) -> (u64, u64, u64) {
        let begin = self.begin.load(Ordering::Acquire);
        let commit = self.commit.load(Ordering::Acquire);
        let end = self.end.load(Ordering::Acquire);
        (begin, commit, end)
    }

    /// Smallest live cursor, `None` without live readers.
    pub fn slowest_cursor(&self) -> Option<u64> {
        let slots = self.slots.enter();
        Some(slowest(&slots)).filter(|c| *c != u64::MAX)
    }

    /// Number of claimed slots.
    pub fn subscriber_count(&self) -> usize {
        self.slots
            .enter()
            .iter()
            .filter(|s| s.live_cursor().is_some())
            .count()
    }

    /// Longest time any live reader has gone without reading a value.
    pub fn longest_idle(&self) -> Option<Duration> {
        self.slots
            .enter()
            .iter()
            .filter(|s| s.live_cursor().is_some())
            .map(|s| s.idle(self.epoch))
            .max()
    }

    /// Returns `true` once a terminal notification was recorded.
    pub fn is_closed(&self) -> bool {
        self.state.is(BufferState::Closed)
    }
}

fn slowest(slots: &[Arc<Slot>]) -> u64 {
    slots
        .iter()
        .filter_map(|s| s.live_cursor())
        .min()
        .unwrap_or(u64::MAX)
}

/// Self-resubmitting read task of one slot.
struct Reader<T> {
    ring: Arc<RingBuffer<T>>,
    slot: Arc<Slot>,
    generation: u64,
    observer: Observer<T>,
    subscriber: Subscriber,
    waiter: Waiter,
    /// Set while `run` executes; the slot is released only by the reader then.
    running: Arc<AtomicBool>,
}

impl<T: Item> Reader<T> {
    fn run(&mut self, again: &mut Again) {
        self.running.store(true, Ordering::SeqCst);
        self.step(again);
        self.running.store(false, Ordering::SeqCst);
        if self.subscriber.canceled() {
            self.ring.release(&self.slot, self.generation);
        }
    }

    fn step(&mut self, again: &mut Again) {
        if self.subscriber.canceled() || !self.slot.owned_by(self.generation) {
            self.ring.release(&self.slot, self.generation);
            return;
        }

        // Closure is loaded before commit: a closed slot has a final commit.
        let closed = self.slot.state.is(SlotState::Closed);
        let commit = self.ring.commit.load(Ordering::Acquire);
        let mut cursor = self.slot.cursor();

        if cursor >= commit {
            if closed {
                match self.ring.terminal() {
                    Some(e) => self.observer.error(e),
                    None => self.observer.complete(),
                }
                self.ring.release(&self.slot, self.generation);
                return;
            }
            match self.waiter.step() {
                WaitStep::Spin => {
                    std::hint::spin_loop();
                    again.again();
                }
                WaitStep::Yield => {
                    std::thread::yield_now();
                    again.again();
                }
                WaitStep::Sleep(d) => again.after(d),
                WaitStep::Park(d) => {
                    self.ring.park(cursor, d);
                    again.again();
                }
            }
            return;
        }

        self.waiter.reset();
        while cursor < commit {
            let item = self.ring.read(cursor);
            cursor += 1;
            if !self.slot.advance(self.generation, cursor, self.ring.now()) {
                return;
            }
            if let Some((value, stamp)) = item {
                let fresh = self.ring.age.is_none_or(|age| stamp.elapsed() <= age);
                if fresh {
                    self.observer.next(value);
                }
            }
            if self.subscriber.canceled() {
                self.ring.release(&self.slot, self.generation);
                return;
            }
        }
        again.again();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observable::Notification;
    use crate::scheduler::{concurrent, cooperative};

    fn ring(cfg: SubjectConfig) -> Arc<RingBuffer<u64>> {
        Arc::new(RingBuffer::new(&cfg))
    }

    fn recorder() -> (Arc<Mutex<Vec<String>>>, Observer<u64>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = log.clone();
        let obs = Observer::new(move |n: Notification<u64>| {
            l.lock().push(match n {
                Notification::Next(v) => v.to_string(),
                Notification::Error(e) => format!("error:{}", e.as_label()),
                Notification::Complete => "complete".to_string(),
            })
        });
        (log, obs)
    }

    #[test]
    fn test_keep_replays_last_items_then_live() {
        let rb = ring(SubjectConfig::default().with_keep(2));
        for v in 0..=4 {
            rb.next(v);
        }
        let sched = cooperative();
        let (log, obs) = recorder();
        rb.subscribe(obs, sched.clone(), Subscriber::new());
        rb.next(5);
        rb.complete();
        sched.wait();
        assert_eq!(*log.lock(), vec!["3", "4", "5", "complete"]);
    }

    #[test]
    fn test_hot_subscriber_sees_only_later_items() {
        let rb = ring(SubjectConfig::default());
        rb.next(1);
        let sched = cooperative();
        let (log, obs) = recorder();
        rb.subscribe(obs, sched.clone(), Subscriber::new());
        rb.next(2);
        rb.complete();
        sched.wait();
        assert_eq!(*log.lock(), vec!["2", "complete"]);
    }

    #[test]
    fn test_full_history_replays_everything_retained() {
        let rb = ring(SubjectConfig::default().with_keep(usize::MAX).with_capacity(16));
        for v in 0..10 {
            rb.next(v);
        }
        rb.complete();
        let sched = cooperative();
        let (log, obs) = recorder();
        rb.subscribe(obs, sched.clone(), Subscriber::new());
        sched.wait();
        assert_eq!(log.lock().len(), 11);
        assert_eq!(log.lock()[0], "0");
    }

    #[test]
    fn test_retention_never_blocks_producer() {
        let rb = ring(SubjectConfig::default().with_keep(4).with_capacity(16));
        for v in 0..1000 {
            rb.next(v);
        }
        let (begin, commit, end) = rb.indices();
        assert_eq!(commit, 1000);
        assert_eq!(end, commit);
        assert_eq!(commit - begin, 16);
        assert_eq!(rb.len(), 16);
    }

    #[test]
    fn test_age_skips_stale_items() {
        let rb = ring(
            SubjectConfig::default()
                .with_keep(2)
                .with_age(Duration::from_millis(20)),
        );
        rb.next(1);
        std::thread::sleep(Duration::from_millis(40));
        rb.next(2);
        rb.complete();
        let sched = cooperative();
        let (log, obs) = recorder();
        rb.subscribe(obs, sched.clone(), Subscriber::new());
        sched.wait();
        assert_eq!(*log.lock(), vec!["2", "complete"]);
    }

    #[test]
    fn test_error_reaches_every_reader() {
        let rb = ring(SubjectConfig::default());
        let sched = cooperative();
        let (a, obs_a) = recorder();
        let (b, obs_b) = recorder();
        rb.subscribe(obs_a, sched.clone(), Subscriber::new());
        rb.subscribe(obs_b, sched.clone(), Subscriber::new());
        rb.next(1);
        rb.error(RxError::failed("x"));
        rb.complete();
        rb.next(2);
        sched.wait();
        assert_eq!(*a.lock(), vec!["1", "error:rx_failed"]);
        assert_eq!(*b.lock(), vec!["1", "error:rx_failed"]);
        assert!(rb.is_closed());
        assert_eq!(rb.subscriber_count(), 0);
    }

    #[test]
    fn test_slot_exhaustion_is_reported_to_the_late_subscriber() {
        let rb = ring(SubjectConfig::default().with_max_slots(1));
        let sched = cooperative();
        let (a, obs_a) = recorder();
        let (b, obs_b) = recorder();
        let first = Subscriber::new();
        rb.subscribe(obs_a, sched.clone(), first.clone());
        rb.subscribe(obs_b, sched.clone(), Subscriber::new());
        rb.next(1);
        rb.complete();
        sched.wait();
        assert_eq!(*a.lock(), vec!["1", "complete"]);
        assert_eq!(*b.lock(), vec!["error:rx_out_of_subscriptions"]);
    }

    #[test]
    fn test_unsubscribed_slot_is_reused() {
        let rb = ring(SubjectConfig::default().with_max_slots(1));
        let sched = cooperative();
        let first = Subscriber::new();
        let (_, obs_a) = recorder();
        rb.subscribe(obs_a, sched.clone(), first.clone());
        assert_eq!(rb.subscriber_count(), 1);
        first.unsubscribe();
        assert_eq!(rb.subscriber_count(), 0);
        assert_eq!(rb.slowest_cursor(), None);

        let (b, obs_b) = recorder();
        rb.subscribe(obs_b, sched.clone(), Subscriber::new());
        rb.next(7);
        rb.complete();
        sched.wait();
        assert_eq!(*b.lock(), vec!["7", "complete"]);
    }

    #[test]
    fn test_cancel_mid_replay_parks_cursor() {
        let rb = ring(SubjectConfig::default().with_keep(8));
        for v in 0..8 {
            rb.next(v);
        }
        let sched = cooperative();
        let sub = Subscriber::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (s, cancel) = (seen.clone(), sub.clone());
        rb.subscribe(
            Observer::new(move |n| {
                if let Notification::Next(v) = n {
                    s.lock().push(v);
                    if v == 2 {
                        cancel.unsubscribe();
                    }
                }
            }),
            sched.clone(),
            sub,
        );
        sched.wait();
        assert_eq!(*seen.lock(), vec![0, 1, 2]);
        assert_eq!(rb.slowest_cursor(), None);
        assert_eq!(rb.subscriber_count(), 0);
    }

    #[test]
    fn test_slot_released_mid_replay_is_not_reused_under_reader() {
        let rb = ring(SubjectConfig::default().with_keep(usize::MAX));
        for v in 0..5 {
            rb.next(v);
        }
        rb.complete();
        let sched = cooperative();
        let first = Subscriber::new();
        let (late, late_obs) = recorder();
        let late_obs = Mutex::new(Some(late_obs));
        let (cancel, rb2, sched2) = (first.clone(), rb.clone(), sched.clone());
        rb.subscribe(
            Observer::new(move |n| {
                if let Notification::Next(0) = n {
                    cancel.unsubscribe();
                    assert_eq!(rb2.subscriber_count(), 1);
                    if let Some(obs) = late_obs.lock().take() {
                        rb2.subscribe(obs, sched2.clone(), Subscriber::new());
                    }
                }
            }),
            sched.clone(),
            first,
        );
        sched.wait();
        assert_eq!(*late.lock(), vec!["0", "1", "2", "3", "4", "complete"]);
        assert_eq!(rb.subscriber_count(), 0);
    }

    #[test]
    fn test_slow_reader_throttles_producer_and_invariants_hold() {
        let rb = ring(SubjectConfig::default().with_capacity(16));
        let sched = concurrent();
        let (log, obs) = recorder();
        let sub = Subscriber::new();
        rb.subscribe(
            Observer::new(move |n| {
                std::thread::sleep(Duration::from_micros(50));
                obs.notify(n);
            }),
            sched.clone(),
            sub.clone(),
        );

        let producer = {
            let rb = rb.clone();
            std::thread::spawn(move || {
                for v in 0..500 {
                    rb.next(v);
                }
                rb.complete();
            })
        };
        while !producer.is_finished() {
            let (begin, commit, end) = rb.indices();
            assert!(begin <= commit && commit <= end);
            assert!(end - begin <= 16);
            if let Some(slowest) = rb.slowest_cursor() {
                assert!(slowest >= begin);
            }
            std::thread::yield_now();
        }
        producer.join().unwrap();

        let deadline = Instant::now() + Duration::from_secs(10);
        while log.lock().len() < 501 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        sub.unsubscribe();

        let log = log.lock();
        assert_eq!(log.len(), 501);
        let values: Vec<u64> = log[..500].iter().map(|s| s.parse().unwrap()).collect();
        assert_eq!(values, (0..500).collect::<Vec<_>>());
        assert_eq!(log[500], "complete");
    }

    #[test]
    fn test_close_unblocks_waiting_writer() {
        let rb = ring(SubjectConfig::default().with_capacity(16));
        let sched = concurrent();
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock();
        let g = gate.clone();
        let sub = Subscriber::new();
        rb.subscribe(
            Observer::new(move |_| {
                let _wait = g.lock();
            }),
            sched,
            sub.clone(),
        );

        let producer = {
            let rb = rb.clone();
            std::thread::spawn(move || {
                for v in 0..100 {
                    rb.next(v);
                }
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        assert!(!producer.is_finished());
        rb.complete();
        producer.join().unwrap();
        drop(held);
        sub.unsubscribe();
        assert!(rb.indices().1 < 100);
    }
}
