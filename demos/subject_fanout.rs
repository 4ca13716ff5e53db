//! # Example: subject_fanout
//!
//! One producer thread feeds a replay subject; three subscribers drain it at
//! different paces on the concurrent scheduler, and a late subscriber joins
//! after the producer finished and only sees the retained window.
//!
//! ## Flow
//! ```text
//! producer thread ── next(0..N) ──► RingBuffer (capacity 64, keep 4)
//!                                      ├─► fast reader
//!                                      ├─► slow reader (sleeps per item, throttles the producer)
//!                                      ├─► counting reader
//!                                      └─► late reader (after complete: last 4 items)
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example subject_fanout
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rill::{SubjectConfig, SubscribeOptions, Subject, concurrent};

const ITEMS: u32 = 500;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Small ring so the slow reader visibly throttles the producer.
    let subject = Subject::new(SubjectConfig::default().with_capacity(64).with_keep(4));
    let sched = concurrent();

    // 2. Three live subscribers.
    let fast = subject.observable().subscribe_fn(
        |v: u32| {
            if v % 100 == 0 {
                println!("[fast] {v}");
            }
        },
        |e| println!("[fast] error: {e}"),
        || println!("[fast] complete"),
        SubscribeOptions::new().with_scheduler(sched.clone()),
    );
    let slow = subject.observable().subscribe_fn(
        |v: u32| {
            std::thread::sleep(Duration::from_micros(200));
            if v % 100 == 0 {
                println!("[slow] {v}");
            }
        },
        |e| println!("[slow] error: {e}"),
        || println!("[slow] complete"),
        SubscribeOptions::new().with_scheduler(sched.clone()),
    );
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    let counting = subject.observable().subscribe_fn(
        move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        },
        |_| {},
        || {},
        SubscribeOptions::new().with_scheduler(sched.clone()),
    );
    println!("subscribers: {}", subject.buffer().subscriber_count());

    // 3. Produce from a plain thread.
    let tx = subject.observer();
    let producer = std::thread::spawn(move || {
        for v in 0..ITEMS {
            tx.next(v);
        }
        tx.complete();
    });
    producer.join().map_err(|_| "producer panicked")?;

    for sub in [fast, slow, counting] {
        sub.wait()?;
    }
    println!("counting reader saw {} items", seen.load(Ordering::Relaxed));

    let (begin, commit, end) = subject.buffer().indices();
    println!("ring indices: begin={begin} commit={commit} end={end}");

    // 4. A late subscriber gets the retained window, then the terminal.
    let late = subject.observable().to_vec(sched)?;
    println!("late subscriber: {late:?}");
    Ok(())
}
