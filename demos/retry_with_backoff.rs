//! # Example: retry_with_backoff
//!
//! Demonstrates how [`Observable::retry_with`] resubscribes to a failing source
//! according to a [`BackoffPolicy`], and how the result is consumed as an async
//! stream on the concurrent scheduler.
//!
//! The source fails twice before it succeeds; every attempt's values are
//! forwarded as they arrive.
//!
//! ## Flow
//! ```text
//! subscribe
//!   ├─► attempt 1: next(1) ─► error("boom #1")
//!   ├─► schedule_after(backoff.next(0) ≈ 100ms)
//!   ├─► attempt 2: next(1) ─► error("boom #2")
//!   ├─► schedule_after(backoff.next(1) ≈ 200ms)
//!   └─► attempt 3: next(1) ─► next(2) ─► next(3) ─► complete
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example retry_with_backoff
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use rill::{BackoffPolicy, JitterPolicy, Observable, RxError, concurrent};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. A source that fails on its first two subscriptions.
    let attempts = Arc::new(AtomicU64::new(0));
    let counter = attempts.clone();
    let flaky = Observable::defer(move || {
        let attempt = counter.fetch_add(1, Ordering::Relaxed) + 1;
        println!("[flaky] attempt {attempt}");
        if attempt <= 2 {
            Observable::just(1).concat_with(&Observable::throw(RxError::failed(format!("boom #{attempt}"))))
        } else {
            Observable::from_iter([1, 2, 3])
        }
    });

    // 2. Exponential backoff with equal jitter.
    let backoff = BackoffPolicy {
        first: Duration::from_millis(100),
        max: Duration::from_secs(2),
        factor: 2.0,
        jitter: JitterPolicy::Equal,
    };

    // 3. Consume as an async stream on the concurrent scheduler.
    let start = Instant::now();
    let mut stream = flaky.retry_with(3, backoff).into_stream(concurrent());
    while let Some(item) = stream.next().await {
        match item {
            Ok(v) => println!("[{:>4}ms] value {v}", start.elapsed().as_millis()),
            Err(e) => {
                println!("[{:>4}ms] failed: {e}", start.elapsed().as_millis());
                return Err(e.into());
            }
        }
    }

    println!(
        "done after {} attempts in {}ms",
        attempts.load(Ordering::Relaxed),
        start.elapsed().as_millis()
    );
    Ok(())
}
