//! Virtual Time Example
//!
//! Runs an hour of one-second ticks against a virtual clock, then a short
//! pipeline on the real clock.
//!
//! Usage:
//!   RUST_LOG=info cargo run --example virtual_time

use reflux::scheduler::{self, Scheduler, VirtualTimeScheduler};
use reflux::{Flux, Mono};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc;
use std::time::{Duration, Instant};

fn main() {
    tracing_subscriber::fmt::init();

    println!("⏱️  Reflux - Virtual Time Example\n");

    // Example 1: an hour of ticks, instantly
    println!("1. interval(1s).take(3600) on a virtual clock");
    let clock = Arc::new(VirtualTimeScheduler::new());
    let guard = scheduler::set_default(clock.clone());

    let count = Arc::new(AtomicU64::new(0));
    let counter = count.clone();
    let started = Instant::now();
    Flux::interval(Duration::from_secs(1)).take(3600).subscribe_with(
        move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        },
        |failure| eprintln!("   error: {}", failure),
        || println!("   completed"),
    );

    clock.advance_by(Duration::from_secs(3600));
    println!(
        "   {} ticks, virtual clock at {:?}, real time {:?}\n",
        count.load(Ordering::Relaxed),
        clock.now(),
        started.elapsed()
    );
    drop(guard);

    // Example 2: the same operators on the real clock
    println!("2. Logged pipeline on the real clock");
    let (done_tx, done_rx) = mpsc::channel();
    Flux::interval(Duration::from_millis(50))
        .take(5)
        .map(|tick| tick * tick)
        .log("squares")
        .concat_with(Mono::just(100))
        .subscribe_with(
            |value| println!("   value: {}", value),
            |failure| eprintln!("   error: {}", failure),
            move || {
                let _ = done_tx.send(());
            },
        );

    let _ = done_rx.recv_timeout(Duration::from_secs(5));
    println!("   ✅ Done");
}
