//! Stream Bridge Example
//!
//! Consumes a flux as a `futures::Stream` inside a tokio runtime.
//!
//! Usage:
//!   cargo run --example stream_bridge

use futures::StreamExt;
use reflux::{Flux, Mono};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("🌊 Reflux - Stream Bridge Example\n");

    // Example 1: async capitalization through flat_map
    println!("1. flat_map onto Mono");
    let mut users = Flux::just(["swhite", "jpinkman", "wwhite"])
        .flat_map(|name| Mono::just(name).map(|name| name.to_uppercase()))
        .into_stream();

    while let Some(user) = users.next().await {
        match user {
            Ok(user) => println!("   user: {}", user),
            Err(failure) => return Err(failure.to_string().into()),
        }
    }

    // Example 2: dropping the stream cancels the interval
    println!("\n2. Early drop");
    let ticks: Vec<u64> = Flux::interval(Duration::from_millis(20))
        .log("ticks")
        .into_stream()
        .take(3)
        .filter_map(|tick| async move { tick.ok() })
        .collect()
        .await;
    println!("   received {:?}, subscription cancelled", ticks);

    Ok(())
}
