//! # Reflux
//!
//! Minimal reactive-streams core: cold publishers with pull-based backpressure
//!
//! ## Features
//!
//! - 📨 **Flux / Mono**: publishers of `0..N` and `0..1` values
//! - 🔁 **Backpressure**: values only flow against `request(n)` demand
//! - 🧩 **Operators**: map, filter, flat_map, take, concat and side-effect hooks
//! - ⏱️ **Schedulers**: tokio-backed wall-clock timers and a virtual clock
//! - 🌊 **Streams**: consume any flux as a `futures::Stream`
//!
//! ## Quick Start
//!
//! ```rust
//! use reflux::{Flux, scheduler::{self, VirtualTimeScheduler}};
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//!
//! let clock = Arc::new(VirtualTimeScheduler::new());
//! let _guard = scheduler::set_default(clock.clone());
//!
//! let ticks = Arc::new(Mutex::new(Vec::new()));
//! let sink = ticks.clone();
//! Flux::interval(Duration::from_secs(1))
//!     .take(3)
//!     .subscribe_with(move |tick| sink.lock().unwrap().push(tick), |_| {}, || {});
//!
//! clock.advance_by(Duration::from_secs(3));
//! assert_eq!(*ticks.lock().unwrap(), vec![0, 1, 2]);
//! ```

pub mod error;
pub mod flux;
pub mod mono;
mod operators;
pub mod publisher;
pub mod scheduler;
pub mod signal;
mod source;
pub mod stream;
pub mod subscriber;
pub mod subscription;

pub use error::{Failure, ReactiveError, Result};
pub use flux::Flux;
pub use mono::Mono;
pub use operators::DEFAULT_PREFETCH;
pub use publisher::{Publisher, PublisherRef};
pub use scheduler::{Scheduler, TaskHandle};
pub use signal::Signal;
pub use source::ErrorTiming;
pub use stream::SignalStream;
pub use subscriber::{BoxSubscriber, Disposable, Subscriber};
pub use subscription::{EmptySubscription, Subscription, SubscriptionRef, UNBOUNDED};
