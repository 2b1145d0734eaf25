//! # Reflux Test
//!
//! Test harness for reflux publishers
//!
//! ## Features
//!
//! - ✅ **StepVerifier**: declare the expected signal script, then verify it
//! - ⏱️ **Virtual time**: run hour-long time-driven pipelines instantly
//! - 🎛️ **TestPublisher**: push signals by hand and assert on demand and cancellation
//!
//! ## Quick Start
//!
//! ```rust
//! use reflux::Flux;
//! use reflux_test::StepVerifier;
//! use std::time::Duration;
//!
//! let elapsed = StepVerifier::with_virtual_time(|| Flux::interval(Duration::from_secs(1)).take(3600))
//!     .then_await(Duration::from_secs(3600))
//!     .expect_next_count(3600)
//!     .expect_complete()
//!     .verify_timeout(Duration::from_secs(1))
//!     .unwrap();
//! assert!(elapsed < Duration::from_secs(1));
//! ```

pub mod error;
pub mod options;
pub mod publisher;
mod recorder;
pub mod verifier;

pub use error::{Result, VerifyError};
pub use options::VerifierOptions;
pub use publisher::{Compliance, TestPublisher};
pub use verifier::{LastStep, StepVerifier};
