//! Demand and cancellation channel between one producer and one consumer

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Demand value meaning "request everything"
pub const UNBOUNDED: u64 = u64::MAX;

/// Subscription handle - the consumer side of one run
///
/// Both methods may be called from any thread, including from inside a
/// signal callback of the same subscription.
pub trait Subscription: Send + Sync {
    /// Add `n` to the outstanding demand. `n` must be positive.
    fn request(&self, n: u64);

    /// Stop the run. Idempotent.
    fn cancel(&self);
}

/// Shared subscription reference handed to `on_subscribe`
pub type SubscriptionRef = Arc<dyn Subscription>;

/// Subscription with nothing behind it, for sources that terminate
/// right after `on_subscribe`. It only remembers a cancel.
#[derive(Debug, Default)]
pub struct EmptySubscription {
    cancelled: Flag,
}

impl Subscription for EmptySubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {
        self.cancelled.raise();
    }
}

impl EmptySubscription {
    pub fn shared() -> SubscriptionRef {
        Arc::new(EmptySubscription::default())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.is_raised()
    }
}

/// Outstanding demand counter, saturating at [`UNBOUNDED`]
#[derive(Debug, Default)]
pub(crate) struct Demand(AtomicU64);

impl Demand {
    pub(crate) fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Add `n`, returning the previous value
    pub(crate) fn add(&self, n: u64) -> u64 {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return current;
            }
            let next = current.saturating_add(n);
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(previous) => return previous,
                Err(actual) => current = actual,
            }
        }
    }

    /// Account for `n` emitted elements, returning what is left.
    /// Unbounded demand is never decremented.
    pub(crate) fn produced(&self, n: u64) -> u64 {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return current;
            }
            let next = current.saturating_sub(n);
            match self
                .0
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }
}

/// Work-in-progress counter serializing an emission loop.
///
/// The caller that moves the counter away from zero owns the loop; every
/// other caller only records that more work is pending.
#[derive(Debug, Default)]
pub(crate) struct WorkInProgress(AtomicUsize);

impl WorkInProgress {
    pub(crate) fn new() -> Self {
        Self(AtomicUsize::new(0))
    }

    /// Returns true when the caller became the loop owner
    pub(crate) fn enter(&self) -> bool {
        self.0.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Release `missed` units of work, returning how many arrived meanwhile
    pub(crate) fn leave(&self, missed: usize) -> usize {
        self.0.fetch_sub(missed, Ordering::AcqRel) - missed
    }
}

/// One-shot flag, used for idempotent cancellation
#[derive(Debug, Default)]
pub(crate) struct Flag(AtomicBool);

impl Flag {
    pub(crate) fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    /// Raise the flag, returning true only for the first caller
    pub(crate) fn raise(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
