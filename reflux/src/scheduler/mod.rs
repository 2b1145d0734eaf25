//! Schedulers: the passage of time for time-driven publishers
//!
//! Two implementations share the [`Scheduler`] contract:
//!
//! - [`RealScheduler`] fires tasks from wall-clock timers on its own worker
//! - [`VirtualTimeScheduler`] only moves when a caller advances it
//!
//! Time-driven sources pick up [`current()`] when they are assembled. Tests
//! install a virtual scheduler with [`set_default`] to run hour-long
//! pipelines instantly.

pub mod real;
pub mod virtual_time;

pub use real::RealScheduler;
pub use virtual_time::VirtualTimeScheduler;

use crate::error::ReactiveError;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::AbortHandle;

/// A scheduled unit of work
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Scheduler trait - runs tasks after a delay on its own notion of time
pub trait Scheduler: Send + Sync {
    /// Time elapsed since the scheduler's epoch
    fn now(&self) -> Duration;

    /// Run `task` once `delay` has elapsed
    fn schedule_at(&self, delay: Duration, task: Task) -> TaskHandle;
}

/// Cancellable handle to a scheduled task
#[derive(Clone, Default)]
pub struct TaskHandle {
    cancelled: Arc<AtomicBool>,
    abort: Option<Arc<AbortHandle>>,
}

impl TaskHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = Some(Arc::new(abort));
        self
    }

    /// Prevent the task from running. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(abort) = &self.abort {
            abort.abort();
        }
    }

    /// Check if `cancel` was called
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

thread_local! {
    static DEFAULT: RefCell<Option<Arc<dyn Scheduler>>> = const { RefCell::new(None) };
}

/// The scheduler time-driven sources use on this thread.
///
/// Falls back to the shared real scheduler, which fails if its runtime
/// could not be started.
pub fn current() -> Result<Arc<dyn Scheduler>, ReactiveError> {
    match DEFAULT.with(|slot| slot.borrow().clone()) {
        Some(scheduler) => Ok(scheduler),
        None => real::shared().map(|scheduler| scheduler as Arc<dyn Scheduler>),
    }
}

/// Install `scheduler` as this thread's default until the guard drops
pub fn set_default(scheduler: Arc<dyn Scheduler>) -> DefaultGuard {
    let previous = DEFAULT.with(|slot| slot.borrow_mut().replace(scheduler));
    DefaultGuard { previous }
}

/// Restores the previous default scheduler on drop
#[must_use = "the default scheduler is restored when the guard is dropped"]
pub struct DefaultGuard {
    previous: Option<Arc<dyn Scheduler>>,
}

impl Drop for DefaultGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        DEFAULT.with(|slot| *slot.borrow_mut() = previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_default_scopes_override() {
        let virtual_time = Arc::new(VirtualTimeScheduler::new());
        {
            let _guard = set_default(virtual_time.clone());
            virtual_time.advance_by(Duration::from_secs(5));
            assert_eq!(current().unwrap().now(), Duration::from_secs(5));
        }
        // Back on the shared real scheduler, whose epoch is recent
        assert!(current().unwrap().now() < Duration::from_secs(3600));
    }

    #[test]
    fn test_task_handle_cancel_is_idempotent() {
        let handle = TaskHandle::new();
        assert!(!handle.is_cancelled());
        handle.cancel();
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(handle.clone().is_cancelled());
    }
}
