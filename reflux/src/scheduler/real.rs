//! Wall-clock scheduler backed by a dedicated tokio runtime

use super::{Scheduler, Task, TaskHandle};
use crate::error::ReactiveError;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, trace};

/// Scheduler firing tasks from real timers on a scheduler-owned worker
pub struct RealScheduler {
    runtime: Option<Runtime>,
    epoch: Instant,
}

impl RealScheduler {
    /// Start a scheduler with a single timer worker thread
    pub fn new() -> Result<Self, ReactiveError> {
        Self::with_workers(1)
    }

    /// Start a scheduler with `workers` timer threads
    pub fn with_workers(workers: usize) -> Result<Self, ReactiveError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(workers.max(1))
            .thread_name("reflux-timer")
            .enable_time()
            .build()
            .map_err(|e| ReactiveError::Scheduler(e.to_string()))?;

        debug!("Real scheduler started with {} worker(s)", workers.max(1));

        Ok(Self {
            runtime: Some(runtime),
            epoch: Instant::now(),
        })
    }
}

impl Scheduler for RealScheduler {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn schedule_at(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let Some(runtime) = self.runtime.as_ref() else {
            handle.cancel();
            return handle;
        };

        let guard = handle.clone();
        let join = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if guard.is_cancelled() {
                return;
            }
            trace!("Firing task after {:?}", delay);
            task();
        });

        handle.with_abort(join.abort_handle())
    }
}

impl Drop for RealScheduler {
    fn drop(&mut self) {
        // Dropping a runtime from async context panics, so let it wind down
        // in the background
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Process-wide real scheduler used when no default is installed.
/// A runtime that failed to start keeps reporting the same error.
pub fn shared() -> Result<Arc<RealScheduler>, ReactiveError> {
    static SHARED: OnceLock<Result<Arc<RealScheduler>, ReactiveError>> = OnceLock::new();
    SHARED
        .get_or_init(|| RealScheduler::new().map(Arc::new))
        .clone()
}
