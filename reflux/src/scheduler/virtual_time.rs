//! Virtual-clock scheduler for deterministic tests
//!
//! Time only moves when a caller advances it. Advancing fires every due task
//! synchronously, ordered by target time and then by submission order:
//!
//! - same advance → same tasks fire, in the same order
//! - tasks scheduled while firing are eligible within the same advance
//! - no wall-clock dependencies
//!
//! # Example
//!
//! ```
//! use reflux::scheduler::{Scheduler, VirtualTimeScheduler};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! let scheduler = VirtualTimeScheduler::new();
//! let fired = Arc::new(AtomicU32::new(0));
//!
//! let f = fired.clone();
//! scheduler.schedule_at(Duration::from_secs(3600), Box::new(move || {
//!     f.fetch_add(1, Ordering::SeqCst);
//! }));
//!
//! scheduler.advance_by(Duration::from_secs(3600));
//! assert_eq!(fired.load(Ordering::SeqCst), 1);
//! ```

use super::{Scheduler, Task, TaskHandle};
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::Duration;
use tracing::trace;

/// A task waiting in the virtual queue
struct VirtualTask {
    /// Virtual time at which the task fires
    deadline: Duration,
    /// Submission order, breaks deadline ties
    seq: u64,
    task: Task,
    handle: TaskHandle,
}

impl Eq for VirtualTask {}

impl PartialEq for VirtualTask {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for VirtualTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap ordering: earliest deadline first, then lowest seq
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for VirtualTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct VirtualState {
    now: Duration,
    next_seq: u64,
    queue: BinaryHeap<VirtualTask>,
}

/// Scheduler whose clock is advanced explicitly by the caller
pub struct VirtualTimeScheduler {
    state: Mutex<VirtualState>,
}

impl Default for VirtualTimeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTimeScheduler {
    /// Create a scheduler whose clock starts at zero
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VirtualState {
                now: Duration::ZERO,
                next_seq: 0,
                queue: BinaryHeap::new(),
            }),
        }
    }

    /// Move the clock forward by `duration`, firing every task that falls
    /// due on the way
    pub fn advance_by(&self, duration: Duration) {
        let target = self.state.lock().now.saturating_add(duration);
        self.advance_to(target);
    }

    /// Move the clock to `instant`. Instants in the past only fire tasks
    /// already due.
    pub fn advance_to(&self, instant: Duration) {
        let mut fired = 0usize;
        loop {
            // Pop under the lock, run outside it so tasks can schedule more
            let next = {
                let mut state = self.state.lock();
                let target = instant.max(state.now);
                match state.queue.peek() {
                    Some(task) if task.deadline <= target => {
                        let task = state.queue.pop();
                        if let Some(task) = task.as_ref() {
                            state.now = state.now.max(task.deadline);
                        }
                        task
                    }
                    _ => {
                        state.now = target;
                        None
                    }
                }
            };

            let Some(entry) = next else { break };
            if entry.handle.is_cancelled() {
                continue;
            }
            fired += 1;
            (entry.task)();
        }
        trace!("Virtual clock advanced to {:?}, {} task(s) fired", instant, fired);
    }

    /// Fire the tasks that are already due without moving the clock
    pub fn advance(&self) {
        self.advance_by(Duration::ZERO);
    }

    /// Number of queued tasks that were not cancelled
    pub fn pending_tasks(&self) -> usize {
        self.state
            .lock()
            .queue
            .iter()
            .filter(|task| !task.handle.is_cancelled())
            .count()
    }
}

impl Scheduler for VirtualTimeScheduler {
    fn now(&self) -> Duration {
        self.state.lock().now
    }

    fn schedule_at(&self, delay: Duration, task: Task) -> TaskHandle {
        let handle = TaskHandle::new();
        let mut state = self.state.lock();
        let deadline = state.now.saturating_add(delay);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.push(VirtualTask {
            deadline,
            seq,
            task,
            handle: handle.clone(),
        });
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recorder() -> (Arc<Mutex<Vec<(&'static str, Duration)>>>, Arc<VirtualTimeScheduler>) {
        (
            Arc::new(Mutex::new(Vec::new())),
            Arc::new(VirtualTimeScheduler::new()),
        )
    }

    #[test]
    fn test_fires_in_deadline_then_submission_order() {
        let (log, scheduler) = recorder();
        for (name, ms) in [("c", 30), ("a", 10), ("b1", 20), ("b2", 20)] {
            let log = log.clone();
            let s = scheduler.clone();
            scheduler.schedule_at(
                Duration::from_millis(ms),
                Box::new(move || log.lock().push((name, s.now()))),
            );
        }

        scheduler.advance_by(Duration::from_millis(25));
        assert_eq!(
            *log.lock(),
            vec![
                ("a", Duration::from_millis(10)),
                ("b1", Duration::from_millis(20)),
                ("b2", Duration::from_millis(20)),
            ]
        );
        assert_eq!(scheduler.now(), Duration::from_millis(25));
        assert_eq!(scheduler.pending_tasks(), 1);
    }

    #[test]
    fn test_cascading_tasks_fire_within_same_advance() {
        let (log, scheduler) = recorder();

        fn reschedule(
            scheduler: Arc<VirtualTimeScheduler>,
            log: Arc<Mutex<Vec<(&'static str, Duration)>>>,
        ) {
            let s = scheduler.clone();
            scheduler.schedule_at(
                Duration::from_millis(100),
                Box::new(move || {
                    log.lock().push(("tick", s.now()));
                    reschedule(s, log);
                }),
            );
        }
        reschedule(scheduler.clone(), log.clone());

        scheduler.advance_by(Duration::from_millis(350));
        let times: Vec<_> = log.lock().iter().map(|(_, t)| t.as_millis()).collect();
        assert_eq!(times, vec![100, 200, 300]);
        assert_eq!(scheduler.now(), Duration::from_millis(350));
    }

    #[test]
    fn test_cancelled_task_is_skipped() {
        let (log, scheduler) = recorder();
        let l = log.clone();
        let handle = scheduler.schedule_at(
            Duration::from_secs(1),
            Box::new(move || l.lock().push(("never", Duration::ZERO))),
        );
        handle.cancel();

        scheduler.advance_by(Duration::from_secs(2));
        assert!(log.lock().is_empty());
        assert_eq!(scheduler.pending_tasks(), 0);
    }

    #[test]
    fn test_zero_delay_runs_on_next_advance() {
        let (log, scheduler) = recorder();
        let l = log.clone();
        scheduler.schedule_at(Duration::ZERO, Box::new(move || l.lock().push(("now", Duration::ZERO))));
        assert!(log.lock().is_empty());

        scheduler.advance();
        assert_eq!(log.lock().len(), 1);
    }
}
