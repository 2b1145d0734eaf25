//! Periodic counter driven by a scheduler

use crate::error::ReactiveError;
use crate::publisher::Publisher;
use crate::scheduler::{Scheduler, TaskHandle};
use crate::subscriber::BoxSubscriber;
use crate::subscription::{Demand, Flag, Subscription, SubscriptionRef};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Emits 0, 1, 2, ... every `period`, the first one after `delay`
pub(crate) struct Interval {
    delay: Duration,
    period: Duration,
    scheduler: Arc<dyn Scheduler>,
}

impl Interval {
    pub(crate) fn new(delay: Duration, period: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            delay,
            period,
            scheduler,
        }
    }
}

impl Publisher<u64> for Interval {
    fn subscribe(&self, subscriber: BoxSubscriber<u64>) {
        let run = IntervalRun::new(self.delay, self.period, self.scheduler.clone(), subscriber);

        {
            let subscription: SubscriptionRef = run.clone();
            let mut guard = run.subscriber.lock();
            if let Some(subscriber) = guard.as_mut() {
                subscriber.on_subscribe(subscription);
            }
            if run.cancelled.is_raised() {
                guard.take();
                return;
            }
        }

        run.schedule_next();
    }
}

struct IntervalRun {
    subscriber: Mutex<Option<BoxSubscriber<u64>>>,
    requested: Demand,
    cancelled: Flag,
    invalid_request: AtomicBool,
    ticks: AtomicU64,
    task: Mutex<Option<TaskHandle>>,
    delay: Duration,
    period: Duration,
    start: Duration,
    scheduler: Arc<dyn Scheduler>,
}

impl IntervalRun {
    fn new(
        delay: Duration,
        period: Duration,
        scheduler: Arc<dyn Scheduler>,
        subscriber: BoxSubscriber<u64>,
    ) -> Arc<Self> {
        Arc::new(IntervalRun {
            subscriber: Mutex::new(Some(subscriber)),
            requested: Demand::new(),
            cancelled: Flag::new(),
            invalid_request: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            task: Mutex::new(None),
            delay,
            period,
            start: scheduler.now(),
            scheduler,
        })
    }

    /// Schedule the next tick, anchored to the subscription start so the
    /// period does not drift
    fn schedule_next(self: &Arc<Self>) {
        let emitted = self.ticks.load(Ordering::Acquire);
        let periods = u32::try_from(emitted).unwrap_or(u32::MAX);
        let due = self
            .start
            .saturating_add(self.delay)
            .saturating_add(self.period.saturating_mul(periods));
        let delay = due.saturating_sub(self.scheduler.now());

        let this = Arc::clone(self);
        let handle = self
            .scheduler
            .schedule_at(delay, Box::new(move || this.tick()));
        *self.task.lock() = Some(handle);

        // A cancel racing with the store above might have missed the handle,
        // and one that found the subscriber busy in the last tick left it here
        if self.cancelled.is_raised() {
            if let Some(handle) = self.task.lock().take() {
                handle.cancel();
            }
            self.subscriber.lock().take();
        }
    }

    fn tick(self: &Arc<Self>) {
        if self.cancelled.is_raised() {
            return;
        }
        let tick = self.ticks.fetch_add(1, Ordering::AcqRel);

        {
            let mut guard = self.subscriber.lock();
            if guard.is_none() {
                return;
            }

            if self.invalid_request.swap(false, Ordering::AcqRel) {
                self.cancelled.raise();
                if let Some(mut subscriber) = guard.take() {
                    subscriber.on_error(ReactiveError::NonPositiveRequest(0).into());
                }
                return;
            }

            if self.requested.current() == 0 {
                warn!("Interval tick {} found no outstanding demand", tick);
                self.cancelled.raise();
                if let Some(mut subscriber) = guard.take() {
                    subscriber.on_error(ReactiveError::Overflow { tick }.into());
                }
                return;
            }

            self.requested.produced(1);
            if let Some(subscriber) = guard.as_mut() {
                subscriber.on_next(tick);
            }

            // Cancelled from inside on_next: release the subscriber here since
            // cancel could not take the lock
            if self.cancelled.is_raised() {
                guard.take();
                return;
            }
        }

        self.schedule_next();
    }
}

impl Subscription for IntervalRun {
    fn request(&self, n: u64) {
        if n == 0 {
            self.invalid_request.store(true, Ordering::Release);
            return;
        }
        self.requested.add(n);
    }

    fn cancel(&self) {
        if !self.cancelled.raise() {
            return;
        }
        debug!("Interval cancelled after {} tick(s)", self.ticks.load(Ordering::Acquire));
        if let Some(handle) = self.task.lock().take() {
            handle.cancel();
        }
        // Busy means a tick is delivering right now; it drops the subscriber
        if let Some(mut guard) = self.subscriber.try_lock() {
            guard.take();
        }
    }
}
