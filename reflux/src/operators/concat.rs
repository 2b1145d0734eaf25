//! Sequential concatenation of publishers

use crate::error::Failure;
use crate::publisher::{Publisher, PublisherRef};
use crate::subscriber::{BoxSubscriber, Subscriber};
use crate::subscription::{Flag, Subscription, SubscriptionRef, UNBOUNDED};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Subscribes to each source in turn once the previous one completed
pub(crate) struct Concat<T> {
    sources: Arc<[PublisherRef<T>]>,
}

impl<T> Concat<T> {
    pub(crate) fn new(sources: Vec<PublisherRef<T>>) -> Self {
        Self {
            sources: sources.into(),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for Concat<T> {
    fn subscribe(&self, mut subscriber: BoxSubscriber<T>) {
        let arbiter = Arc::new(ConcatArbiter {
            sources: self.sources.clone(),
            downstream: Mutex::new(None),
            state: Mutex::new(ArbiterState {
                current: None,
                requested: 0,
            }),
            cancelled: Flag::new(),
        });

        // No source is attached yet, so requests made here are only recorded
        subscriber.on_subscribe(arbiter.clone());
        if arbiter.cancelled.is_raised() {
            return;
        }
        *arbiter.downstream.lock() = Some(subscriber);

        arbiter.subscribe_source(0);
    }
}

struct ArbiterState {
    current: Option<SubscriptionRef>,
    requested: u64,
}

/// The downstream's stable subscription across source switches. Carries
/// unfulfilled demand over to the next source.
struct ConcatArbiter<T> {
    sources: Arc<[PublisherRef<T>]>,
    downstream: Mutex<Option<BoxSubscriber<T>>>,
    state: Mutex<ArbiterState>,
    cancelled: Flag,
}

impl<T: Send + 'static> ConcatArbiter<T> {
    fn subscribe_source(self: &Arc<Self>, index: usize) {
        match self.sources.get(index) {
            Some(source) => {
                debug!("concat switching to source {}", index);
                source.subscribe(Box::new(ConcatSubscriber {
                    arbiter: self.clone(),
                    index,
                }));
            }
            None => {
                let downstream = self.downstream.lock().take();
                if let Some(mut downstream) = downstream {
                    downstream.on_complete();
                }
            }
        }
    }

    fn set_current(&self, subscription: SubscriptionRef) {
        let requested = {
            let mut state = self.state.lock();
            state.current = Some(subscription.clone());
            state.requested
        };
        if self.cancelled.is_raised() {
            subscription.cancel();
        } else if requested > 0 {
            subscription.request(requested);
        }
    }

    fn produced(&self) {
        let mut state = self.state.lock();
        if state.requested != UNBOUNDED {
            state.requested = state.requested.saturating_sub(1);
        }
    }
}

impl<T: Send + 'static> Subscription for ConcatArbiter<T> {
    fn request(&self, n: u64) {
        let current = {
            let mut state = self.state.lock();
            state.requested = state.requested.saturating_add(n);
            state.current.clone()
        };
        if let Some(current) = current {
            current.request(n);
        }
    }

    fn cancel(&self) {
        if !self.cancelled.raise() {
            return;
        }
        let current = self.state.lock().current.take();
        if let Some(current) = current {
            current.cancel();
        }
        // Busy means a value is being delivered; the sender drops it afterwards
        if let Some(mut downstream) = self.downstream.try_lock() {
            downstream.take();
        }
    }
}

struct ConcatSubscriber<T> {
    arbiter: Arc<ConcatArbiter<T>>,
    index: usize,
}

impl<T: Send + 'static> Subscriber<T> for ConcatSubscriber<T> {
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        self.arbiter.set_current(subscription);
    }

    fn on_next(&mut self, value: T) {
        self.arbiter.produced();
        if let Some(subscriber) = self.arbiter.downstream.lock().as_mut() {
            subscriber.on_next(value);
        }
        // A cancel that found the downstream busy, from inside on_next or from
        // another thread, leaves releasing it to the sender
        if self.arbiter.cancelled.is_raised() {
            self.arbiter.downstream.lock().take();
        }
    }

    fn on_error(&mut self, failure: Failure) {
        let downstream = self.arbiter.downstream.lock().take();
        if let Some(mut downstream) = downstream {
            downstream.on_error(failure);
        }
    }

    fn on_complete(&mut self) {
        self.arbiter.state.lock().current = None;
        if self.arbiter.cancelled.is_raised() {
            return;
        }
        self.arbiter.subscribe_source(self.index + 1);
    }
}
