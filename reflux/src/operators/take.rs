//! Cardinality limiter

use crate::error::Failure;
use crate::publisher::{Publisher, PublisherRef};
use crate::subscriber::{BoxSubscriber, Subscriber};
use crate::source::empty::terminate;
use crate::subscription::{Flag, Subscription, SubscriptionRef};
use std::sync::Arc;
use tracing::debug;

/// Passes the first `limit` values, then completes and cancels upstream
pub(crate) struct Take<T> {
    source: PublisherRef<T>,
    limit: u64,
}

impl<T> Take<T> {
    pub(crate) fn new(source: PublisherRef<T>, limit: u64) -> Self {
        Self { source, limit }
    }
}

impl<T: Send + 'static> Publisher<T> for Take<T> {
    fn subscribe(&self, subscriber: BoxSubscriber<T>) {
        self.source.subscribe(Box::new(TakeSubscriber {
            downstream: subscriber,
            remaining: self.limit,
            upstream: None,
            done: false,
        }));
    }
}

/// Guards upstream cancellation so it happens exactly once, whether the
/// limit is reached or the downstream cancels
struct TakeSubscription {
    upstream: SubscriptionRef,
    cancelled: Flag,
}

impl Subscription for TakeSubscription {
    fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        if self.cancelled.raise() {
            self.upstream.cancel();
        }
    }
}

struct TakeSubscriber<T> {
    downstream: BoxSubscriber<T>,
    remaining: u64,
    upstream: Option<Arc<TakeSubscription>>,
    done: bool,
}

impl<T: Send + 'static> Subscriber<T> for TakeSubscriber<T> {
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        let guarded = Arc::new(TakeSubscription {
            upstream: subscription,
            cancelled: Flag::new(),
        });

        if self.remaining == 0 {
            self.done = true;
            guarded.cancel();
            terminate(&mut self.downstream, None);
            return;
        }

        self.upstream = Some(guarded.clone());
        self.downstream.on_subscribe(guarded);
    }

    fn on_next(&mut self, value: T) {
        if self.done {
            return;
        }
        self.remaining -= 1;
        self.downstream.on_next(value);

        if self.remaining == 0 {
            self.done = true;
            if let Some(upstream) = self.upstream.take() {
                // Cancelled by the downstream while handling the last value:
                // the run is already over
                let cancelled_downstream = upstream.cancelled.is_raised();
                upstream.cancel();
                if cancelled_downstream {
                    return;
                }
            }
            debug!("take limit reached, completing");
            self.downstream.on_complete();
        }
    }

    fn on_error(&mut self, failure: Failure) {
        if self.done {
            return;
        }
        self.done = true;
        self.upstream = None;
        self.downstream.on_error(failure);
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.upstream = None;
        self.downstream.on_complete();
    }
}
