//! Predicate filtering

use crate::error::Failure;
use crate::publisher::{Publisher, PublisherRef};
use crate::subscriber::{BoxSubscriber, Subscriber};
use crate::subscription::SubscriptionRef;
use std::sync::Arc;

pub(crate) type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Forwards values matching the predicate. Every dropped value is
/// replaced by a request for one more upstream value so the downstream
/// demand is still met.
pub(crate) struct Filter<T> {
    source: PublisherRef<T>,
    predicate: Predicate<T>,
}

impl<T> Filter<T> {
    pub(crate) fn new(source: PublisherRef<T>, predicate: Predicate<T>) -> Self {
        Self { source, predicate }
    }
}

impl<T: Send + 'static> Publisher<T> for Filter<T> {
    fn subscribe(&self, subscriber: BoxSubscriber<T>) {
        self.source.subscribe(Box::new(FilterSubscriber {
            downstream: subscriber,
            predicate: self.predicate.clone(),
            upstream: None,
        }));
    }
}

struct FilterSubscriber<T> {
    downstream: BoxSubscriber<T>,
    predicate: Predicate<T>,
    upstream: Option<SubscriptionRef>,
}

impl<T: Send + 'static> Subscriber<T> for FilterSubscriber<T> {
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        self.upstream = Some(subscription.clone());
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, value: T) {
        if (self.predicate)(&value) {
            self.downstream.on_next(value);
        } else if let Some(upstream) = &self.upstream {
            upstream.request(1);
        }
    }

    fn on_error(&mut self, failure: Failure) {
        self.upstream = None;
        self.downstream.on_error(failure);
    }

    fn on_complete(&mut self) {
        self.upstream = None;
        self.downstream.on_complete();
    }
}
