//! One-to-one transformation

use crate::error::Failure;
use crate::publisher::{Publisher, PublisherRef};
use crate::subscriber::{BoxSubscriber, Subscriber};
use crate::subscription::SubscriptionRef;
use std::sync::Arc;
use tracing::warn;

pub(crate) type Mapper<T, R> = Arc<dyn Fn(T) -> Result<R, Failure> + Send + Sync>;

/// Applies a fallible mapper to every value; a failure terminates the run
pub(crate) struct Map<T, R> {
    source: PublisherRef<T>,
    mapper: Mapper<T, R>,
}

impl<T, R> Map<T, R> {
    pub(crate) fn new(source: PublisherRef<T>, mapper: Mapper<T, R>) -> Self {
        Self { source, mapper }
    }
}

impl<T, R> Publisher<R> for Map<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn subscribe(&self, subscriber: BoxSubscriber<R>) {
        self.source.subscribe(Box::new(MapSubscriber {
            downstream: subscriber,
            mapper: self.mapper.clone(),
            upstream: None,
            done: false,
        }));
    }
}

struct MapSubscriber<T, R> {
    downstream: BoxSubscriber<R>,
    mapper: Mapper<T, R>,
    upstream: Option<SubscriptionRef>,
    done: bool,
}

impl<T, R> Subscriber<T> for MapSubscriber<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        self.upstream = Some(subscription.clone());
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, value: T) {
        if self.done {
            warn!("map dropped a value delivered after termination");
            return;
        }
        match (self.mapper)(value) {
            Ok(mapped) => self.downstream.on_next(mapped),
            Err(failure) => {
                self.done = true;
                if let Some(upstream) = self.upstream.take() {
                    upstream.cancel();
                }
                self.downstream.on_error(failure);
            }
        }
    }

    fn on_error(&mut self, failure: Failure) {
        if self.done {
            warn!("map dropped an error delivered after termination: {}", failure);
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
