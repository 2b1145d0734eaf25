//! Sources that emit no values: empty, error and never

use crate::error::Failure;
use crate::publisher::Publisher;
use crate::subscriber::{BoxSubscriber, Subscriber};
use crate::subscription::{EmptySubscription, Flag, Subscription};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

use super::iter::IterSubscription;

/// When an error source delivers its failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorTiming {
    /// Right after `on_subscribe`, whether or not anything was requested
    #[default]
    OnSubscribe,
    /// On the first `request`
    OnRequest,
}

/// Subscribe `subscriber`, then terminate it with `failure` or completion
/// unless it cancelled from inside `on_subscribe`
pub(crate) fn terminate<T>(subscriber: &mut BoxSubscriber<T>, failure: Option<Failure>) {
    let subscription = Arc::new(EmptySubscription::default());
    subscriber.on_subscribe(subscription.clone());
    if subscription.is_cancelled() {
        debug!("Cancelled during on_subscribe, dropping terminal signal");
        return;
    }
    match failure {
        Some(failure) => subscriber.on_error(failure),
        None => subscriber.on_complete(),
    }
}

/// Completes right after `on_subscribe`
pub(crate) struct Empty<T>(PhantomData<fn() -> T>);

impl<T> Empty<T> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Send + 'static> Publisher<T> for Empty<T> {
    fn subscribe(&self, mut subscriber: BoxSubscriber<T>) {
        terminate(&mut subscriber, None);
    }
}

/// Fails with a fixed failure
pub(crate) struct ErrorSource<T> {
    failure: Failure,
    timing: ErrorTiming,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ErrorSource<T> {
    pub(crate) fn new(failure: Failure, timing: ErrorTiming) -> Self {
        Self {
            failure,
            timing,
            _marker: PhantomData,
        }
    }
}

impl<T: Send + 'static> Publisher<T> for ErrorSource<T> {
    fn subscribe(&self, mut subscriber: BoxSubscriber<T>) {
        match self.timing {
            ErrorTiming::OnSubscribe => terminate(&mut subscriber, Some(self.failure.clone())),
            ErrorTiming::OnRequest => {
                let items = std::iter::once(Err::<T, Failure>(self.failure.clone()));
                IterSubscription::start(items, subscriber);
            }
        }
    }
}

/// Never signals anything
pub(crate) struct Never<T>(PhantomData<fn() -> T>);

impl<T> Never<T> {
    pub(crate) fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T: Send + 'static> Publisher<T> for Never<T> {
    fn subscribe(&self, mut subscriber: BoxSubscriber<T>) {
        let subscription = Arc::new(NeverSubscription {
            parked: Mutex::new(None),
            cancelled: Flag::new(),
        });
        subscriber.on_subscribe(subscription.clone());
        // Keep the subscriber alive until cancelled
        if !subscription.cancelled.is_raised() {
            *subscription.parked.lock() = Some(subscriber);
        }
    }
}

struct NeverSubscription<T> {
    parked: Mutex<Option<BoxSubscriber<T>>>,
    cancelled: Flag,
}

impl<T: Send + 'static> Subscription for NeverSubscription<T> {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {
        if self.cancelled.raise() {
            debug!("Never source cancelled");
            self.parked.lock().take();
        }
    }
}
