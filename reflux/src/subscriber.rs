//! Consumer side of the protocol

use crate::error::Failure;
use crate::subscription::{Flag, SubscriptionRef, UNBOUNDED};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::debug;

/// Subscriber trait - receives the signals of one run
///
/// `on_subscribe` is always called first. Afterwards the producer calls
/// `on_next` at most as often as requested, followed by at most one of
/// `on_error` / `on_complete`. Calls are never concurrent.
pub trait Subscriber<T>: Send {
    fn on_subscribe(&mut self, subscription: SubscriptionRef);
    fn on_next(&mut self, value: T);
    fn on_error(&mut self, failure: Failure);
    fn on_complete(&mut self);
}

/// Owned, type-erased subscriber
pub type BoxSubscriber<T> = Box<dyn Subscriber<T>>;

/// Handle returned by callback subscriptions
#[derive(Clone)]
pub struct Disposable {
    subscription: Arc<Mutex<Option<SubscriptionRef>>>,
    disposed: Arc<Flag>,
}

impl Disposable {
    fn new() -> Self {
        Self {
            subscription: Arc::new(Mutex::new(None)),
            disposed: Arc::new(Flag::new()),
        }
    }

    /// Cancel the underlying subscription
    pub fn dispose(&self) {
        if !self.disposed.raise() {
            return;
        }
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            debug!("Disposing callback subscription");
            subscription.cancel();
        }
    }

    /// Check if `dispose` was called
    pub fn is_disposed(&self) -> bool {
        self.disposed.is_raised()
    }
}

/// Subscriber built from three callbacks, requesting unbounded demand
pub(crate) struct LambdaSubscriber<N, E, C> {
    next: N,
    error: E,
    complete: C,
    handle: Disposable,
}

impl<N, E, C> LambdaSubscriber<N, E, C> {
    pub(crate) fn new(next: N, error: E, complete: C) -> (Self, Disposable) {
        let handle = Disposable::new();
        let subscriber = Self {
            next,
            error,
            complete,
            handle: handle.clone(),
        };
        (subscriber, handle)
    }

    fn release(&self) {
        self.handle.subscription.lock().take();
    }
}

impl<T, N, E, C> Subscriber<T> for LambdaSubscriber<N, E, C>
where
    N: FnMut(T) + Send,
    E: FnMut(Failure) + Send,
    C: FnMut() + Send,
{
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        if self.handle.is_disposed() {
            subscription.cancel();
            return;
        }
        *self.handle.subscription.lock() = Some(subscription.clone());
        subscription.request(UNBOUNDED);
    }

    fn on_next(&mut self, value: T) {
        (self.next)(value);
    }

    fn on_error(&mut self, failure: Failure) {
        self.release();
        (self.error)(failure);
    }

    fn on_complete(&mut self) {
        self.release();
        (self.complete)();
    }
}
