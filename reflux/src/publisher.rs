//! Producer side of the protocol

use crate::subscriber::BoxSubscriber;
use std::sync::Arc;

/// Publisher trait - a cold, restartable description of a signal sequence
///
/// Every call to `subscribe` starts an independent run. Implementations hold
/// no per-run state themselves.
pub trait Publisher<T>: Send + Sync {
    fn subscribe(&self, subscriber: BoxSubscriber<T>);
}

/// Shared, type-erased publisher
pub type PublisherRef<T> = Arc<dyn Publisher<T>>;

impl<T, P> Publisher<T> for Arc<P>
where
    P: Publisher<T> + ?Sized,
{
    fn subscribe(&self, subscriber: BoxSubscriber<T>) {
        (**self).subscribe(subscriber)
    }
}
