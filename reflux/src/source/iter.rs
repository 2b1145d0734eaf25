//! Pull-driven sources backed by an iterator

use crate::error::{Failure, ReactiveError};
use crate::publisher::Publisher;
use crate::subscriber::BoxSubscriber;
use crate::subscription::{Demand, Flag, Subscription, SubscriptionRef, WorkInProgress};
use parking_lot::Mutex;
use std::iter::Peekable;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Emits the items of a fresh iterator per subscription
pub(crate) struct FromIter<I> {
    iterable: I,
}

impl<I> FromIter<I> {
    pub(crate) fn new(iterable: I) -> Self {
        Self { iterable }
    }
}

impl<I> Publisher<I::Item> for FromIter<I>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    fn subscribe(&self, subscriber: BoxSubscriber<I::Item>) {
        let items = self.iterable.clone().into_iter().map(Ok);
        IterSubscription::start(items, subscriber);
    }
}

struct IterState<T, It: Iterator> {
    subscriber: Option<BoxSubscriber<T>>,
    items: Peekable<It>,
}

/// Emission loop shared by every iterator-backed source.
///
/// Items are `Result`s so a source can end in an error that is only
/// delivered once demand arrives.
pub(crate) struct IterSubscription<T, It>
where
    It: Iterator<Item = Result<T, Failure>>,
{
    state: Mutex<IterState<T, It>>,
    requested: Demand,
    wip: WorkInProgress,
    cancelled: Flag,
    invalid_request: AtomicU64,
}

impl<T, It> IterSubscription<T, It>
where
    T: Send + 'static,
    It: Iterator<Item = Result<T, Failure>> + Send + 'static,
{
    /// Hand a new subscription to `subscriber` and emit what it requests
    pub(crate) fn start(items: It, subscriber: BoxSubscriber<T>) {
        let this = Arc::new(Self {
            state: Mutex::new(IterState {
                subscriber: Some(subscriber),
                items: items.peekable(),
            }),
            requested: Demand::new(),
            wip: WorkInProgress::new(),
            cancelled: Flag::new(),
            invalid_request: AtomicU64::new(0),
        });

        // Own the loop while on_subscribe runs so requests made from inside
        // it are only recorded
        this.wip.enter();
        {
            let subscription: SubscriptionRef = this.clone();
            let mut state = this.state.lock();
            if let Some(subscriber) = state.subscriber.as_mut() {
                subscriber.on_subscribe(subscription);
            }
        }
        this.drain_loop(1);
    }

    fn drain(&self) {
        if self.wip.enter() {
            self.drain_loop(1);
        }
    }

    fn drain_loop(&self, mut missed: usize) {
        loop {
            {
                let mut state = self.state.lock();
                self.emit(&mut state);
            }
            missed = self.wip.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }

    fn emit(&self, state: &mut IterState<T, It>) {
        loop {
            if state.subscriber.is_none() {
                return;
            }
            if self.cancelled.is_raised() {
                state.subscriber = None;
                return;
            }

            let invalid = self.invalid_request.swap(0, Ordering::AcqRel);
            if invalid != 0 {
                self.cancelled.raise();
                if let Some(mut subscriber) = state.subscriber.take() {
                    subscriber.on_error(ReactiveError::NonPositiveRequest(0).into());
                }
                return;
            }

            if state.items.peek().is_none() {
                if let Some(mut subscriber) = state.subscriber.take() {
                    subscriber.on_complete();
                }
                return;
            }

            if self.requested.current() == 0 {
                return;
            }

            match state.items.next() {
                Some(Ok(value)) => {
                    self.requested.produced(1);
                    if let Some(subscriber) = state.subscriber.as_mut() {
                        subscriber.on_next(value);
                    }
                }
                Some(Err(failure)) => {
                    self.cancelled.raise();
                    if let Some(mut subscriber) = state.subscriber.take() {
                        subscriber.on_error(failure);
                    }
                    return;
                }
                None => {}
            }
        }
    }
}

impl<T, It> Subscription for IterSubscription<T, It>
where
    T: Send + 'static,
    It: Iterator<Item = Result<T, Failure>> + Send + 'static,
{
    fn request(&self, n: u64) {
        if n == 0 {
            self.invalid_request.store(1, Ordering::Release);
        } else {
            self.requested.add(n);
        }
        self.drain();
    }

    fn cancel(&self) {
        if self.cancelled.raise() {
            debug!("Iterator source cancelled");
            self.drain();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use crate::subscriber::Subscriber;
    use crate::subscription::UNBOUNDED;

    type Trace = Arc<Mutex<Vec<Signal<i32>>>>;

    /// Records signals and keeps the subscription for manual requests
    struct Driver {
        trace: Trace,
        subscription: Arc<Mutex<Option<SubscriptionRef>>>,
        initial: u64,
    }

    impl Subscriber<i32> for Driver {
        fn on_subscribe(&mut self, subscription: SubscriptionRef) {
            *self.subscription.lock() = Some(subscription.clone());
            if self.initial > 0 {
                subscription.request(self.initial);
            }
        }

        fn on_next(&mut self, value: i32) {
            self.trace.lock().push(Signal::Next(value));
        }

        fn on_error(&mut self, failure: Failure) {
            self.trace.lock().push(Signal::Error(failure));
        }

        fn on_complete(&mut self) {
            self.trace.lock().push(Signal::Complete);
        }
    }

    fn driver(initial: u64) -> (Driver, Trace, Arc<Mutex<Option<SubscriptionRef>>>) {
        let trace: Trace = Arc::new(Mutex::new(Vec::new()));
        let subscription = Arc::new(Mutex::new(None));
        let driver = Driver {
            trace: trace.clone(),
            subscription: subscription.clone(),
            initial,
        };
        (driver, trace, subscription)
    }

    fn values(trace: &Trace) -> Vec<i32> {
        trace.lock().iter().filter_map(|s| s.value().copied()).collect()
    }

    #[test]
    fn test_unbounded_request_emits_all() {
        let source = FromIter::new(vec![1, 2, 3]);
        let (driver, trace, _) = driver(UNBOUNDED);
        source.subscribe(Box::new(driver));

        assert_eq!(values(&trace), vec![1, 2, 3]);
        assert!(matches!(trace.lock().last(), Some(Signal::Complete)));
    }

    #[test]
    fn test_bounded_request_then_remainder() {
        let source = FromIter::new(vec![1, 2, 3, 4]);
        let (driver, trace, subscription) = driver(1);
        source.subscribe(Box::new(driver));
        assert_eq!(values(&trace), vec![1]);

        let subscription = subscription.lock().clone().unwrap();
        subscription.request(3);
        assert_eq!(values(&trace), vec![1, 2, 3, 4]);
        // Completion needs no extra demand
        assert!(matches!(trace.lock().last(), Some(Signal::Complete)));
        assert_eq!(trace.lock().len(), 5);
    }

    #[test]
    fn test_empty_iterator_completes_without_demand() {
        let source = FromIter::new(Vec::<i32>::new());
        let (driver, trace, _) = driver(0);
        source.subscribe(Box::new(driver));
        assert!(matches!(trace.lock().as_slice(), [Signal::Complete]));
    }

    #[test]
    fn test_cancel_stops_emission() {
        let source = FromIter::new(vec![1, 2, 3]);
        let (driver, trace, subscription) = driver(1);
        source.subscribe(Box::new(driver));

        let subscription = subscription.lock().clone().unwrap();
        subscription.cancel();
        subscription.cancel();
        subscription.request(10);
        assert!(matches!(trace.lock().as_slice(), [Signal::Next(1)]));
    }

    #[test]
    fn test_zero_request_is_an_error() {
        let source = FromIter::new(vec![1, 2, 3]);
        let (driver, trace, subscription) = driver(0);
        source.subscribe(Box::new(driver));

        let subscription = subscription.lock().clone().unwrap();
        subscription.request(0);
        let trace = trace.lock();
        assert_eq!(trace.len(), 1);
        assert!(
            trace[0]
                .failure()
                .is_some_and(|f| f.is::<ReactiveError>())
        );
    }

    #[test]
    fn test_cold_subscriptions_are_independent() {
        let source = FromIter::new(vec![7, 8]);
        let (first, first_trace, _) = driver(UNBOUNDED);
        let (second, second_trace, _) = driver(1);
        source.subscribe(Box::new(first));
        source.subscribe(Box::new(second));

        assert_eq!(values(&first_trace), vec![7, 8]);
        assert_eq!(values(&second_trace), vec![7]);
    }
}
