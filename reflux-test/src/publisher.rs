//! Manually driven publisher for tests

use parking_lot::Mutex;
use reflux::{BoxSubscriber, Failure, Flux, Publisher, ReactiveError, Subscription, UNBOUNDED};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// How a [`TestPublisher`] treats demand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compliance {
    /// Emitting without demand fails the subscriber with an overflow
    Compliant,
    /// Emits whatever demand says, to exercise downstream protection
    NonCompliant,
}

/// Hot publisher whose signals are pushed by the test
///
/// Every subscriber receives the signals emitted while it is subscribed.
/// A subscriber arriving after a terminal signal receives that terminal
/// right away.
#[derive(Clone)]
pub struct TestPublisher<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    compliance: Compliance,
    subscriptions: Mutex<Vec<Arc<TestSubscription<T>>>>,
    terminal: Mutex<Option<Terminal>>,
    subscribe_count: AtomicUsize,
    cancel_count: Arc<AtomicUsize>,
    requested_total: Arc<AtomicU64>,
}

#[derive(Clone)]
enum Terminal {
    Complete,
    Error(Failure),
}

impl<T: Clone + Send + 'static> TestPublisher<T> {
    /// Create a publisher that honours demand
    pub fn create() -> Self {
        Self::with_compliance(Compliance::Compliant)
    }

    /// Create a publisher that ignores demand
    pub fn create_noncompliant() -> Self {
        Self::with_compliance(Compliance::NonCompliant)
    }

    fn with_compliance(compliance: Compliance) -> Self {
        Self {
            inner: Arc::new(Inner {
                compliance,
                subscriptions: Mutex::new(Vec::new()),
                terminal: Mutex::new(None),
                subscribe_count: AtomicUsize::new(0),
                cancel_count: Arc::new(AtomicUsize::new(0)),
                requested_total: Arc::new(AtomicU64::new(0)),
            }),
        }
    }

    /// This publisher as a [`Flux`]
    pub fn flux(&self) -> Flux<T> {
        Flux::from_publisher(self.clone())
    }

    /// Emit `value` to every live subscriber
    pub fn next(&self, value: T) -> &Self {
        for subscription in self.live() {
            subscription.emit(value.clone(), self.inner.compliance);
        }
        self
    }

    /// Emit every value in order, then complete
    pub fn emit<I>(&self, values: I) -> &Self
    where
        I: IntoIterator<Item = T>,
    {
        for value in values {
            self.next(value);
        }
        self.complete()
    }

    pub fn complete(&self) -> &Self {
        self.terminate(Terminal::Complete)
    }

    pub fn error(&self, failure: impl Into<Failure>) -> &Self {
        self.terminate(Terminal::Error(failure.into()))
    }

    fn terminate(&self, terminal: Terminal) -> &Self {
        *self.inner.terminal.lock() = Some(terminal.clone());
        let subscriptions: Vec<_> = self.inner.subscriptions.lock().drain(..).collect();
        for subscription in subscriptions {
            subscription.terminate(terminal.clone());
        }
        self
    }

    fn live(&self) -> Vec<Arc<TestSubscription<T>>> {
        let mut subscriptions = self.inner.subscriptions.lock();
        subscriptions.retain(|s| !s.cancelled.load(Ordering::Acquire));
        subscriptions.clone()
    }

    /// Number of subscribers currently attached
    pub fn subscriber_count(&self) -> usize {
        self.live().len()
    }

    /// Number of subscriptions made so far
    pub fn subscribe_count(&self) -> usize {
        self.inner.subscribe_count.load(Ordering::Acquire)
    }

    pub fn cancel_count(&self) -> usize {
        self.inner.cancel_count.load(Ordering::Acquire)
    }

    /// Sum of every request made, saturating at unbounded
    pub fn requested_total(&self) -> u64 {
        self.inner.requested_total.load(Ordering::Acquire)
    }

    /// Panic unless someone subscribed
    pub fn assert_was_subscribed(&self) -> &Self {
        assert!(self.subscribe_count() > 0, "expected the publisher to be subscribed");
        self
    }

    /// Panic unless a subscriber cancelled
    pub fn assert_was_cancelled(&self) -> &Self {
        assert!(self.cancel_count() > 0, "expected a subscriber to cancel");
        self
    }

    /// Panic unless a subscriber requested something
    pub fn assert_was_requested(&self) -> &Self {
        assert!(self.requested_total() > 0, "expected a subscriber to request");
        self
    }

    pub fn assert_was_not_cancelled(&self) -> &Self {
        assert_eq!(self.cancel_count(), 0, "expected no subscriber to cancel");
        self
    }
}

impl<T: Clone + Send + 'static> Publisher<T> for TestPublisher<T> {
    fn subscribe(&self, mut subscriber: BoxSubscriber<T>) {
        self.inner.subscribe_count.fetch_add(1, Ordering::AcqRel);
        let subscription = Arc::new(TestSubscription {
            subscriber: Mutex::new(None),
            requested: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
            cancel_count: self.inner.cancel_count.clone(),
            requested_total: self.inner.requested_total.clone(),
        });

        subscriber.on_subscribe(subscription.clone());
        if subscription.cancelled.load(Ordering::Acquire) {
            return;
        }

        let terminal = self.inner.terminal.lock().clone();
        if let Some(terminal) = terminal {
            debug!("Late subscriber receives the recorded terminal signal");
            match terminal {
                Terminal::Complete => subscriber.on_complete(),
                Terminal::Error(failure) => subscriber.on_error(failure),
            }
            return;
        }

        *subscription.subscriber.lock() = Some(subscriber);
        self.inner.subscriptions.lock().push(subscription);
    }
}

struct TestSubscription<T> {
    subscriber: Mutex<Option<BoxSubscriber<T>>>,
    requested: AtomicU64,
    emitted: AtomicU64,
    cancelled: AtomicBool,
    cancel_count: Arc<AtomicUsize>,
    requested_total: Arc<AtomicU64>,
}

impl<T: Send + 'static> TestSubscription<T> {
    fn emit(&self, value: T, compliance: Compliance) {
        let mut guard = self.subscriber.lock();
        if guard.is_none() {
            return;
        }
        let index = self.emitted.fetch_add(1, Ordering::AcqRel);

        let granted = self
            .requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| match current {
                0 => None,
                UNBOUNDED => Some(UNBOUNDED),
                n => Some(n - 1),
            })
            .is_ok();

        if !granted && compliance == Compliance::Compliant {
            warn!("Test publisher emitted value {} without demand", index);
            self.cancelled.store(true, Ordering::Release);
            if let Some(mut subscriber) = guard.take() {
                subscriber.on_error(ReactiveError::Overflow { tick: index }.into());
            }
            return;
        }

        if let Some(subscriber) = guard.as_mut() {
            subscriber.on_next(value);
        }
        if self.cancelled.load(Ordering::Acquire) {
            guard.take();
        }
    }

    fn terminate(&self, terminal: Terminal) {
        let subscriber = self.subscriber.lock().take();
        if let Some(mut subscriber) = subscriber {
            match terminal {
                Terminal::Complete => subscriber.on_complete(),
                Terminal::Error(failure) => subscriber.on_error(failure),
            }
        }
    }
}

impl<T: Send + 'static> Subscription for TestSubscription<T> {
    fn request(&self, n: u64) {
        let _ = self
            .requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(n))
            });
        let _ = self
            .requested_total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_add(n))
            });
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancel_count.fetch_add(1, Ordering::AcqRel);
        // Busy means a signal is being delivered; the emitter drops it
        if let Some(mut guard) = self.subscriber.try_lock() {
            guard.take();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn collect(publisher: &TestPublisher<i32>) -> Arc<PlMutex<Vec<String>>> {
        let events = Arc::new(PlMutex::new(Vec::new()));
        let (next, error, complete) = (events.clone(), events.clone(), events.clone());
        publisher.flux().subscribe_with(
            move |v| next.lock().push(format!("next {}", v)),
            move |f| error.lock().push(format!("error {}", f)),
            move || complete.lock().push("complete".to_string()),
        );
        events
    }

    #[test]
    fn test_emit_then_complete() {
        let publisher = TestPublisher::create();
        let events = collect(&publisher);
        publisher.assert_was_subscribed().assert_was_requested();

        publisher.emit([1, 2]);
        assert_eq!(*events.lock(), vec!["next 1", "next 2", "complete"]);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[test]
    fn test_late_subscriber_sees_terminal() {
        let publisher = TestPublisher::create();
        publisher.error(ReactiveError::Scheduler("gone".into()));
        let events = collect(&publisher);
        assert_eq!(*events.lock(), vec!["error scheduler error: gone"]);
    }

    #[test]
    fn test_cancel_detaches_subscriber() {
        let publisher = TestPublisher::<i32>::create();
        let events = collect(&publisher);
        let bounded = publisher.flux().take(1);
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let sink = seen.clone();
        bounded.subscribe_with(move |v| sink.lock().push(v), |_| {}, || {});

        publisher.next(5).next(6);
        assert_eq!(*events.lock(), vec!["next 5", "next 6"]);
        assert_eq!(*seen.lock(), vec![5]);
        publisher.assert_was_cancelled();
    }
}
