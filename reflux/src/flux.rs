//! Flux - a publisher of zero to many values

use crate::error::{Failure, ReactiveError};
use crate::mono::Mono;
use crate::operators::concat::Concat;
use crate::operators::filter::Filter;
use crate::operators::flat_map::{DEFAULT_PREFETCH, FlatMap};
use crate::operators::map::Map;
use crate::operators::peek::{Hooks, Peek};
use crate::operators::take::Take;
use crate::publisher::{Publisher, PublisherRef};
use crate::scheduler::{self, Scheduler};
use crate::source::ErrorTiming;
use crate::source::empty::{Empty, ErrorSource, Never};
use crate::source::interval::Interval;
use crate::source::iter::FromIter;
use crate::stream::SignalStream;
use crate::subscriber::{BoxSubscriber, Disposable, LambdaSubscriber};
use crate::subscription::UNBOUNDED;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Publisher of `0..N` values followed by one terminal signal
///
/// A `Flux` only describes the computation. Nothing happens until it is
/// subscribed, and every subscription runs independently.
///
/// # Example
/// ```
/// use reflux::Flux;
/// use std::sync::{Arc, Mutex};
///
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// Flux::just([1, 2, 3, 4])
///     .filter(|n| n % 2 == 0)
///     .map(|n| n * 10)
///     .subscribe_with(move |n| sink.lock().unwrap().push(n), |_| {}, || {});
///
/// assert_eq!(*seen.lock().unwrap(), vec![20, 40]);
/// ```
pub struct Flux<T> {
    source: PublisherRef<T>,
}

impl<T> Clone for Flux<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for Flux<T> {
    fn subscribe(&self, subscriber: BoxSubscriber<T>) {
        self.source.subscribe(subscriber);
    }
}

impl<T: Send + 'static> From<Mono<T>> for Flux<T> {
    fn from(mono: Mono<T>) -> Self {
        mono.into_flux()
    }
}

impl<T: Send + 'static> Flux<T> {
    /// Wrap any publisher
    pub fn from_publisher<P>(publisher: P) -> Self
    where
        P: Publisher<T> + 'static,
    {
        Self {
            source: Arc::new(publisher),
        }
    }

    pub(crate) fn from_ref(source: PublisherRef<T>) -> Self {
        Self { source }
    }

    pub(crate) fn into_ref(self) -> PublisherRef<T> {
        self.source
    }

    /// Completes without emitting
    pub fn empty() -> Self {
        Self::from_publisher(Empty::new())
    }

    /// Never signals anything; stays open until cancelled
    pub fn never() -> Self {
        Self::from_publisher(Never::new())
    }

    /// Fails right after subscription
    pub fn error(failure: impl Into<Failure>) -> Self {
        Self::error_with(failure, ErrorTiming::OnSubscribe)
    }

    /// Fails with the given delivery timing
    pub fn error_with(failure: impl Into<Failure>, timing: ErrorTiming) -> Self {
        Self::from_publisher(ErrorSource::new(failure.into(), timing))
    }

    /// Emits every element of a fresh iterator per subscription.
    ///
    /// Completes as soon as the iterator is exhausted, even without
    /// outstanding demand.
    #[allow(clippy::should_implement_trait)]
    pub fn from_iter<I>(iterable: I) -> Self
    where
        I: IntoIterator<Item = T> + Clone + Send + Sync + 'static,
        I::IntoIter: Send + 'static,
    {
        Self::from_publisher(FromIter::new(iterable))
    }

    /// Concatenate `sources` in order
    pub fn concat(sources: Vec<Flux<T>>) -> Self {
        let sources = sources.into_iter().map(Flux::into_ref).collect();
        Self::from_publisher(Concat::new(sources))
    }

    /// Transform every value
    pub fn map<R, F>(self, mapper: F) -> Flux<R>
    where
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        self.try_map(move |value| Ok(mapper(value)))
    }

    /// Transform every value with a fallible mapper. The first `Err`
    /// cancels upstream and terminates the run with that failure.
    pub fn try_map<R, F>(self, mapper: F) -> Flux<R>
    where
        R: Send + 'static,
        F: Fn(T) -> Result<R, Failure> + Send + Sync + 'static,
    {
        Flux::from_publisher(Map::new(self.source, Arc::new(mapper)))
    }

    /// Keep only values matching `predicate`
    pub fn filter<F>(self, predicate: F) -> Flux<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Flux::from_publisher(Filter::new(self.source, Arc::new(predicate)))
    }

    /// Map every value to an inner publisher and merge their values in
    /// arrival order
    pub fn flat_map<R, P, F>(self, mapper: F) -> Flux<R>
    where
        R: Send + 'static,
        P: Into<Flux<R>>,
        F: Fn(T) -> P + Send + Sync + 'static,
    {
        self.flat_map_with(mapper, UNBOUNDED, DEFAULT_PREFETCH)
    }

    /// [`flat_map`](Self::flat_map) with at most `concurrency` inners in
    /// flight and `prefetch` values requested from each
    pub fn flat_map_with<R, P, F>(self, mapper: F, concurrency: u64, prefetch: u64) -> Flux<R>
    where
        R: Send + 'static,
        P: Into<Flux<R>>,
        F: Fn(T) -> P + Send + Sync + 'static,
    {
        let mapper = Arc::new(move |value: T| -> Flux<R> { mapper(value).into() });
        Flux::from_publisher(FlatMap::new(self.source, mapper, concurrency, prefetch))
    }

    /// First `limit` values, then complete and cancel upstream
    pub fn take(self, limit: u64) -> Flux<T> {
        Flux::from_publisher(Take::new(self.source, limit))
    }

    /// This flux's values, then those of `other`
    pub fn concat_with(self, other: impl Into<Flux<T>>) -> Flux<T> {
        Flux::concat(vec![self, other.into()])
    }

    /// The first value as a [`Mono`]
    pub fn next(self) -> Mono<T> {
        Mono::from_ref(self.take(1).into_ref())
    }

    fn peek(self, hooks: Hooks<T>) -> Flux<T> {
        Flux::from_publisher(Peek::new(self.source, hooks))
    }

    pub fn do_on_subscribe<F>(self, hook: F) -> Flux<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.peek(Hooks {
            on_subscribe: Some(Arc::new(hook)),
            ..Hooks::default()
        })
    }

    pub fn do_on_next<F>(self, hook: F) -> Flux<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.peek(Hooks {
            on_next: Some(Arc::new(hook)),
            ..Hooks::default()
        })
    }

    pub fn do_on_error<F>(self, hook: F) -> Flux<T>
    where
        F: Fn(&Failure) + Send + Sync + 'static,
    {
        self.peek(Hooks {
            on_error: Some(Arc::new(hook)),
            ..Hooks::default()
        })
    }

    pub fn do_on_complete<F>(self, hook: F) -> Flux<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.peek(Hooks {
            on_complete: Some(Arc::new(hook)),
            ..Hooks::default()
        })
    }

    /// Observe every `request(n)` made by the downstream
    pub fn do_on_request<F>(self, hook: F) -> Flux<T>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.peek(Hooks {
            on_request: Some(Arc::new(hook)),
            ..Hooks::default()
        })
    }

    /// Observe downstream cancellation
    pub fn do_on_cancel<F>(self, hook: F) -> Flux<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.peek(Hooks {
            on_cancel: Some(Arc::new(hook)),
            ..Hooks::default()
        })
    }

    /// Log every signal and demand change at `info` level under `category`
    pub fn log(self, category: &str) -> Flux<T>
    where
        T: Debug,
    {
        self.peek(Hooks::logging(category))
    }

    /// Subscribe with callbacks and unbounded demand
    pub fn subscribe_with<N, E, C>(&self, next: N, error: E, complete: C) -> Disposable
    where
        N: FnMut(T) + Send + 'static,
        E: FnMut(Failure) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        let (subscriber, handle) = LambdaSubscriber::new(next, error, complete);
        self.source.subscribe(Box::new(subscriber));
        handle
    }

    /// Consume as a [`futures::Stream`]
    ///
    /// Requests [`DEFAULT_PREFETCH`] values up front and one more per value
    /// taken from the stream. Dropping the stream cancels the subscription.
    pub fn into_stream(self) -> SignalStream<T> {
        SignalStream::subscribe(self.source.as_ref(), DEFAULT_PREFETCH)
    }
}

impl<T: Clone + Send + Sync + 'static> Flux<T> {
    /// Emit `values` in order, then complete
    pub fn just<const N: usize>(values: [T; N]) -> Self {
        Self::from_iter(values)
    }
}

impl Flux<i64> {
    /// Emit `count` consecutive integers starting at `start`
    pub fn range(start: i64, count: usize) -> Self {
        let end = start.saturating_add(i64::try_from(count).unwrap_or(i64::MAX));
        Self::from_iter(start..end)
    }
}

impl Flux<u64> {
    /// Emit `0, 1, 2, ...` every `period` on the current default scheduler,
    /// the first value after one period
    pub fn interval(period: Duration) -> Self {
        Self::interval_delayed(period, period)
    }

    /// [`interval`](Self::interval) on an explicit scheduler
    pub fn interval_on(period: Duration, scheduler: Arc<dyn Scheduler>) -> Self {
        Self::from_publisher(Interval::new(period, period, scheduler))
    }

    /// Like [`interval`](Self::interval), with a separate delay before the
    /// first value
    pub fn interval_delayed(delay: Duration, period: Duration) -> Self {
        Self::interval_from(delay, period, scheduler::current())
    }

    /// A scheduler that could not be obtained fails every subscriber
    pub(crate) fn interval_from(
        delay: Duration,
        period: Duration,
        scheduler: Result<Arc<dyn Scheduler>, ReactiveError>,
    ) -> Self {
        match scheduler {
            Ok(scheduler) => Self::from_publisher(Interval::new(delay, period, scheduler)),
            Err(e) => {
                warn!("No scheduler for interval: {}", e);
                Self::error(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::scheduler::VirtualTimeScheduler;
    use parking_lot::Mutex;

    fn collect<T: Send + 'static>(flux: &Flux<T>) -> (Arc<Mutex<Vec<T>>>, Arc<Mutex<Option<String>>>) {
        let values = Arc::new(Mutex::new(Vec::new()));
        let terminal = Arc::new(Mutex::new(None));
        let (sink, on_error, on_complete) = (values.clone(), terminal.clone(), terminal.clone());
        flux.subscribe_with(
            move |value| sink.lock().push(value),
            move |failure| *on_error.lock() = Some(format!("error: {}", failure)),
            move || *on_complete.lock() = Some("complete".to_string()),
        );
        (values, terminal)
    }

    #[test]
    fn test_just_emits_in_order() {
        let (values, terminal) = collect(&Flux::just(["foo", "bar"]));
        assert_eq!(*values.lock(), vec!["foo", "bar"]);
        assert_eq!(terminal.lock().as_deref(), Some("complete"));
    }

    #[test]
    fn test_flux_is_cold() {
        let flux = Flux::range(1, 3).map(|n| n * 2);
        let (first, _) = collect(&flux);
        let (second, _) = collect(&flux);
        assert_eq!(*first.lock(), vec![2, 4, 6]);
        assert_eq!(*first.lock(), *second.lock());
    }

    #[test]
    fn test_range_with_huge_count() {
        let (values, terminal) = collect(&Flux::range(0, usize::MAX).take(3));
        assert_eq!(*values.lock(), vec![0, 1, 2]);
        assert_eq!(terminal.lock().as_deref(), Some("complete"));

        let (values, _) = collect(&Flux::range(i64::MAX - 1, usize::MAX));
        assert_eq!(*values.lock(), vec![i64::MAX - 1]);
    }

    #[test]
    fn test_try_map_failure_terminates() {
        let flux = Flux::range(1, 5).try_map(|n| {
            if n == 3 {
                Err(Failure::new(ReactiveError::Scheduler("boom".into())))
            } else {
                Ok(n)
            }
        });
        let (values, terminal) = collect(&flux);
        assert_eq!(*values.lock(), vec![1, 2]);
        assert_eq!(
            terminal.lock().as_deref(),
            Some("error: scheduler error: boom")
        );
    }

    #[test]
    fn test_concat_with_carries_demand() {
        let flux = Flux::just([1, 2]).concat_with(Flux::just([3]));
        let (values, terminal) = collect(&flux);
        assert_eq!(*values.lock(), vec![1, 2, 3]);
        assert_eq!(terminal.lock().as_deref(), Some("complete"));
    }

    #[test]
    fn test_flat_map_merges_synchronous_inners() {
        let flux = Flux::just([1, 2]).flat_map(|n| Flux::just([n, n * 10]));
        let (values, terminal) = collect(&flux);
        assert_eq!(*values.lock(), vec![1, 10, 2, 20]);
        assert_eq!(terminal.lock().as_deref(), Some("complete"));
    }

    #[test]
    fn test_take_zero_completes_immediately() {
        let (values, terminal) = collect(&Flux::<i32>::never().take(0));
        assert!(values.lock().is_empty());
        assert_eq!(terminal.lock().as_deref(), Some("complete"));
    }

    #[test]
    fn test_interval_on_virtual_time() {
        let virtual_time = Arc::new(VirtualTimeScheduler::new());
        let flux = Flux::interval_on(Duration::from_millis(100), virtual_time.clone()).take(3);
        let (values, terminal) = collect(&flux);

        virtual_time.advance_by(Duration::from_millis(250));
        assert_eq!(*values.lock(), vec![0, 1]);
        assert!(terminal.lock().is_none());

        virtual_time.advance_by(Duration::from_millis(50));
        assert_eq!(*values.lock(), vec![0, 1, 2]);
        assert_eq!(terminal.lock().as_deref(), Some("complete"));
        assert_eq!(virtual_time.pending_tasks(), 0);
    }

    #[test]
    fn test_interval_without_scheduler_fails() {
        let missing = Err(ReactiveError::Scheduler("no timer runtime".into()));
        let flux = Flux::interval_from(Duration::from_millis(10), Duration::from_millis(10), missing);
        let (values, terminal) = collect(&flux);
        assert!(values.lock().is_empty());
        assert_eq!(
            terminal.lock().as_deref(),
            Some("error: scheduler error: no timer runtime")
        );
    }

    #[test]
    fn test_dispose_stops_interval() {
        let virtual_time = Arc::new(VirtualTimeScheduler::new());
        let flux = Flux::interval_on(Duration::from_secs(1), virtual_time.clone());
        let values = Arc::new(Mutex::new(Vec::new()));
        let sink = values.clone();
        let handle = flux.subscribe_with(move |n| sink.lock().push(n), |_| {}, || {});

        virtual_time.advance_by(Duration::from_secs(2));
        handle.dispose();
        assert!(handle.is_disposed());
        virtual_time.advance_by(Duration::from_secs(5));
        assert_eq!(*values.lock(), vec![0, 1]);
    }
}
