//! Mono - a publisher of at most one value

use crate::error::Failure;
use crate::flux::Flux;
use crate::operators::DEFAULT_PREFETCH;
use crate::publisher::{Publisher, PublisherRef};
use crate::source::ErrorTiming;
use crate::subscriber::{BoxSubscriber, Disposable};
use crate::subscription::UNBOUNDED;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Publisher of `0..1` value followed by one terminal signal
///
/// Operators that keep cardinality return a `Mono`; the ones that may
/// produce more values ([`flat_map_many`](Mono::flat_map_many),
/// [`concat_with`](Mono::concat_with)) return a [`Flux`].
pub struct Mono<T> {
    source: PublisherRef<T>,
}

impl<T> Clone for Mono<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
        }
    }
}

impl<T: Send + 'static> Publisher<T> for Mono<T> {
    fn subscribe(&self, subscriber: BoxSubscriber<T>) {
        self.source.subscribe(subscriber);
    }
}

impl<T: Send + 'static> Mono<T> {
    pub(crate) fn from_ref(source: PublisherRef<T>) -> Self {
        Self { source }
    }

    fn lift(flux: Flux<T>) -> Self {
        Self::from_ref(flux.into_ref())
    }

    /// Wrap a publisher, keeping only its first value
    pub fn from_publisher<P>(publisher: P) -> Self
    where
        P: Publisher<T> + 'static,
    {
        Flux::from_publisher(publisher).next()
    }

    pub fn empty() -> Self {
        Self::lift(Flux::empty())
    }

    pub fn never() -> Self {
        Self::lift(Flux::never())
    }

    /// Fails right after subscription
    pub fn error(failure: impl Into<Failure>) -> Self {
        Self::lift(Flux::error(failure))
    }

    pub fn error_with(failure: impl Into<Failure>, timing: ErrorTiming) -> Self {
        Self::lift(Flux::error_with(failure, timing))
    }

    pub fn map<R, F>(self, mapper: F) -> Mono<R>
    where
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        Mono::lift(self.into_flux().map(mapper))
    }

    pub fn try_map<R, F>(self, mapper: F) -> Mono<R>
    where
        R: Send + 'static,
        F: Fn(T) -> Result<R, Failure> + Send + Sync + 'static,
    {
        Mono::lift(self.into_flux().try_map(mapper))
    }

    /// Complete empty when the value does not match `predicate`
    pub fn filter<F>(self, predicate: F) -> Mono<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Mono::lift(self.into_flux().filter(predicate))
    }

    /// Continue with the [`Mono`] produced from this one's value
    pub fn flat_map<R, F>(self, mapper: F) -> Mono<R>
    where
        R: Send + 'static,
        F: Fn(T) -> Mono<R> + Send + Sync + 'static,
    {
        Mono::lift(self.into_flux().flat_map(mapper))
    }

    /// Continue with the publisher produced from this one's value
    pub fn flat_map_many<R, P, F>(self, mapper: F) -> Flux<R>
    where
        R: Send + 'static,
        P: Into<Flux<R>>,
        F: Fn(T) -> P + Send + Sync + 'static,
    {
        self.into_flux()
            .flat_map_with(mapper, UNBOUNDED, DEFAULT_PREFETCH)
    }

    /// This mono's value, then those of `other`
    pub fn concat_with(self, other: impl Into<Flux<T>>) -> Flux<T> {
        self.into_flux().concat_with(other)
    }

    pub fn do_on_subscribe<F>(self, hook: F) -> Mono<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Mono::lift(self.into_flux().do_on_subscribe(hook))
    }

    pub fn do_on_next<F>(self, hook: F) -> Mono<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        Mono::lift(self.into_flux().do_on_next(hook))
    }

    pub fn do_on_error<F>(self, hook: F) -> Mono<T>
    where
        F: Fn(&Failure) + Send + Sync + 'static,
    {
        Mono::lift(self.into_flux().do_on_error(hook))
    }

    pub fn do_on_complete<F>(self, hook: F) -> Mono<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Mono::lift(self.into_flux().do_on_complete(hook))
    }

    pub fn do_on_request<F>(self, hook: F) -> Mono<T>
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        Mono::lift(self.into_flux().do_on_request(hook))
    }

    pub fn do_on_cancel<F>(self, hook: F) -> Mono<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Mono::lift(self.into_flux().do_on_cancel(hook))
    }

    /// Log every signal and demand change at `info` level under `category`
    pub fn log(self, category: &str) -> Mono<T>
    where
        T: Debug,
    {
        Mono::lift(self.into_flux().log(category))
    }

    /// Subscribe with callbacks and unbounded demand
    pub fn subscribe_with<N, E, C>(&self, next: N, error: E, complete: C) -> Disposable
    where
        N: FnMut(T) + Send + 'static,
        E: FnMut(Failure) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        self.clone().into_flux().subscribe_with(next, error, complete)
    }

    pub fn into_flux(self) -> Flux<T> {
        Flux::from_ref(self.source)
    }
}

impl<T: Clone + Send + Sync + 'static> Mono<T> {
    /// Emit `value`, then complete
    pub fn just(value: T) -> Self {
        Self::lift(Flux::from_iter(Some(value)))
    }

    /// Emit `value` if present, complete empty otherwise
    pub fn just_or_empty(value: Option<T>) -> Self {
        Self::lift(Flux::from_iter(value))
    }
}

impl Mono<u64> {
    /// Emit `0` once `delay` elapsed on the current default scheduler
    pub fn delay(delay: Duration) -> Self {
        Flux::interval_delayed(delay, delay).next()
    }
}
