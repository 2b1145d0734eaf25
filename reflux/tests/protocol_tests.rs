//! Protocol Integration Tests
//!
//! Exercises demand, cancellation and serialization rules through the
//! public API with a manually driven subscriber.

use parking_lot::Mutex;
use reflux::scheduler::VirtualTimeScheduler;
use reflux::{
    ErrorTiming, Failure, Flux, Mono, ReactiveError, Signal, Subscriber, SubscriptionRef,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Shared view of what a driver received
#[derive(Default)]
struct Trace {
    subscription: Option<SubscriptionRef>,
    signals: Vec<Signal<i64>>,
}

impl Trace {
    fn values(&self) -> Vec<i64> {
        self.signals.iter().filter_map(|s| s.value().copied()).collect()
    }

    fn terminal(&self) -> Option<&Signal<i64>> {
        self.signals.iter().find(|s| s.is_terminal())
    }
}

/// Request through the driver's subscription without holding the trace lock
fn request(trace: &Arc<Mutex<Trace>>, n: u64) {
    let subscription = trace.lock().subscription.clone();
    if let Some(subscription) = subscription {
        subscription.request(n);
    }
}

type Reaction = Box<dyn FnMut(&SubscriptionRef, i64) + Send>;

/// Subscriber that requests `initial` on subscribe and runs an optional
/// reaction on every value
struct Driver {
    trace: Arc<Mutex<Trace>>,
    subscription: Option<SubscriptionRef>,
    initial: u64,
    reaction: Option<Reaction>,
}

impl Driver {
    fn attach(flux: &Flux<i64>, initial: u64) -> Arc<Mutex<Trace>> {
        Self::attach_with(flux, initial, None)
    }

    fn attach_with(flux: &Flux<i64>, initial: u64, reaction: Option<Reaction>) -> Arc<Mutex<Trace>> {
        use reflux::Publisher;
        let trace = Arc::new(Mutex::new(Trace::default()));
        flux.subscribe(Box::new(Driver {
            trace: trace.clone(),
            subscription: None,
            initial,
            reaction,
        }));
        trace
    }
}

impl Subscriber<i64> for Driver {
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        self.trace.lock().subscription = Some(subscription.clone());
        self.subscription = Some(subscription.clone());
        if self.initial > 0 {
            subscription.request(self.initial);
        }
    }

    fn on_next(&mut self, value: i64) {
        self.trace.lock().signals.push(Signal::Next(value));
        if let (Some(reaction), Some(subscription)) = (self.reaction.as_mut(), &self.subscription) {
            reaction(subscription, value);
        }
    }

    fn on_error(&mut self, failure: Failure) {
        self.trace.lock().signals.push(Signal::Error(failure));
    }

    fn on_complete(&mut self) {
        self.trace.lock().signals.push(Signal::Complete);
    }
}

/// Cancels from inside `on_subscribe` and counts every later signal
struct CancelOnSubscribe(Arc<AtomicUsize>);

impl CancelOnSubscribe {
    fn signals_after_cancel(flux: &Flux<i64>) -> usize {
        use reflux::Publisher;
        let seen = Arc::new(AtomicUsize::new(0));
        flux.subscribe(Box::new(CancelOnSubscribe(seen.clone())));
        seen.load(Ordering::SeqCst)
    }
}

impl Subscriber<i64> for CancelOnSubscribe {
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        subscription.cancel();
    }

    fn on_next(&mut self, _value: i64) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn on_error(&mut self, _failure: Failure) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    fn on_complete(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_cancel_in_on_subscribe_suppresses_terminal() {
    let fluxes = [
        ("empty", Flux::<i64>::empty()),
        ("error", Flux::<i64>::error(ReactiveError::Scheduler("x".into()))),
        ("take(0)", Flux::<i64>::never().take(0)),
        ("from_iter", Flux::from_iter(Vec::<i64>::new())),
        ("range", Flux::range(0, 3)),
    ];
    for (name, flux) in fluxes {
        assert_eq!(CancelOnSubscribe::signals_after_cancel(&flux), 0, "{}", name);
    }
}

#[test]
fn test_no_values_without_demand() {
    let trace = Driver::attach(&Flux::range(0, 5), 0);
    assert!(trace.lock().signals.is_empty());

    request(&trace, 2);
    assert_eq!(trace.lock().values(), vec![0, 1]);
    assert!(trace.lock().terminal().is_none());

    request(&trace, 10);
    assert_eq!(trace.lock().values(), vec![0, 1, 2, 3, 4]);
    assert!(matches!(trace.lock().terminal(), Some(Signal::Complete)));
}

#[test]
fn test_exhausted_iterator_completes_without_demand() {
    let trace = Driver::attach(&Flux::range(0, 2), 2);
    assert_eq!(trace.lock().values(), vec![0, 1]);
    assert!(matches!(trace.lock().terminal(), Some(Signal::Complete)));
}

#[test]
fn test_request_zero_is_an_error() {
    let trace = Driver::attach(&Flux::range(0, 5), 0);
    request(&trace, 0);

    let trace = trace.lock();
    assert!(trace.values().is_empty());
    match trace.terminal() {
        Some(Signal::Error(failure)) => {
            assert_eq!(
                failure.downcast_ref::<ReactiveError>(),
                Some(&ReactiveError::NonPositiveRequest(0))
            );
        }
        other => panic!("expected a request error, got {:?}", other.map(|s| s.to_string())),
    }
}

#[test]
fn test_reentrant_request_does_not_nest() {
    let depth = Arc::new(AtomicUsize::new(0));
    let max_depth = Arc::new(AtomicUsize::new(0));
    let (d, m) = (depth.clone(), max_depth.clone());

    let reaction: Reaction = Box::new(move |subscription, _| {
        let current = d.fetch_add(1, Ordering::SeqCst) + 1;
        m.fetch_max(current, Ordering::SeqCst);
        subscription.request(1);
        d.fetch_sub(1, Ordering::SeqCst);
    });
    let trace = Driver::attach_with(&Flux::range(0, 1000), 1, Some(reaction));

    assert_eq!(trace.lock().values().len(), 1000);
    assert_eq!(max_depth.load(Ordering::SeqCst), 1);
}

#[test]
fn test_cancel_from_on_next_stops_everything() {
    let reaction: Reaction = Box::new(|subscription, value| {
        if value == 2 {
            subscription.cancel();
        }
    });
    let trace = Driver::attach_with(&Flux::range(0, 10), u64::MAX, Some(reaction));

    assert_eq!(trace.lock().values(), vec![0, 1, 2]);
    assert!(trace.lock().terminal().is_none());
}

#[test]
fn test_error_timing_on_request() {
    let flux = Flux::<i64>::error_with(ReactiveError::Scheduler("late".into()), ErrorTiming::OnRequest);
    let trace = Driver::attach(&flux, 0);
    assert!(trace.lock().signals.is_empty());

    request(&trace, 1);
    assert!(matches!(trace.lock().terminal(), Some(Signal::Error(_))));
}

#[test]
fn test_error_timing_eager_by_default() {
    let trace = Driver::attach(&Flux::<i64>::error(ReactiveError::Scheduler("now".into())), 0);
    assert!(matches!(trace.lock().terminal(), Some(Signal::Error(_))));
}

#[test]
fn test_interval_overflow_without_demand() {
    let clock = Arc::new(VirtualTimeScheduler::new());
    let flux = Flux::interval_on(Duration::from_millis(10), clock.clone()).map(|n| n as i64);
    let trace = Driver::attach(&flux, 2);

    clock.advance_by(Duration::from_millis(30));
    let trace = trace.lock();
    assert_eq!(trace.values(), vec![0, 1]);
    match trace.terminal() {
        Some(Signal::Error(failure)) => {
            assert_eq!(
                failure.downcast_ref::<ReactiveError>(),
                Some(&ReactiveError::Overflow { tick: 2 })
            );
        }
        _ => panic!("expected overflow"),
    }
}

#[test]
fn test_flat_map_respects_downstream_demand() {
    let flux = Flux::range(0, 3).flat_map(|n| Flux::range(n * 10, 3));
    let trace = Driver::attach(&flux, 4);
    assert_eq!(trace.lock().values(), vec![0, 1, 2, 10]);
    assert!(trace.lock().terminal().is_none());

    request(&trace, u64::MAX);
    assert_eq!(trace.lock().values(), vec![0, 1, 2, 10, 11, 12, 20, 21, 22]);
    assert!(matches!(trace.lock().terminal(), Some(Signal::Complete)));
}

#[test]
fn test_flat_map_fails_fast() {
    let cancelled = Arc::new(AtomicUsize::new(0));
    let counter = cancelled.clone();
    let clock = Arc::new(VirtualTimeScheduler::new());
    let ticking = Flux::interval_on(Duration::from_secs(1), clock.clone())
        .map(|n| n as i64)
        .do_on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    let flux = Flux::just([0i64, 1]).flat_map(move |n| {
        if n == 0 {
            ticking.clone()
        } else {
            Flux::error(ReactiveError::Scheduler("inner".into()))
        }
    });
    let trace = Driver::attach(&flux, u64::MAX);

    assert!(matches!(trace.lock().terminal(), Some(Signal::Error(_))));
    assert_eq!(cancelled.load(Ordering::SeqCst), 1);
    clock.advance_by(Duration::from_secs(5));
    assert!(trace.lock().values().is_empty());
}

#[test]
fn test_flat_map_bounded_concurrency() {
    let clock = Arc::new(VirtualTimeScheduler::new());
    let timer = clock.clone();
    let flux = Flux::range(1, 3).flat_map_with(
        move |n| {
            Flux::interval_on(Duration::from_secs(n as u64), timer.clone())
                .take(1)
                .map(move |_| n)
        },
        1,
        32,
    );
    let trace = Driver::attach(&flux, u64::MAX);

    // One inner at a time: 1s, then 2s, then 3s after the previous one
    clock.advance_by(Duration::from_secs(1));
    assert_eq!(trace.lock().values(), vec![1]);
    clock.advance_by(Duration::from_secs(2));
    assert_eq!(trace.lock().values(), vec![1, 2]);
    clock.advance_by(Duration::from_secs(3));
    assert_eq!(trace.lock().values(), vec![1, 2, 3]);
    assert!(matches!(trace.lock().terminal(), Some(Signal::Complete)));
}

#[test]
fn test_concat_does_not_subscribe_after_error() {
    let subscribed = Arc::new(AtomicUsize::new(0));
    let counter = subscribed.clone();
    let second = Flux::range(100, 2).do_on_subscribe(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let flux = Flux::range(0, 2)
        .concat_with(Flux::error(ReactiveError::Scheduler("first".into())))
        .concat_with(second);

    let trace = Driver::attach(&flux, u64::MAX);
    assert_eq!(trace.lock().values(), vec![0, 1]);
    assert!(matches!(trace.lock().terminal(), Some(Signal::Error(_))));
    assert_eq!(subscribed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_concat_releases_downstream_cancelled_in_on_next() {
    let flux = Flux::range(0, 3).concat_with(Flux::range(10, 3));
    let reaction: Reaction = Box::new(|subscription, value| {
        if value == 1 {
            subscription.cancel();
        }
    });
    let trace = Driver::attach_with(&flux, u64::MAX, Some(reaction));

    assert_eq!(trace.lock().values(), vec![0, 1]);
    assert!(trace.lock().terminal().is_none());
    // Nothing but this test holds the trace once the driver is released
    assert_eq!(Arc::strong_count(&trace), 1);
}

#[test]
fn test_concat_carries_partial_demand() {
    let flux = Flux::range(0, 2).concat_with(Flux::range(10, 3));
    let trace = Driver::attach(&flux, 3);
    assert_eq!(trace.lock().values(), vec![0, 1, 10]);

    request(&trace, 2);
    assert_eq!(trace.lock().values(), vec![0, 1, 10, 11, 12]);
    assert!(matches!(trace.lock().terminal(), Some(Signal::Complete)));
}

#[test]
fn test_take_cancels_upstream_once() {
    let cancels = Arc::new(AtomicUsize::new(0));
    let counter = cancels.clone();
    let flux = Flux::range(0, 100)
        .do_on_cancel(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .take(3);

    let reaction: Reaction = Box::new(|subscription, value| {
        if value == 2 {
            subscription.cancel();
        }
    });
    let trace = Driver::attach_with(&flux, u64::MAX, Some(reaction));

    assert_eq!(trace.lock().values(), vec![0, 1, 2]);
    assert!(trace.lock().terminal().is_none());
    assert_eq!(cancels.load(Ordering::SeqCst), 1);
}

#[test]
fn test_mono_next_takes_first() {
    let trace = Driver::attach(&Flux::range(7, 5).next().into_flux(), 1);
    assert_eq!(trace.lock().values(), vec![7]);
    assert!(matches!(trace.lock().terminal(), Some(Signal::Complete)));

    let trace = Driver::attach(&Mono::<i64>::empty().into_flux(), 1);
    assert!(matches!(trace.lock().terminal(), Some(Signal::Complete)));
}
