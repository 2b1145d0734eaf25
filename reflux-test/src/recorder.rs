//! Recording subscriber feeding the verifier

use parking_lot::{Condvar, Mutex};
use reflux::{Failure, Signal, Subscriber, SubscriptionRef, UNBOUNDED};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, trace};

/// One observed event
pub(crate) enum Event<T> {
    Subscribed,
    Signal(Signal<T>),
}

impl<T: fmt::Debug> fmt::Display for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Subscribed => write!(f, "onSubscribe()"),
            Event::Signal(signal) => write!(f, "{}", signal),
        }
    }
}

struct LogState<T> {
    events: VecDeque<Event<T>>,
    subscription: Option<SubscriptionRef>,
    /// Demand granted and not yet used up
    outstanding: u64,
    terminated: bool,
    violations: Vec<String>,
}

/// Events observed by a [`Recorder`], waited on by the verifier
pub(crate) struct SignalLog<T> {
    state: Mutex<LogState<T>>,
    arrived: Condvar,
}

impl<T> SignalLog<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(LogState {
                events: VecDeque::new(),
                subscription: None,
                outstanding: 0,
                terminated: false,
                violations: Vec::new(),
            }),
            arrived: Condvar::new(),
        }
    }

    fn push(&self, event: Event<T>) {
        self.state.lock().events.push_back(event);
        self.arrived.notify_all();
    }

    /// Pop the oldest event without waiting
    pub(crate) fn poll(&self) -> Option<Event<T>> {
        self.state.lock().events.pop_front()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.state.lock().events.is_empty()
    }

    /// Pop the oldest event, waiting until `deadline` (forever if none)
    pub(crate) fn wait_until(&self, deadline: Option<Instant>) -> Option<Event<T>> {
        let mut state = self.state.lock();
        loop {
            if let Some(event) = state.events.pop_front() {
                return Some(event);
            }
            match deadline {
                Some(deadline) => {
                    if self.arrived.wait_until(&mut state, deadline).timed_out() {
                        return state.events.pop_front();
                    }
                }
                None => self.arrived.wait(&mut state),
            }
        }
    }

    /// Grant `n` more demand to the recorded subscription
    pub(crate) fn request(&self, n: u64) {
        let subscription = {
            let mut state = self.state.lock();
            state.outstanding = state.outstanding.saturating_add(n);
            state.subscription.clone()
        };
        if let Some(subscription) = subscription {
            subscription.request(n);
        }
    }

    pub(crate) fn cancel(&self) {
        let subscription = self.state.lock().subscription.take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    /// First protocol violation seen so far
    pub(crate) fn violation(&self) -> Option<String> {
        self.state.lock().violations.first().cloned()
    }

    fn violate(state: &mut LogState<T>, detail: String) {
        error!("Protocol violation: {}", detail);
        state.violations.push(detail);
    }
}

/// Subscriber recording every signal into a shared [`SignalLog`]
pub(crate) struct Recorder<T> {
    log: Arc<SignalLog<T>>,
    initial_request: u64,
    subscribed: bool,
}

impl<T> Recorder<T> {
    pub(crate) fn new(log: Arc<SignalLog<T>>, initial_request: u64) -> Self {
        Self {
            log,
            initial_request,
            subscribed: false,
        }
    }
}

impl<T: fmt::Debug + Send + 'static> Subscriber<T> for Recorder<T> {
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        if self.subscribed {
            let mut state = self.log.state.lock();
            SignalLog::violate(&mut state, "onSubscribe received twice".to_string());
            drop(state);
            subscription.cancel();
            return;
        }
        self.subscribed = true;
        self.log.state.lock().subscription = Some(subscription);
        self.log.push(Event::Subscribed);
        trace!("Recorder subscribed");

        if self.initial_request > 0 {
            self.log.request(self.initial_request);
        }
    }

    fn on_next(&mut self, value: T) {
        {
            let mut state = self.log.state.lock();
            if state.terminated {
                let detail = format!("onNext({:?}) after a terminal signal", value);
                SignalLog::violate(&mut state, detail);
                return;
            }
            if state.outstanding == 0 {
                let detail = format!("onNext({:?}) without outstanding demand", value);
                SignalLog::violate(&mut state, detail);
            } else if state.outstanding != UNBOUNDED {
                state.outstanding -= 1;
            }
        }
        self.log.push(Event::Signal(Signal::Next(value)));
    }

    fn on_error(&mut self, failure: Failure) {
        {
            let mut state = self.log.state.lock();
            if state.terminated {
                SignalLog::violate(&mut state, format!("onError({}) after a terminal signal", failure));
                return;
            }
            state.terminated = true;
            state.subscription = None;
        }
        self.log.push(Event::Signal(Signal::Error(failure)));
    }

    fn on_complete(&mut self) {
        {
            let mut state = self.log.state.lock();
            if state.terminated {
                SignalLog::violate(&mut state, "onComplete() after a terminal signal".to_string());
                return;
            }
            state.terminated = true;
            state.subscription = None;
        }
        self.log.push(Event::Signal(Signal::Complete));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflux::EmptySubscription;
    use std::time::Duration;

    #[test]
    fn test_records_in_order() {
        let log = Arc::new(SignalLog::new());
        let mut recorder = Recorder::new(log.clone(), UNBOUNDED);
        recorder.on_subscribe(EmptySubscription::shared());
        recorder.on_next(1);
        recorder.on_complete();

        assert!(matches!(log.poll(), Some(Event::Subscribed)));
        assert!(matches!(log.poll(), Some(Event::Signal(Signal::Next(1)))));
        assert!(matches!(log.poll(), Some(Event::Signal(Signal::Complete))));
        assert!(log.poll().is_none());
        assert!(log.violation().is_none());
    }

    #[test]
    fn test_flags_emission_beyond_demand() {
        let log = Arc::new(SignalLog::new());
        let mut recorder = Recorder::new(log.clone(), 1);
        recorder.on_subscribe(EmptySubscription::shared());
        recorder.on_next(1);
        recorder.on_next(2);

        let violation = log.violation().unwrap();
        assert!(violation.contains("without outstanding demand"), "{}", violation);
    }

    #[test]
    fn test_flags_signal_after_terminal() {
        let log = Arc::new(SignalLog::new());
        let mut recorder = Recorder::new(log.clone(), UNBOUNDED);
        recorder.on_subscribe(EmptySubscription::shared());
        recorder.on_complete();
        recorder.on_next(7);

        let violation = log.violation().unwrap();
        assert!(violation.contains("after a terminal signal"), "{}", violation);
    }

    #[test]
    fn test_wait_times_out() {
        let log: SignalLog<u8> = SignalLog::new();
        let started = Instant::now();
        assert!(log.wait_until(Some(started + Duration::from_millis(20))).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_wait_wakes_on_signal() {
        let log = Arc::new(SignalLog::new());
        let producer = log.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            producer.push(Event::Signal(Signal::Next(5u8)));
        });

        let event = log.wait_until(Some(Instant::now() + Duration::from_secs(5)));
        assert!(matches!(event, Some(Event::Signal(Signal::Next(5)))));
        handle.join().unwrap();
    }
}
