//! Step-by-step verification of a publisher's signal sequence
//!
//! A [`StepVerifier`] is a script of expectations built up front and run by
//! [`LastStep::verify`]. The verifier subscribes with a recording subscriber,
//! then consumes the recorded events one step at a time, waiting for them
//! when needed. Under virtual time, waits and pauses advance the virtual
//! clock instead of sleeping.

use crate::error::{Result, VerifyError};
use crate::options::VerifierOptions;
use crate::recorder::{Event, Recorder, SignalLog};
use reflux::scheduler::{self, VirtualTimeScheduler};
use reflux::{Failure, Publisher, PublisherRef, Signal};
use std::error::Error as StdError;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info_span};

type ValueCheck<T> = Box<dyn Fn(&T) -> bool + Send>;
type FailureCheck = Box<dyn Fn(&Failure) -> bool + Send>;

enum Step<T> {
    Subscription,
    Next {
        expectation: &'static str,
        description: String,
        check: ValueCheck<T>,
    },
    NextCount(u64),
    NoEvent(Duration),
    Await(Duration),
    Request(u64),
    Then(Box<dyn FnOnce() + Send>),
    Complete,
    Error {
        expectation: &'static str,
        description: String,
        check: FailureCheck,
    },
    Cancel,
}

impl<T> Step<T> {
    fn name(&self) -> &'static str {
        match self {
            Step::Subscription => "expect_subscription",
            Step::Next { expectation, .. } => *expectation,
            Step::NextCount(_) => "expect_next_count",
            Step::NoEvent(_) => "expect_no_event",
            Step::Await(_) => "then_await",
            Step::Request(_) => "then_request",
            Step::Then(_) => "then",
            Step::Complete => "expect_complete",
            Step::Error { expectation, .. } => *expectation,
            Step::Cancel => "then_cancel",
        }
    }
}

/// Builder of an expectation script for one publisher
///
/// # Example
/// ```
/// use reflux::Flux;
/// use reflux_test::StepVerifier;
///
/// StepVerifier::create(Flux::just(["foo", "bar"]))
///     .expect_next("foo")
///     .expect_next("bar")
///     .expect_complete()
///     .verify()
///     .unwrap();
/// ```
pub struct StepVerifier<T> {
    publisher: PublisherRef<T>,
    options: VerifierOptions,
    clock: Option<Arc<VirtualTimeScheduler>>,
    steps: Vec<Step<T>>,
}

impl<T: Debug + Send + 'static> StepVerifier<T> {
    /// Verify `publisher` with default options
    pub fn create<P>(publisher: P) -> Self
    where
        P: Publisher<T> + 'static,
    {
        Self::create_with_options(publisher, VerifierOptions::default())
    }

    pub fn create_with_options<P>(publisher: P, options: VerifierOptions) -> Self
    where
        P: Publisher<T> + 'static,
    {
        Self {
            publisher: Arc::new(publisher),
            options,
            clock: None,
            steps: Vec::new(),
        }
    }

    /// Verify the publisher built by `supplier` under a fresh virtual clock.
    ///
    /// The clock is this thread's default scheduler while `supplier` runs and
    /// for the whole verification, so time-driven sources pick it up.
    pub fn with_virtual_time<P, F>(supplier: F) -> Self
    where
        P: Publisher<T> + 'static,
        F: FnOnce() -> P,
    {
        Self::with_virtual_time_and_options(supplier, VerifierOptions::default())
    }

    pub fn with_virtual_time_and_options<P, F>(supplier: F, options: VerifierOptions) -> Self
    where
        P: Publisher<T> + 'static,
        F: FnOnce() -> P,
    {
        let clock = Arc::new(VirtualTimeScheduler::new());
        let publisher = {
            let _guard = scheduler::set_default(clock.clone());
            supplier()
        };
        Self {
            publisher: Arc::new(publisher),
            options,
            clock: Some(clock),
            steps: Vec::new(),
        }
    }

    /// The virtual clock driving this verification, if any
    pub fn virtual_clock(&self) -> Option<Arc<VirtualTimeScheduler>> {
        self.clock.clone()
    }

    fn step(mut self, step: Step<T>) -> Self {
        self.steps.push(step);
        self
    }

    fn last(self, step: Step<T>) -> LastStep<T> {
        LastStep {
            verifier: self.step(step),
        }
    }

    /// Expect the subscription itself as the next event
    pub fn expect_subscription(self) -> Self {
        self.step(Step::Subscription)
    }

    /// Expect the next value to satisfy `predicate`
    pub fn expect_next_matches<F>(self, predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + 'static,
    {
        self.step(Step::Next {
            expectation: "expect_next_matches",
            description: "a value matching the predicate".to_string(),
            check: Box::new(predicate),
        })
    }

    /// Expect `count` values, whatever they are
    pub fn expect_next_count(self, count: u64) -> Self {
        self.step(Step::NextCount(count))
    }

    /// Expect no event at all for `duration`
    pub fn expect_no_event(self, duration: Duration) -> Self {
        self.step(Step::NoEvent(duration))
    }

    /// Let `duration` pass: advances the virtual clock, sleeps otherwise
    pub fn then_await(self, duration: Duration) -> Self {
        self.step(Step::Await(duration))
    }

    /// Request `n` more values
    pub fn then_request(self, n: u64) -> Self {
        self.step(Step::Request(n))
    }

    /// Run `action`, typically to drive a test publisher
    pub fn then<F>(self, action: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.step(Step::Then(Box::new(action)))
    }

    /// Expect completion
    pub fn expect_complete(self) -> LastStep<T> {
        self.last(Step::Complete)
    }

    /// Expect an error of any kind
    pub fn expect_error(self) -> LastStep<T> {
        self.expect_error_matches(|_| true)
    }

    /// Expect an error whose source is an `E`
    pub fn expect_error_of<E>(self) -> LastStep<T>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.last(Step::Error {
            expectation: "expect_error_of",
            description: format!("onError({})", std::any::type_name::<E>()),
            check: Box::new(|failure: &Failure| failure.is::<E>()),
        })
    }

    /// Expect an error whose message is exactly `message`
    pub fn expect_error_message(self, message: impl Into<String>) -> LastStep<T> {
        let message = message.into();
        self.last(Step::Error {
            expectation: "expect_error_message",
            description: format!("onError({})", message),
            check: Box::new(move |failure: &Failure| failure.to_string() == message),
        })
    }

    /// Expect an error satisfying `predicate`
    pub fn expect_error_matches<F>(self, predicate: F) -> LastStep<T>
    where
        F: Fn(&Failure) -> bool + Send + 'static,
    {
        self.last(Step::Error {
            expectation: "expect_error",
            description: "an error".to_string(),
            check: Box::new(predicate),
        })
    }

    /// Cancel the subscription, ending the script
    pub fn then_cancel(self) -> LastStep<T> {
        self.last(Step::Cancel)
    }

    /// Expect completion and verify
    pub fn verify_complete(self) -> Result<Duration> {
        self.expect_complete().verify()
    }

    /// Expect an error of any kind and verify
    pub fn verify_error(self) -> Result<Duration> {
        self.expect_error().verify()
    }

    /// Expect an error of kind `E` and verify
    pub fn verify_error_of<E>(self) -> Result<Duration>
    where
        E: StdError + Send + Sync + 'static,
    {
        self.expect_error_of::<E>().verify()
    }
}

impl<T: Debug + PartialEq + Send + 'static> StepVerifier<T> {
    /// Expect the next value to equal `expected`
    pub fn expect_next(self, expected: T) -> Self {
        let description = format!("onNext({:?})", expected);
        self.step(Step::Next {
            expectation: "expect_next",
            description,
            check: Box::new(move |value: &T| *value == expected),
        })
    }

    /// Expect each of `expected` in order
    pub fn expect_next_values<I>(self, expected: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        expected
            .into_iter()
            .fold(self, |verifier, value| verifier.expect_next(value))
    }
}

/// A complete script, ready to run
pub struct LastStep<T> {
    verifier: StepVerifier<T>,
}

impl<T: Debug + Send + 'static> LastStep<T> {
    /// Run the script with the configured default deadline
    pub fn verify(self) -> Result<Duration> {
        let timeout = self.verifier.options.timeout();
        self.run(timeout)
    }

    /// Run the script, failing once `timeout` of real time elapsed
    pub fn verify_timeout(self, timeout: Duration) -> Result<Duration> {
        self.run(Some(timeout))
    }

    fn run(self, timeout: Option<Duration>) -> Result<Duration> {
        let StepVerifier {
            publisher,
            options,
            clock,
            steps,
        } = self.verifier;

        let name = options.scenario_name.as_deref().unwrap_or("anonymous");
        let span = info_span!("verify", scenario = %name, virtual_time = clock.is_some());
        let _enter = span.enter();
        let _guard = clock.clone().map(|clock| scheduler::set_default(clock));

        let started = Instant::now();
        let log = Arc::new(SignalLog::new());
        let mut session = Session {
            log: log.clone(),
            clock,
            started,
            deadline: timeout.map(|timeout| started + timeout),
            subscribed: false,
        };

        debug!("Subscribing, {} step(s) to verify", steps.len());
        publisher.subscribe(Box::new(Recorder::new(log.clone(), options.initial_request)));

        let outcome = steps
            .into_iter()
            .enumerate()
            .try_for_each(|(index, step)| session.apply(index, step));

        // Release the run whatever happened so time-driven sources stop
        log.cancel();
        outcome?;

        if let Some(violation) = log.violation() {
            return Err(VerifyError::ProtocolViolation(violation));
        }
        let elapsed = started.elapsed();
        debug!("Verified in {:?}", elapsed);
        Ok(elapsed)
    }
}

struct Session<T> {
    log: Arc<SignalLog<T>>,
    clock: Option<Arc<VirtualTimeScheduler>>,
    started: Instant,
    deadline: Option<Instant>,
    subscribed: bool,
}

impl<T: Debug + Send + 'static> Session<T> {
    fn apply(&mut self, index: usize, step: Step<T>) -> Result<()> {
        let name = step.name();
        debug!(step = index, "{}", name);

        match step {
            Step::Subscription => match self.next_event(index, name)? {
                Event::Subscribed => {
                    self.subscribed = true;
                }
                other => return Err(VerifyError::mismatch(index, name, "onSubscribe()", other.to_string())),
            },
            Step::Next {
                expectation,
                description,
                check,
            } => match self.next_signal(index, expectation)? {
                Signal::Next(value) if check(&value) => {}
                other => return Err(VerifyError::mismatch(index, expectation, description, other.to_string())),
            },
            Step::NextCount(count) => {
                for seen in 0..count {
                    match self.next_signal(index, name)? {
                        Signal::Next(_) => {}
                        other => {
                            return Err(VerifyError::mismatch(
                                index,
                                name,
                                format!("{} more onNext", count - seen),
                                other.to_string(),
                            ));
                        }
                    }
                }
            }
            Step::NoEvent(duration) => self.expect_quiet(index, name, duration)?,
            Step::Await(duration) => match &self.clock {
                Some(clock) => clock.advance_by(duration),
                None => {
                    let until = Instant::now() + duration;
                    if self.deadline.is_some_and(|deadline| deadline < until) {
                        self.sleep_until(self.deadline);
                        return Err(self.timeout(index, name));
                    }
                    self.sleep_until(Some(until));
                }
            },
            Step::Request(n) => self.log.request(n),
            Step::Then(action) => action(),
            Step::Complete => match self.next_signal(index, name)? {
                Signal::Complete => {}
                other => return Err(VerifyError::mismatch(index, name, "onComplete()", other.to_string())),
            },
            Step::Error {
                expectation,
                description,
                check,
            } => match self.next_signal(index, expectation)? {
                Signal::Error(failure) if check(&failure) => {}
                other => return Err(VerifyError::mismatch(index, expectation, description, other.to_string())),
            },
            Step::Cancel => self.log.cancel(),
        }

        if let Some(violation) = self.log.violation() {
            return Err(VerifyError::ProtocolViolation(violation));
        }
        if self.deadline.is_some_and(|deadline| Instant::now() > deadline) {
            return Err(self.timeout(index, name));
        }
        Ok(())
    }

    fn timeout(&self, index: usize, expectation: &str) -> VerifyError {
        VerifyError::Timeout {
            step: index,
            expectation: expectation.to_string(),
            elapsed: self.started.elapsed(),
        }
    }

    fn sleep_until(&self, until: Option<Instant>) {
        if let Some(until) = until {
            std::thread::sleep(until.saturating_duration_since(Instant::now()));
        }
    }

    /// Next raw event, subscription included
    fn next_event(&mut self, index: usize, expectation: &str) -> Result<Event<T>> {
        if let Some(event) = self.log.poll() {
            return Ok(event);
        }
        // Under virtual time, tasks already due may still produce the event
        if let Some(clock) = &self.clock {
            clock.advance();
        }
        self.log
            .wait_until(self.deadline)
            .ok_or_else(|| self.timeout(index, expectation))
    }

    /// Next signal, consuming the subscription event if still pending
    fn next_signal(&mut self, index: usize, expectation: &str) -> Result<Signal<T>> {
        loop {
            match self.next_event(index, expectation)? {
                Event::Subscribed if !self.subscribed => self.subscribed = true,
                Event::Subscribed => {
                    return Err(VerifyError::ProtocolViolation(
                        "onSubscribe received twice".to_string(),
                    ));
                }
                Event::Signal(signal) => return Ok(signal),
            }
        }
    }

    fn expect_quiet(&mut self, index: usize, expectation: &str, duration: Duration) -> Result<()> {
        let event = match &self.clock {
            Some(clock) => {
                if self.log.is_empty() {
                    clock.advance_by(duration);
                }
                self.log.poll()
            }
            None => {
                let until = Instant::now() + duration;
                match self.deadline {
                    // Silence until the deadline still ends the run early
                    Some(deadline) if deadline < until => Some(
                        self.log
                            .wait_until(Some(deadline))
                            .ok_or_else(|| self.timeout(index, expectation))?,
                    ),
                    _ => self.log.wait_until(Some(until)),
                }
            }
        };
        match event {
            None => Ok(()),
            Some(event) => Err(VerifyError::mismatch(
                index,
                expectation,
                format!("no event for {:?}", duration),
                event.to_string(),
            )),
        }
    }
}
