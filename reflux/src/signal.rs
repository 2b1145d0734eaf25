//! Signals exchanged between a producer and its consumer

use crate::error::Failure;
use std::fmt;

/// One element of a subscription's signal sequence
#[derive(Debug, Clone)]
pub enum Signal<T> {
    Next(T),
    Complete,
    Error(Failure),
}

impl<T> Signal<T> {
    /// True for `Complete` and `Error`
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Signal::Next(_))
    }

    /// The carried value, if this is a `Next`
    pub fn value(&self) -> Option<&T> {
        match self {
            Signal::Next(value) => Some(value),
            _ => None,
        }
    }

    /// The carried failure, if this is an `Error`
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Signal::Error(failure) => Some(failure),
            _ => None,
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Next(value) => write!(f, "onNext({:?})", value),
            Signal::Complete => write!(f, "onComplete()"),
            Signal::Error(failure) => write!(f, "onError({})", failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;

    #[test]
    fn test_terminal_classification() {
        assert!(!Signal::Next(1).is_terminal());
        assert!(Signal::<i32>::Complete.is_terminal());
        assert!(Signal::<i32>::Error(ReactiveError::NonPositiveRequest(0).into()).is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(Signal::Next("foo").to_string(), "onNext(\"foo\")");
        assert_eq!(Signal::<u8>::Complete.to_string(), "onComplete()");
        let error: Signal<u8> = Signal::Error(ReactiveError::Overflow { tick: 0 }.into());
        assert_eq!(
            error.to_string(),
            "onError(could not emit tick 0 due to lack of requests)"
        );
    }
}
