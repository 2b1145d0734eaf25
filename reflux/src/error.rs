//! Error types for Reflux

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for fallible operator callbacks
pub type Result<T> = std::result::Result<T, Failure>;

/// Errors raised by the engine itself and delivered through `on_error`
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReactiveError {
    /// A subscriber requested zero elements
    #[error("request amount must be positive, got {0}")]
    NonPositiveRequest(u64),

    /// A time-driven source fired while no demand was outstanding
    #[error("could not emit tick {tick} due to lack of requests")]
    Overflow { tick: u64 },

    /// A scheduler could not be started or refused work
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Signal-carried failure.
///
/// Wraps any error type behind an `Arc` so the same failure can be handed to
/// several subscribers. The concrete kind stays observable through
/// [`Failure::is`] and [`Failure::downcast_ref`].
#[derive(Clone)]
pub struct Failure(Arc<dyn StdError + Send + Sync + 'static>);

impl Failure {
    /// Wrap an error value
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Check whether the wrapped error is of kind `E`
    pub fn is<E>(&self) -> bool
    where
        E: StdError + 'static,
    {
        self.0.is::<E>()
    }

    /// Borrow the wrapped error as `E`, if it is one
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: StdError + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Borrow the wrapped error as a trait object
    pub fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.0
    }
}

impl<E> From<E> for Failure
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}
