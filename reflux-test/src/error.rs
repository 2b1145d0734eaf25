//! Verification failures

use std::time::Duration;
use thiserror::Error;

/// Result type alias for verification
pub type Result<T> = std::result::Result<T, VerifyError>;

/// Why a verification did not pass
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// The observed signal differs from the expected one
    #[error("step {step} ({expectation}): expected {expected}, got {actual}")]
    Mismatch {
        step: usize,
        expectation: String,
        expected: String,
        actual: String,
    },

    /// The deadline passed while waiting for a signal
    #[error("step {step} ({expectation}): timed out after {elapsed:?}")]
    Timeout {
        step: usize,
        expectation: String,
        elapsed: Duration,
    },

    /// The publisher broke the signal protocol
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
}

impl VerifyError {
    pub(crate) fn mismatch(
        step: usize,
        expectation: &str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        VerifyError::Mismatch {
            step,
            expectation: expectation.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
