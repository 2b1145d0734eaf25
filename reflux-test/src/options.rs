//! Verifier configuration

use reflux::UNBOUNDED;
use serde::Deserialize;
use std::time::Duration;

/// Options applied to a [`StepVerifier`](crate::StepVerifier) run
///
/// Deserializable so scenario files can carry them:
///
/// ```yaml
/// initial_request: 16
/// timeout_ms: 2000
/// scenario_name: bounded-demand
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VerifierOptions {
    /// Demand requested as soon as the subscription arrives
    pub initial_request: u64,
    /// Deadline for `verify()` in milliseconds, none means wait forever
    pub timeout_ms: Option<u64>,
    /// Name recorded on the verification log span
    pub scenario_name: Option<String>,
}

impl Default for VerifierOptions {
    fn default() -> Self {
        Self {
            initial_request: UNBOUNDED,
            timeout_ms: None,
            scenario_name: None,
        }
    }
}

impl VerifierOptions {
    /// Create options with unbounded initial demand and no deadline
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the demand requested on subscription. Zero requests nothing.
    pub fn with_initial_request(mut self, n: u64) -> Self {
        self.initial_request = n;
        self
    }

    /// Set the default deadline used by `verify()`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis().try_into().unwrap_or(u64::MAX));
        self
    }

    /// Set the scenario name
    pub fn with_scenario_name(mut self, name: impl Into<String>) -> Self {
        self.scenario_name = Some(name.into());
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
