//! YAML scenario model
//!
//! A scenario names a source, a chain of operators and the expected signal
//! script. Elements are JSON values so one file can mix strings, numbers and
//! objects.
//!
//! ```yaml
//! scenarios:
//!   - name: foo-bar
//!     source: { kind: just, values: [foo, bar] }
//!     expect:
//!       - { step: next, value: foo }
//!       - { step: next, value: bar }
//!       - { step: complete }
//! ```

use reflux::{Failure, Flux, Mono};
use reflux_test::{LastStep, StepVerifier, VerifierOptions, VerifyError};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Scenario definition and execution errors
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("scenario '{name}' is invalid: {reason}")]
    Invalid { name: String, reason: String },

    #[error("cannot uppercase {0}")]
    NotText(Value),

    #[error(transparent)]
    Verification(#[from] VerifyError),
}

/// Failure raised by an `error` source
#[derive(Error, Debug)]
#[error("{0}")]
pub struct ScriptedFailure(pub String);

/// Top-level scenario file
#[derive(Debug, Deserialize)]
pub struct ScenarioFile {
    pub scenarios: Vec<Scenario>,
}

impl ScenarioFile {
    /// Load scenarios from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let file: ScenarioFile = serde_yaml::from_str(&content)?;
        Ok(file)
    }
}

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub source: SourceSpec,
    #[serde(default)]
    pub operators: Vec<OperatorSpec>,
    /// Run under a virtual clock
    #[serde(default)]
    pub virtual_time: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub initial_request: Option<u64>,
    pub expect: Vec<StepSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    Just { values: Vec<Value> },
    Empty,
    Never,
    Error { message: String },
    Interval { period_ms: u64 },
    Range { start: i64, count: usize },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperatorSpec {
    Take { count: u64 },
    /// Uppercase strings, or every string field of an object
    Uppercase,
    /// Same as `uppercase`, through a `flat_map` onto a `Mono`
    AsyncUppercase,
    ConcatWith { source: SourceSpec },
    Exclude { value: Value },
    Log { category: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepSpec {
    Subscription,
    Next { value: Value },
    NextCount { count: u64 },
    NoEventMs { ms: u64 },
    AwaitMs { ms: u64 },
    Request { n: u64 },
    Complete,
    Error {
        #[serde(default)]
        message: Option<String>,
    },
    Cancel,
}

impl StepSpec {
    fn is_terminal(&self) -> bool {
        matches!(self, StepSpec::Complete | StepSpec::Error { .. } | StepSpec::Cancel)
    }
}

impl fmt::Display for StepSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepSpec::Subscription => write!(f, "subscription"),
            StepSpec::Next { value } => write!(f, "next {}", value),
            StepSpec::NextCount { count } => write!(f, "next_count {}", count),
            StepSpec::NoEventMs { ms } => write!(f, "no_event_ms {}", ms),
            StepSpec::AwaitMs { ms } => write!(f, "await_ms {}", ms),
            StepSpec::Request { n } => write!(f, "request {}", n),
            StepSpec::Complete => write!(f, "complete"),
            StepSpec::Error { .. } => write!(f, "error"),
            StepSpec::Cancel => write!(f, "cancel"),
        }
    }
}

impl SourceSpec {
    fn build(&self) -> Flux<Value> {
        match self {
            SourceSpec::Just { values } => Flux::from_iter(values.clone()),
            SourceSpec::Empty => Flux::empty(),
            SourceSpec::Never => Flux::never(),
            SourceSpec::Error { message } => Flux::error(ScriptedFailure(message.clone())),
            SourceSpec::Interval { period_ms } => {
                Flux::interval(Duration::from_millis(*period_ms)).map(Value::from)
            }
            SourceSpec::Range { start, count } => Flux::range(*start, *count).map(Value::from),
        }
    }
}

impl OperatorSpec {
    fn apply(&self, flux: Flux<Value>) -> Flux<Value> {
        match self {
            OperatorSpec::Take { count } => flux.take(*count),
            OperatorSpec::Uppercase => flux.try_map(uppercase),
            OperatorSpec::AsyncUppercase => {
                flux.flat_map(|value| Mono::just(value).try_map(uppercase))
            }
            OperatorSpec::ConcatWith { source } => flux.concat_with(source.build()),
            OperatorSpec::Exclude { value } => {
                let excluded = value.clone();
                flux.filter(move |candidate| *candidate != excluded)
            }
            OperatorSpec::Log { category } => flux.log(category),
        }
    }
}

/// Uppercase a string, or the string fields of an object
fn uppercase(value: Value) -> Result<Value, Failure> {
    match value {
        Value::String(text) => Ok(Value::String(text.to_uppercase())),
        Value::Object(fields) => Ok(Value::Object(
            fields
                .into_iter()
                .map(|(key, field)| match field {
                    Value::String(text) => (key, Value::String(text.to_uppercase())),
                    other => (key, other),
                })
                .collect(),
        )),
        other => Err(ScenarioError::NotText(other).into()),
    }
}

impl Scenario {
    /// Assemble the pipeline. Time-driven sources bind to the current
    /// default scheduler.
    pub fn build(&self) -> Flux<Value> {
        self.operators
            .iter()
            .fold(self.source.build(), |flux, operator| operator.apply(flux))
    }

    fn invalid(&self, reason: impl Into<String>) -> ScenarioError {
        ScenarioError::Invalid {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Run the scenario, returning the time verification took
    pub fn verify(&self) -> Result<Duration, ScenarioError> {
        let (last, body) = self
            .expect
            .split_last()
            .ok_or_else(|| self.invalid("no expectation steps"))?;
        if let Some(step) = body.iter().find(|step| step.is_terminal()) {
            return Err(self.invalid(format!("terminal step '{}' before the end", step)));
        }

        let mut options = VerifierOptions::new().with_scenario_name(self.name.clone());
        if let Some(n) = self.initial_request {
            options = options.with_initial_request(n);
        }

        let verifier = if self.virtual_time {
            StepVerifier::with_virtual_time_and_options(|| self.build(), options)
        } else {
            StepVerifier::create_with_options(self.build(), options)
        };
        let verifier = body.iter().fold(verifier, apply_step);
        let script = self.finish(verifier, last)?;

        let elapsed = match self.timeout_ms {
            Some(ms) => script.verify_timeout(Duration::from_millis(ms))?,
            None => script.verify()?,
        };
        Ok(elapsed)
    }

    fn finish(
        &self,
        verifier: StepVerifier<Value>,
        last: &StepSpec,
    ) -> Result<LastStep<Value>, ScenarioError> {
        match last {
            StepSpec::Complete => Ok(verifier.expect_complete()),
            StepSpec::Error {
                message: Some(message),
            } => Ok(verifier.expect_error_message(message.clone())),
            StepSpec::Error { message: None } => Ok(verifier.expect_error()),
            StepSpec::Cancel => Ok(verifier.then_cancel()),
            other => Err(self.invalid(format!("last step '{}' is not terminal", other))),
        }
    }
}

fn apply_step(verifier: StepVerifier<Value>, step: &StepSpec) -> StepVerifier<Value> {
    match step {
        StepSpec::Subscription => verifier.expect_subscription(),
        StepSpec::Next { value } => verifier.expect_next(value.clone()),
        StepSpec::NextCount { count } => verifier.expect_next_count(*count),
        StepSpec::NoEventMs { ms } => verifier.expect_no_event(Duration::from_millis(*ms)),
        StepSpec::AwaitMs { ms } => verifier.then_await(Duration::from_millis(*ms)),
        StepSpec::Request { n } => verifier.then_request(*n),
        // Rejected before the script is assembled
        StepSpec::Complete | StepSpec::Error { .. } | StepSpec::Cancel => verifier,
    }
}
