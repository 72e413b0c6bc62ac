//! Classification of a finished `salt-call` run.
//!
//! `salt-call --retcode-passthrough --out yaml` prints a YAML report on
//! stdout and exits `0` when every state succeeded, `2` when some failed and
//! `1` when it could not run the states at all.

use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Exit code reported for a killed or signalled `salt-call`.
pub const TERMINATED_CODE: i32 = -1;

/// Outcome class of a run, keyed on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitClass {
    /// Exit `0`.
    Success,
    /// Exit `1`: salt could not render or run the states.
    ExecutionError,
    /// Exit `2`: some states failed.
    PartialFailure,
    /// Killed, by cancellation or a signal.
    Terminated,
    /// Any other exit code.
    Unexpected(i32),
}

impl ExitClass {
    /// Classify an exit code.
    ///
    /// # Examples
    ///
    /// ```
    /// use cast_installer::engine::results::ExitClass;
    ///
    /// assert_eq!(ExitClass::from_code(2), ExitClass::PartialFailure);
    /// assert_eq!(ExitClass::from_code(-1), ExitClass::Terminated);
    /// assert_eq!(ExitClass::from_code(137), ExitClass::Unexpected(137));
    /// ```
    #[must_use]
    pub const fn from_code(code: i32) -> Self {
        match code {
            0 => Self::Success,
            1 => Self::ExecutionError,
            2 => Self::PartialFailure,
            TERMINATED_CODE => Self::Terminated,
            other => Self::Unexpected(other),
        }
    }

    /// Whether per-state outcomes are parsed for this class.
    #[must_use]
    pub const fn has_report(self) -> bool {
        matches!(self, Self::Success | Self::PartialFailure)
    }
}

/// One entry of the `local:` report.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StateOutcome {
    /// State id.
    #[serde(rename = "__id__", default)]
    pub id: String,
    /// Execution order.
    #[serde(rename = "__run_num__", default)]
    pub run_number: u64,
    /// SLS file the state came from.
    #[serde(rename = "__sls__", default)]
    pub sls: String,
    /// State function name argument.
    #[serde(default)]
    pub name: String,
    /// `true`, `false`, or `null` in test mode.
    #[serde(default)]
    pub result: Option<bool>,
    /// Human-readable comment; salt sometimes emits a list.
    #[serde(default, deserialize_with = "lenient_text")]
    pub comment: String,
    /// Duration in milliseconds.
    #[serde(rename = "duration", default, deserialize_with = "lenient_duration")]
    pub duration_ms: f64,
    /// Wall-clock start time.
    #[serde(default)]
    pub start_time: String,
    /// Reported changes, kept as raw YAML.
    #[serde(default)]
    pub changes: serde_yaml::Value,
    /// Warnings attached to the state.
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl StateOutcome {
    /// Whether the state failed. Test-mode `null` results are not failures.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.result == Some(false)
    }
}

#[derive(Debug, Deserialize)]
struct StateReport {
    #[serde(default)]
    local: BTreeMap<String, StateOutcome>,
}

#[derive(Debug, Deserialize)]
struct ErrorReport {
    local: Vec<String>,
}

/// The report stdout could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("unable to parse salt-call results: {reason}")]
pub struct ReportError {
    /// Parser message.
    pub reason: String,
}

/// Typed outcome of a `salt-call` run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionResult {
    /// Outcome class.
    pub class: ExitClass,
    /// Per-state outcomes in run order; empty unless the class has a report.
    pub outcomes: Vec<StateOutcome>,
    /// Number of states reported.
    pub total: usize,
    /// Number of states that succeeded.
    pub success: usize,
    /// Number of states that failed.
    pub failed: usize,
    /// The failed state with the lowest run number.
    pub first_failure: Option<StateOutcome>,
    /// Error strings from a `{local: [..]}` report.
    pub errors: Vec<String>,
    /// Raw stdout.
    pub raw_output: String,
}

impl ExecutionResult {
    /// Classify a run from its exit code and stdout.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError`] when a success or partial-failure report is
    /// not valid YAML of the expected shape.
    pub fn classify(code: i32, stdout: String) -> Result<Self, ReportError> {
        let class = ExitClass::from_code(code);
        let mut result = Self {
            class,
            outcomes: Vec::new(),
            total: 0,
            success: 0,
            failed: 0,
            first_failure: None,
            errors: Vec::new(),
            raw_output: stdout,
        };

        if class.has_report() {
            let report: StateReport = serde_yaml::from_str(&result.raw_output)
                .map_err(|e| ReportError {
                    reason: e.to_string(),
                })?;
            let mut outcomes: Vec<StateOutcome> = report.local.into_values().collect();
            outcomes.sort_by_key(|outcome| outcome.run_number);

            result.total = outcomes.len();
            result.failed = outcomes.iter().filter(|o| o.failed()).count();
            result.success = outcomes.iter().filter(|o| o.result == Some(true)).count();
            result.first_failure = outcomes.iter().find(|o| o.failed()).cloned();
            result.outcomes = outcomes;
        } else if class == ExitClass::ExecutionError {
            if let Ok(report) = serde_yaml::from_str::<ErrorReport>(&result.raw_output) {
                result.errors = report.local;
            }
        }
        Ok(result)
    }

    /// Convert a non-successful class into an error.
    ///
    /// # Errors
    ///
    /// Returns the [`SaltFailure`] matching the class.
    pub fn check(&self) -> Result<(), SaltFailure> {
        match self.class {
            ExitClass::Success => Ok(()),
            ExitClass::ExecutionError => Err(SaltFailure::Errored {
                output: if self.errors.is_empty() {
                    self.raw_output.trim().to_owned()
                } else {
                    self.errors.join("\n")
                },
            }),
            ExitClass::PartialFailure => Err(SaltFailure::FailedStates {
                failed: self.failed,
                total: self.total,
            }),
            ExitClass::Terminated => Err(SaltFailure::Terminated),
            ExitClass::Unexpected(code) => Err(SaltFailure::UnexpectedExit { code }),
        }
    }
}

/// A `salt-call` run that did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SaltFailure {
    /// Exit `1`; carries salt's error output.
    #[error("salt-call finished with errors: {output}")]
    Errored {
        /// Error text.
        output: String,
    },

    /// Exit `2`.
    #[error("salt-call completed but had failed states ({failed} of {total})")]
    FailedStates {
        /// Failed state count.
        failed: usize,
        /// Total state count.
        total: usize,
    },

    /// Killed by cancellation or a signal.
    #[error("salt-call terminated")]
    Terminated,

    /// Any other exit code.
    #[error("salt-call exited with unexpected code {code}")]
    UnexpectedExit {
        /// The exit code.
        code: i32,
    },
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_yaml::Value::Null => String::new(),
        serde_yaml::Value::String(text) => text,
        serde_yaml::Value::Sequence(items) => items
            .iter()
            .map(|item| match item {
                serde_yaml::Value::String(text) => text.clone(),
                other => serde_yaml::to_string(other).unwrap_or_default().trim().to_owned(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        other => serde_yaml::to_string(&other)
            .unwrap_or_default()
            .trim()
            .to_owned(),
    })
}

/// Durations are usually floats but some salt versions print `"1.2 ms"`.
fn lenient_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_yaml::Value::Number(number) => number.as_f64().unwrap_or_default(),
        serde_yaml::Value::String(text) => text
            .split_whitespace()
            .next()
            .and_then(|token| token.parse().ok())
            .unwrap_or_default(),
        _ => 0.0,
    })
}
