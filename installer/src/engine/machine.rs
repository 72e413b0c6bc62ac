//! State machine over `salt-call` stderr lines.
//!
//! [`transition`] is pure: it maps the current [`LogState`] and one line to
//! the next state and at most one [`LogEvent`]. The runner feeds it lines
//! and logs the events.

use super::patterns::LinePatterns;
use log::{debug, info, trace, warn};

/// Salt prefixes some log lines with a comment marker.
const COMMENT_PREFIX: &str = "# ";
/// Suffix of result lines reporting a failed state.
const FAILURE_SUFFIX: &str = "Failure!";

/// Where the machine is in the log stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogState {
    /// Between states.
    #[default]
    Idle,
    /// Inside a running state.
    InState {
        /// State description from the begin line.
        state: String,
        /// Start time from the begin line.
        start: String,
        /// Whether a `Failure!` result line has been seen.
        failure_seen: bool,
    },
}

/// One completed state, as reported in the log.
#[derive(Debug, Clone, PartialEq)]
pub struct StateCompletion {
    /// State description from the end line.
    pub state: String,
    /// Start time from the begin line.
    pub start: String,
    /// End time from the end line.
    pub end: String,
    /// Duration in milliseconds.
    pub duration_ms: f64,
    /// Whether a failure was reported while the state ran.
    pub failed: bool,
}

/// Something worth reporting from a log line.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// A state started.
    StateBegin {
        /// State description.
        state: String,
        /// Start time.
        start: String,
    },
    /// A state function is executing.
    Executing {
        /// State function.
        state: String,
        /// Its target.
        target: String,
    },
    /// A result line inside a state.
    Result {
        /// The line text.
        line: String,
        /// Whether the line reports a failure.
        failure: bool,
    },
    /// A state finished.
    StateCompleted(StateCompletion),
    /// Any other line outside a state.
    Other(String),
}

/// Advance the machine by one line.
///
/// # Examples
///
/// ```
/// use cast_installer::engine::machine::{LogEvent, LogState, transition};
/// use cast_installer::engine::patterns::LinePatterns;
///
/// let patterns = LinePatterns::new().expect("patterns");
/// let (state, _) = transition(
///     LogState::Idle,
///     "[INFO    ] Running state [curl] at time 10:00:00",
///     &patterns,
/// );
/// let (state, event) = transition(
///     state,
///     "[INFO    ] Completed state [curl] at time 10:00:01 (duration_in_ms=12.5)",
///     &patterns,
/// );
/// assert_eq!(state, LogState::Idle);
/// let Some(LogEvent::StateCompleted(done)) = event else { panic!("expected completion") };
/// assert_eq!(done.state, "curl");
/// assert!(!done.failed);
/// ```
#[must_use]
pub fn transition(
    current: LogState,
    raw: &str,
    patterns: &LinePatterns,
) -> (LogState, Option<LogEvent>) {
    let line = raw.strip_prefix(COMMENT_PREFIX).unwrap_or(raw);

    match current {
        LogState::Idle => match patterns.begin(line) {
            Some(begin) => (
                LogState::InState {
                    state: begin.state.to_owned(),
                    start: begin.time.to_owned(),
                    failure_seen: false,
                },
                Some(LogEvent::StateBegin {
                    state: begin.state.to_owned(),
                    start: begin.time.to_owned(),
                }),
            ),
            None => (LogState::Idle, Some(LogEvent::Other(line.to_owned()))),
        },
        LogState::InState {
            state,
            start,
            failure_seen,
        } => {
            if line.trim().is_empty() {
                return (
                    LogState::InState {
                        state,
                        start,
                        failure_seen,
                    },
                    None,
                );
            }
            if let Some(exec) = patterns.exec(line) {
                let event = LogEvent::Executing {
                    state: exec.state.to_owned(),
                    target: exec.target.to_owned(),
                };
                return (
                    LogState::InState {
                        state,
                        start,
                        failure_seen,
                    },
                    Some(event),
                );
            }
            if let Some(end) = patterns.end(line) {
                let completion = StateCompletion {
                    state: end.state.to_owned(),
                    start,
                    end: end.time.to_owned(),
                    duration_ms: end.duration_ms.parse().unwrap_or_default(),
                    failed: failure_seen,
                };
                return (LogState::Idle, Some(LogEvent::StateCompleted(completion)));
            }

            let failure = line.ends_with(FAILURE_SUFFIX);
            (
                LogState::InState {
                    state,
                    start,
                    failure_seen: failure_seen || failure,
                },
                Some(LogEvent::Result {
                    line: line.to_owned(),
                    failure,
                }),
            )
        }
    }
}

/// Log an event at the level its kind warrants.
pub fn log_event(event: &LogEvent) {
    match event {
        LogEvent::StateBegin { state, start } => debug!("running state {state} (began {start})"),
        LogEvent::Executing { state, target } => info!("Executing {state} for {target}"),
        LogEvent::Result { line, failure: true } => warn!("Result: {line}"),
        LogEvent::Result { line, failure: false } => debug!("Result: {line}"),
        LogEvent::StateCompleted(done) if done.failed => warn!(
            "state failed: {} ({} to {}, {} ms)",
            done.state, done.start, done.end, done.duration_ms
        ),
        LogEvent::StateCompleted(done) => info!(
            "state completed: {} ({} to {}, {} ms)",
            done.state, done.start, done.end, done.duration_ms
        ),
        LogEvent::Other(line) => trace!("{line}"),
    }
}
