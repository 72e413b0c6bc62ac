//! SaltStack execution engine.
//!
//! Runs `salt-call state.apply` masterless against the extracted file root,
//! follows its log output while it runs, and turns the exit code and YAML
//! report into an [`ExecutionResult`].
//!
//! Layout below the working directory (`<cache>/installer`):
//!
//! ```text
//! salt/minion            enable_fqdns_grains: False
//! logs/saltstack.log     stderr, then stdout
//! logs/results.yaml      stdout
//! ```

pub mod machine;
pub mod patterns;
pub mod results;
pub mod runner;

pub use results::{ExecutionResult, ExitClass, ReportError, SaltFailure, StateOutcome};

use crate::cancel::Cancellation;
use log::{debug, info, warn};
use patterns::LinePatterns;
use runner::{SaltProcess, is_call_binary};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Minion configuration written before each run.
const MINION_CONFIG: &str = "enable_fqdns_grains: False\n";

/// Errors that prevent a `salt-call` run from completing.
///
/// A run that completes with failed states is not an error here; see
/// [`ExecutionResult::check`].
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// Running as root without a target user.
    #[error("--user was not provided, or install was not ran with sudo")]
    UserRequired,

    /// Preparing the working directory failed.
    #[error("unable to write {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// Pillars could not be encoded as JSON.
    #[error("unable to encode pillar data: {0}")]
    Pillars(#[from] serde_json::Error),

    /// Log patterns failed to compile.
    #[error("invalid log pattern: {0}")]
    Patterns(#[from] regex::Error),

    /// `salt-call` could not be started.
    #[error("unable to run {binary}: {source}", binary = .binary.display())]
    Spawn {
        /// The binary that failed to start.
        binary: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// The child's output pipes were not available.
    #[error("unable to capture salt-call output")]
    Pipes,

    /// Waiting on the child failed.
    #[error("unable to wait for salt-call: {0}")]
    Wait(io::Error),

    /// Killing the child's process group failed.
    #[error("unable to kill salt-call (pid {pid}): {source}")]
    Kill {
        /// Child process id.
        pid: u32,
        /// The underlying error.
        source: io::Error,
    },

    /// An output reader thread panicked.
    #[error("salt-call output reader panicked")]
    ReaderPanicked,

    /// The YAML report could not be parsed.
    #[error(transparent)]
    Report(#[from] ReportError),
}

impl ExecutionError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Everything needed for one `state.apply` run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaltConfig {
    /// The `salt-call` (or `salt`) binary.
    pub binary: PathBuf,
    /// Working directory for minion config and logs.
    pub work_dir: PathBuf,
    /// Salt file root holding the distro's states.
    pub file_root: PathBuf,
    /// State to apply.
    pub state: String,
    /// Pillar data passed on the command line.
    pub pillars: BTreeMap<String, String>,
    /// `salt-call -l` level.
    pub log_level: String,
    /// Apply with `test=True`.
    pub test: bool,
    /// Target user for the install.
    pub user: Option<String>,
    /// Require a target user when running as root.
    pub root_check: bool,
}

/// Runs `salt-call` for one [`SaltConfig`].
#[derive(Debug, Clone)]
pub struct SaltEngine {
    config: SaltConfig,
    patterns: LinePatterns,
}

impl SaltEngine {
    /// Create an engine.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Patterns`] if the log matchers fail to
    /// compile.
    pub fn new(config: SaltConfig) -> Result<Self, ExecutionError> {
        Ok(Self {
            config,
            patterns: LinePatterns::new()?,
        })
    }

    /// Minion configuration directory.
    #[must_use]
    pub fn config_dir(&self) -> PathBuf {
        self.config.work_dir.join("salt")
    }

    /// Log directory.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.config.work_dir.join("logs")
    }

    /// Create the log directory and write the minion configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Io`] on filesystem failures.
    pub fn setup(&self) -> Result<(), ExecutionError> {
        let logs = self.log_dir();
        fs::create_dir_all(&logs).map_err(ExecutionError::io(&logs))?;
        let config_dir = self.config_dir();
        fs::create_dir_all(&config_dir).map_err(ExecutionError::io(&config_dir))?;
        let minion = config_dir.join("minion");
        fs::write(&minion, MINION_CONFIG).map_err(ExecutionError::io(&minion))
    }

    /// Command-line arguments for the run.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::Pillars`] if the pillars cannot be encoded.
    pub fn args(&self) -> Result<Vec<String>, ExecutionError> {
        let pillar = serde_json::to_string(&self.config.pillars)?;
        let mut args = Vec::with_capacity(16);
        if !is_call_binary(&self.config.binary) {
            args.push("call".to_owned());
        }
        args.extend([
            "--config-dir".to_owned(),
            self.config_dir().display().to_string(),
            "--local".to_owned(),
            "--retcode-passthrough".to_owned(),
            "-l".to_owned(),
            self.config.log_level.clone(),
            "--out".to_owned(),
            "yaml".to_owned(),
            "--file-root".to_owned(),
            self.config.file_root.display().to_string(),
            "--no-color".to_owned(),
            "state.apply".to_owned(),
            self.config.state.clone(),
            format!("pillar={pillar}"),
        ]);
        if self.config.test {
            args.push("test=True".to_owned());
        }
        Ok(args)
    }

    /// Check preconditions, prepare the working directory and run salt.
    ///
    /// A completed run is returned whatever its exit class; diagnostics are
    /// logged before returning.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when the run cannot be started, supervised
    /// or parsed.
    pub fn run(&self, cancel: &Cancellation) -> Result<ExecutionResult, ExecutionError> {
        info!("checking if install can progress");
        let sudo_user = std::env::var("SUDO_USER").ok();
        check_root(
            self.config.root_check,
            effective_uid(),
            self.config.user.as_deref(),
            sudo_user.as_deref(),
        )?;

        debug!("configuring the installer");
        self.setup()?;
        let logs = self.log_dir();
        let process = SaltProcess {
            binary: self.config.binary.clone(),
            args: self.args()?,
            log_file: logs.join("saltstack.log"),
            results_file: logs.join("results.yaml"),
        };

        if let Some(user) = &self.config.user {
            info!("installing as user: {user}");
        }
        info!("starting saltstack run");
        let result = process.run(&self.patterns, cancel)?;
        report(&result);
        Ok(result)
    }
}

/// Refuse to run as root unless a target user is known.
///
/// # Errors
///
/// Returns [`ExecutionError::UserRequired`] when `euid` is 0, the check is
/// enabled and neither `user` nor `sudo_user` is set.
///
/// # Examples
///
/// ```
/// use cast_installer::engine::check_root;
///
/// assert!(check_root(true, 0, None, None).is_err());
/// assert!(check_root(true, 0, None, Some("analyst")).is_ok());
/// assert!(check_root(true, 1000, None, None).is_ok());
/// assert!(check_root(false, 0, None, None).is_ok());
/// ```
pub fn check_root(
    enabled: bool,
    euid: u32,
    user: Option<&str>,
    sudo_user: Option<&str>,
) -> Result<(), ExecutionError> {
    let has_user = user.is_some_and(|u| !u.is_empty()) || sudo_user.is_some_and(|u| !u.is_empty());
    if enabled && euid == 0 && !has_user {
        return Err(ExecutionError::UserRequired);
    }
    Ok(())
}

fn effective_uid() -> u32 {
    // SAFETY: `geteuid` has no preconditions and cannot fail.
    unsafe { libc::geteuid() }
}

fn report(result: &ExecutionResult) {
    match result.class {
        ExitClass::Success => info!("salt-call completed successfully"),
        ExitClass::PartialFailure => info!("salt-call completed but had failed states"),
        ExitClass::ExecutionError => {
            warn!("salt-call finished with errors");
            for line in &result.errors {
                warn!("{line}");
            }
        }
        ExitClass::Terminated => warn!("salt-call terminated"),
        ExitClass::Unexpected(code) => warn!("salt-call exited with code {code}"),
    }

    if !result.class.has_report() {
        return;
    }
    if let Some(first) = &result.first_failure {
        let comment = first.comment.split_whitespace().collect::<Vec<_>>().join(" ");
        warn!(
            "first failed state: sls={} run_num={} comment={comment}",
            first.sls, first.run_number
        );
    }
    info!(
        "statistics: total={} success={} failed={}",
        result.total, result.success, result.failed
    );
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
