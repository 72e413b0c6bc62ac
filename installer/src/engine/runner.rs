//! Supervised `salt-call` subprocess.
//!
//! Three paths run inside one thread scope: a stderr reader that tees raw
//! bytes to the log file and drives the log state machine, a stdout drain,
//! and the calling thread, which waits on the child and watches the
//! cancellation token. All are joined before the result is classified.

use super::ExecutionError;
use super::machine::{LogEvent, LogState, StateCompletion, log_event, transition};
use super::patterns::LinePatterns;
use super::results::{ExecutionResult, TERMINATED_CODE};
use crate::cancel::Cancellation;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread;
use std::time::Duration;
use wait_timeout::ChildExt;

/// How often the supervisor checks for cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A prepared `salt-call` invocation.
#[derive(Debug, Clone)]
pub struct SaltProcess {
    /// Binary to execute.
    pub binary: PathBuf,
    /// Full argument list.
    pub args: Vec<String>,
    /// Log file receiving stderr, then stdout. Truncated on start.
    pub log_file: PathBuf,
    /// File receiving stdout.
    pub results_file: PathBuf,
}

/// How the child ended.
struct Exit {
    code: i32,
    cancelled: bool,
}

impl SaltProcess {
    /// Run the process to completion or cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError`] when the log file cannot be opened, the
    /// process cannot be spawned or killed, a reader fails, or the report
    /// cannot be parsed.
    pub fn run(
        &self,
        patterns: &LinePatterns,
        cancel: &Cancellation,
    ) -> Result<ExecutionResult, ExecutionError> {
        let mut log_file = File::create(&self.log_file).map_err(ExecutionError::io(&self.log_file))?;

        debug!("running command {} {:?}", self.binary.display(), self.args);
        let mut child = Command::new(&self.binary)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()
            .map_err(|source| ExecutionError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;
        let (Some(stderr), Some(mut stdout)) = (child.stderr.take(), child.stdout.take()) else {
            return Err(ExecutionError::Pipes);
        };

        let (exit, completions, output) = thread::scope(|scope| {
            let log = &mut log_file;
            let reader = scope.spawn(move || read_stderr(stderr, log, patterns));
            let drain = scope.spawn(move || {
                let mut buffer = Vec::new();
                stdout.read_to_end(&mut buffer).map(|_| buffer)
            });
            let exit = supervise(&mut child, cancel);
            debug!("waiting for stderr read to complete");
            let completions = reader.join();
            let output = drain.join();
            (exit, completions, output)
        });

        let exit = exit?;
        let completions = completions
            .map_err(|_| ExecutionError::ReaderPanicked)?
            .map_err(ExecutionError::io(&self.log_file))?;
        let output = output
            .map_err(|_| ExecutionError::ReaderPanicked)?
            .map_err(ExecutionError::io(&self.results_file))?;
        debug!("{} states completed in the log", completions.len());

        if let Err(e) = log_file.write_all(&output) {
            warn!("unable to write to log file: {e}");
        }
        if let Err(e) = fs::write(&self.results_file, &output) {
            warn!("unable to write to results file: {e}");
        }
        info!("log file location: {}", self.log_file.display());
        info!("results file location: {}", self.results_file.display());

        let code = if exit.cancelled {
            TERMINATED_CODE
        } else {
            exit.code
        };
        let stdout = String::from_utf8_lossy(&output).into_owned();
        Ok(ExecutionResult::classify(code, stdout)?)
    }
}

/// Read stderr to end-of-stream, teeing raw bytes to `log`.
fn read_stderr(
    stderr: ChildStderr,
    log: &mut File,
    patterns: &LinePatterns,
) -> io::Result<Vec<StateCompletion>> {
    let mut reader = BufReader::new(stderr);
    let mut buffer = Vec::new();
    let mut state = LogState::Idle;
    let mut completions = Vec::new();

    loop {
        buffer.clear();
        if reader.read_until(b'\n', &mut buffer)? == 0 {
            break;
        }
        log.write_all(&buffer)?;

        let text = String::from_utf8_lossy(&buffer);
        let line = text.trim_end_matches(['\n', '\r']);
        let (next, event) = transition(state, line, patterns);
        state = next;
        if let Some(event) = event {
            log_event(&event);
            if let LogEvent::StateCompleted(done) = event {
                completions.push(done);
            }
        }
    }
    debug!("stderr read is complete");
    Ok(completions)
}

/// Wait for the child, killing its process group once if cancelled.
fn supervise(child: &mut Child, cancel: &Cancellation) -> Result<Exit, ExecutionError> {
    loop {
        if cancel.is_cancelled() {
            warn!("cancellation requested, killing salt-call process");
            let killed = kill_group(child);
            if killed.is_err() {
                // Reap the direct child so the pipes close and readers finish.
                if let Err(e) = child.kill() {
                    warn!("unable to kill salt-call directly: {e}");
                }
            }
            let status = child.wait().map_err(ExecutionError::Wait)?;
            killed.map_err(|source| ExecutionError::Kill {
                pid: child.id(),
                source,
            })?;
            warn!("salt-call killed");
            return Ok(Exit {
                code: status.code().unwrap_or(TERMINATED_CODE),
                cancelled: true,
            });
        }

        if let Some(status) = child
            .wait_timeout(POLL_INTERVAL)
            .map_err(ExecutionError::Wait)?
        {
            return Ok(Exit {
                code: status.code().unwrap_or(TERMINATED_CODE),
                cancelled: false,
            });
        }
    }
}

/// Send `SIGKILL` to the child's process group.
fn kill_group(child: &Child) -> io::Result<()> {
    let pid = i32::try_from(child.id()).map_err(io::Error::other)?;
    // SAFETY: `kill` has no memory-safety preconditions; the child leads its
    // own process group because it was spawned with `process_group(0)`.
    let rc = unsafe { libc::kill(-pid, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

/// Whether `path` names a `*-call` binary, which takes no `call` subcommand.
#[must_use]
pub fn is_call_binary(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().ends_with("-call"))
}
