//! Cooperative cancellation shared by network calls and the salt run.
//!
//! A [`Cancellation`] is a cheap, cloneable handle over one atomic flag and
//! an optional deadline. Signal handlers set the flag; long-running work polls
//! [`Cancellation::is_cancelled`] or calls [`Cancellation::check`].

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Error returned when work stops because the run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("operation cancelled")]
pub struct Cancelled;

/// Shared cancellation token.
///
/// # Examples
///
/// ```
/// use cast_installer::cancel::Cancellation;
///
/// let token = Cancellation::new();
/// let worker = token.clone();
/// assert!(!worker.is_cancelled());
/// token.cancel();
/// assert!(worker.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    /// Create a token that is only cancelled explicitly.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a copy of this token that also expires after `timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    /// Request cancellation for every clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancelled or past the deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Fail with [`Cancelled`] when the token has fired.
    ///
    /// # Errors
    ///
    /// Returns [`Cancelled`] if [`Self::is_cancelled`] is true.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.is_cancelled() {
            return Err(Cancelled);
        }
        Ok(())
    }

    /// The raw flag, for registration with `signal_hook::flag`.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }
}

/// Reader adapter that fails with [`Cancelled`] once the token fires.
pub struct CancellableReader<R> {
    inner: R,
    token: Cancellation,
}

impl<R> CancellableReader<R> {
    /// Wrap `inner` so reads observe `token`.
    pub const fn new(inner: R, token: Cancellation) -> Self {
        Self { inner, token }
    }
}

impl<R: Read> Read for CancellableReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.token.is_cancelled() {
            return Err(std::io::Error::other(Cancelled));
        }
        self.inner.read(buf)
    }
}
