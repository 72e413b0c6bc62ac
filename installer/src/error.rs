//! Error types for the cast installer.
//!
//! Each stage of the pipeline has its own error enum; [`InstallerError`]
//! wraps them so the CLI can report any failure with one type.

use crate::deps::DependencyError;
use crate::distro::{AcquireError, ResolveError};
use crate::engine::{ExecutionError, SaltFailure};
use crate::init::InitError;
use crate::manifest::ManifestError;
use crate::state::StateStoreError;
use thiserror::Error;

/// Errors that can occur while installing a distro.
#[derive(Debug, Error)]
pub enum InstallerError {
    /// The distro could not be resolved to a release and manifest.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Downloading, verifying or extracting the release failed.
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    /// The manifest could not map the mode to a state.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// `salt-call` is not available.
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// `salt-call` could not be run.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// `salt-call` ran but did not succeed.
    #[error(transparent)]
    Salt(#[from] SaltFailure),

    /// The install state could not be located.
    #[error(transparent)]
    State(#[from] StateStoreError),

    /// Project scaffolding failed.
    #[error(transparent)]
    Init(#[from] InitError),

    /// The run was cancelled before salt started.
    #[error("installation cancelled")]
    Cancelled,

    /// A configured path is not valid UTF-8.
    #[error("path is not valid UTF-8: {path}")]
    NonUtf8Path {
        /// Lossy rendering of the offending path.
        path: String,
    },

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<crate::cancel::Cancelled> for InstallerError {
    fn from(_: crate::cancel::Cancelled) -> Self {
        Self::Cancelled
    }
}

/// Result type alias using [`InstallerError`].
pub type Result<T> = std::result::Result<T, InstallerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_check_message_passes_through() {
        let err = InstallerError::from(ExecutionError::UserRequired);
        assert_eq!(
            err.to_string(),
            "--user was not provided, or install was not ran with sudo"
        );
    }

    #[test]
    fn salt_failures_keep_their_wording() {
        let err = InstallerError::from(SaltFailure::Terminated);
        assert_eq!(err.to_string(), "salt-call terminated");
    }

    #[test]
    fn resolve_errors_name_the_identifier() {
        let err = InstallerError::from(ResolveError::InvalidIdentifier {
            identifier: "sift".to_owned(),
        });
        assert!(err.to_string().contains("expect owner/repo: sift"));
    }

    #[test]
    fn io_errors_keep_their_source() {
        let err = InstallerError::from(std::io::Error::other("disk full"));
        assert!(err.to_string().contains("disk full"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
