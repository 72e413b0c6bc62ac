//! Integrity and authenticity checks for downloaded release files.
//!
//! Two generations of release signing exist, matching the manifest schema:
//!
//! - **Legacy (v1)**: `<archive>.sha256` checksum files and armored PGP
//!   detached signatures (`*.asc`) over the source archive, checked against
//!   the embedded release signing key.
//! - **Current (v2)**: a `checksums.txt` of SHA-512 digests signed with
//!   `cosign sign-blob`, verified offline against the release's `cosign.pub`.
//!
//! A verified file is marked with an empty `<file>.valid` sentinel so that
//! later runs against the same cache directory skip the work.

pub mod cosign;
pub mod digest;
pub mod legacy;

use crate::manifest::SchemaVersion;
use crate::release::ReleaseDescriptor;
use log::info;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Suffix of verification sentinel files.
pub const SENTINEL_SUFFIX: &str = ".valid";

/// Errors arising from release verification.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// The archive digest does not match its `.sha256` file.
    #[error("hashes do not match: expected: {expected}, actual: {actual}")]
    ChecksumMismatch {
        /// Digest recorded in the checksum file.
        expected: String,
        /// Digest computed from the archive.
        actual: String,
    },

    /// A file listed in `checksums.txt` has a different digest.
    #[error("hashes do not match for: {file} - actual: {actual}, expected: {expected}")]
    FileMismatch {
        /// The listed file name.
        file: String,
        /// Digest recorded in `checksums.txt`.
        expected: String,
        /// Digest computed from the file.
        actual: String,
    },

    /// `checksums.txt` lists too few files to cover a release.
    #[error("validation failed: expected at least 2 files to validate, found: {found}")]
    TooFewChecksums {
        /// Number of distinct entries found.
        found: usize,
    },

    /// A `checksums.txt` line could not be understood.
    #[error("malformed checksum line {line}: {reason}")]
    MalformedChecksums {
        /// One-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// A signature did not verify.
    #[error("signature verification failed for {file}: {reason}")]
    Signature {
        /// The signed file.
        file: String,
        /// Underlying failure.
        reason: String,
    },

    /// Reading or writing a file failed.
    #[error("unable to access {path}: {source}")]
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
}

impl VerifyError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Release verification for both signing generations.
///
/// # Examples
///
/// ```
/// use cast_installer::verify::{Verifier, legacy::LEGACY_PUBLIC_KEY};
///
/// let verifier = Verifier::new();
/// assert_eq!(verifier.legacy_key(), LEGACY_PUBLIC_KEY);
/// ```
#[derive(Debug, Clone)]
pub struct Verifier {
    legacy_key: String,
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Verifier {
    /// Create a verifier that checks v1 signatures against the embedded
    /// release signing key.
    #[must_use]
    pub fn new() -> Self {
        Self::with_legacy_key(legacy::LEGACY_PUBLIC_KEY)
    }

    /// Create a verifier trusting a different armored PGP key for v1
    /// signatures.
    #[must_use]
    pub fn with_legacy_key(armored_key: impl Into<String>) -> Self {
        Self {
            legacy_key: armored_key.into(),
        }
    }

    /// The armored PGP key trusted for v1 signatures.
    #[must_use]
    pub fn legacy_key(&self) -> &str {
        &self.legacy_key
    }

    /// Verify the files of `release` downloaded into `dir`.
    ///
    /// `archive` is the source archive path, used by the legacy scheme.
    /// Any failure aborts the whole verification.
    ///
    /// # Errors
    ///
    /// Returns the first [`VerifyError`] encountered.
    pub fn verify(
        &self,
        release: &ReleaseDescriptor,
        schema: SchemaVersion,
        dir: &Path,
        archive: &Path,
    ) -> Result<(), VerifyError> {
        if schema.is_legacy() {
            info!("verifying {} with checksums and PGP", release.tag);
            legacy::verify(release, dir, archive, &self.legacy_key)
        } else {
            info!("verifying {} with cosign", release.tag);
            cosign::verify_signature(
                &dir.join(cosign::PUBLIC_KEY),
                &dir.join(cosign::SIGNATURE),
                &dir.join(cosign::CHECKSUMS),
            )?;
            cosign::verify_checksums(dir)
        }
    }
}

/// Path of the sentinel marking `file` as verified.
///
/// # Examples
///
/// ```
/// use cast_installer::verify::sentinel_path;
/// use std::path::{Path, PathBuf};
///
/// assert_eq!(
///     sentinel_path(Path::new("/cache/sift.tar.gz")),
///     PathBuf::from("/cache/sift.tar.gz.valid")
/// );
/// ```
#[must_use]
pub fn sentinel_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(SENTINEL_SUFFIX);
    PathBuf::from(name)
}

/// Whether `file` has previously been verified.
#[must_use]
pub fn is_verified(file: &Path) -> bool {
    sentinel_path(file).is_file()
}

/// Record that `file` has been verified.
///
/// # Errors
///
/// Returns [`VerifyError::Io`] if the sentinel cannot be written.
pub fn mark_verified(file: &Path) -> Result<(), VerifyError> {
    let sentinel = sentinel_path(file);
    fs::write(&sentinel, b"").map_err(VerifyError::io(&sentinel))
}
