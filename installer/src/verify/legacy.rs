//! Checksum and PGP verification for v1 releases.

use super::digest::{digests_match, sha256_file};
use super::{VerifyError, is_verified, mark_verified};
use crate::release::ReleaseDescriptor;
use log::{debug, info, warn};
use pgp::{Deserializable, SignedPublicKey, StandaloneSignature};
use std::fs;
use std::path::Path;

/// Armored PGP key that signs v1 release archives.
///
/// Keys published alongside a release are never trusted.
pub const LEGACY_PUBLIC_KEY: &str = include_str!("legacy.pub");

const CHECKSUM_SUFFIX: &str = ".sha256";
const SIGNATURE_SUFFIX: &str = ".asc";
const SIGNED_CHECKSUM_SUFFIX: &str = ".sha256.asc";

/// Verify `archive` against every `.sha256` and `.asc` asset of `release`
/// downloaded into `dir`, checking signatures with `armored_key`.
///
/// Signatures over checksum files (`*.sha256.asc`) are not checked. The
/// archive's sentinel short-circuits the whole check. A release publishing
/// neither checksums nor signatures is accepted with a warning and left
/// unmarked, since early v1 releases shipped without either.
///
/// # Errors
///
/// Returns [`VerifyError::ChecksumMismatch`], a signature failure, or an
/// I/O error.
pub fn verify(
    release: &ReleaseDescriptor,
    dir: &Path,
    archive: &Path,
    armored_key: &str,
) -> Result<(), VerifyError> {
    if is_verified(archive) {
        debug!("{} already verified", archive.display());
        return Ok(());
    }

    let mut checked = 0_usize;
    for asset in &release.assets {
        let name = asset.name.as_str();
        if name.ends_with(CHECKSUM_SUFFIX) {
            verify_checksum(archive, &dir.join(name))?;
            checked += 1;
        } else if name.ends_with(SIGNATURE_SUFFIX) && !name.ends_with(SIGNED_CHECKSUM_SUFFIX) {
            verify_signature(archive, &dir.join(name), armored_key)?;
            checked += 1;
        }
    }

    if checked == 0 {
        warn!("release {} publishes no checksums or signatures", release.tag);
        return Ok(());
    }
    mark_verified(archive)
}

/// Compare the SHA-256 of `archive` with the first token of `checksum_file`.
///
/// # Errors
///
/// Returns [`VerifyError::ChecksumMismatch`] naming both digests, or
/// [`VerifyError::Io`].
pub fn verify_checksum(archive: &Path, checksum_file: &Path) -> Result<(), VerifyError> {
    let actual = sha256_file(archive).map_err(VerifyError::io(archive))?;
    let contents = fs::read_to_string(checksum_file).map_err(VerifyError::io(checksum_file))?;
    let expected = contents.split_whitespace().next().unwrap_or_default();

    if !digests_match(expected, &actual) {
        return Err(VerifyError::ChecksumMismatch {
            expected: expected.to_owned(),
            actual,
        });
    }
    info!("checksum validated for {}", archive.display());
    Ok(())
}

/// Check an armored detached PGP signature over `archive`.
///
/// The primary key is tried first, then each public subkey.
///
/// # Errors
///
/// Returns [`VerifyError::Signature`] when the key or signature cannot be
/// parsed or no key verifies the signature.
pub fn verify_signature(
    archive: &Path,
    signature_file: &Path,
    armored_key: &str,
) -> Result<(), VerifyError> {
    let failure = |reason: String| VerifyError::Signature {
        file: archive.display().to_string(),
        reason,
    };

    let (key, _) = SignedPublicKey::from_string(armored_key)
        .map_err(|e| failure(format!("invalid public key: {e}")))?;
    let armored_sig = fs::read_to_string(signature_file).map_err(VerifyError::io(signature_file))?;
    let (signature, _) = StandaloneSignature::from_string(&armored_sig)
        .map_err(|e| failure(format!("not a valid signature file: {e}")))?;
    let data = fs::read(archive).map_err(VerifyError::io(archive))?;

    let primary = signature.verify(&key, &data);
    let Err(primary_err) = primary else {
        info!("signature validated for {}", archive.display());
        return Ok(());
    };
    if key
        .public_subkeys
        .iter()
        .any(|subkey| signature.verify(subkey, &data).is_ok())
    {
        info!("signature validated for {} by subkey", archive.display());
        return Ok(());
    }
    Err(failure(primary_err.to_string()))
}
