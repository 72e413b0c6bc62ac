//! Offline verification of `cosign sign-blob` signatures and the SHA-512
//! checksum list they cover.
//!
//! `cosign sign-blob --key` emits a base64 DER ECDSA P-256 signature over the
//! SHA-256 of the blob. The public key is a PEM SPKI document. No
//! transparency log lookup is made.

use super::digest::{digests_match, sha512_file};
use super::{VerifyError, is_verified, mark_verified};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use log::{debug, info};
use p256::ecdsa::signature::Verifier as _;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path};

/// Release asset holding the cosign public key.
pub const PUBLIC_KEY: &str = "cosign.pub";
/// Release asset holding the signature over [`CHECKSUMS`].
pub const SIGNATURE: &str = "checksums.txt.sig";
/// Release asset listing SHA-512 digests of the other assets.
pub const CHECKSUMS: &str = "checksums.txt";

/// Minimum number of entries a checksum list must carry.
const MIN_CHECKSUMS: usize = 2;

/// Verify the cosign signature in `signature` over `blob` with `key`.
///
/// # Errors
///
/// Returns [`VerifyError::Signature`] when the key or signature is
/// malformed or does not verify, or [`VerifyError::Io`].
pub fn verify_signature(key: &Path, signature: &Path, blob: &Path) -> Result<(), VerifyError> {
    let failure = |reason: String| VerifyError::Signature {
        file: blob.display().to_string(),
        reason,
    };

    let pem = fs::read_to_string(key).map_err(VerifyError::io(key))?;
    let verifying_key = VerifyingKey::from_public_key_pem(pem.trim())
        .map_err(|e| failure(format!("loading public key: {e}")))?;

    let encoded = fs::read_to_string(signature).map_err(VerifyError::io(signature))?;
    let der = STANDARD
        .decode(encoded.trim())
        .map_err(|e| failure(format!("signature is not base64: {e}")))?;
    let signature = Signature::from_der(&der).map_err(|e| failure(e.to_string()))?;

    let payload = fs::read(blob).map_err(VerifyError::io(blob))?;
    verifying_key
        .verify(&payload, &signature)
        .map_err(|e| failure(e.to_string()))?;
    info!("signatures verified");
    Ok(())
}

/// Parse a `sha512sum`-style list into file name → digest.
///
/// Blank lines are skipped, a leading `*` (binary mode marker) is dropped and
/// later duplicates replace earlier ones. File names must be plain names in
/// the download directory.
///
/// # Errors
///
/// Returns [`VerifyError::MalformedChecksums`] for lines without two fields
/// or with a path-like file name.
///
/// # Examples
///
/// ```
/// use cast_installer::verify::cosign::parse_checksums;
///
/// let entries = parse_checksums("aa  one.tar.gz\nbb *two.yml\n").expect("parse");
/// assert_eq!(entries.get("one.tar.gz").map(String::as_str), Some("aa"));
/// assert_eq!(entries.get("two.yml").map(String::as_str), Some("bb"));
/// ```
pub fn parse_checksums(contents: &str) -> Result<BTreeMap<String, String>, VerifyError> {
    let mut entries = BTreeMap::new();
    for (index, line) in contents.lines().enumerate() {
        let mut fields = line.split_whitespace();
        let Some(digest) = fields.next() else {
            continue;
        };
        let malformed = |reason: &str| VerifyError::MalformedChecksums {
            line: index + 1,
            reason: reason.to_owned(),
        };
        let name = fields
            .next()
            .map(|name| name.trim_start_matches('*'))
            .ok_or_else(|| malformed("missing file name"))?;
        if fields.next().is_some() {
            return Err(malformed("unexpected trailing fields"));
        }
        let mut components = Path::new(name).components();
        let plain = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !plain {
            return Err(malformed("file name must not contain a path"));
        }
        entries.insert(name.to_owned(), digest.to_owned());
    }
    Ok(entries)
}

/// Recompute the SHA-512 of every file listed in `dir/checksums.txt`.
///
/// Files carrying a sentinel are not rehashed; each file that passes gets
/// one.
///
/// # Errors
///
/// Returns [`VerifyError::TooFewChecksums`], [`VerifyError::FileMismatch`],
/// [`VerifyError::MalformedChecksums`] or [`VerifyError::Io`].
pub fn verify_checksums(dir: &Path) -> Result<(), VerifyError> {
    let list = dir.join(CHECKSUMS);
    let contents = fs::read_to_string(&list).map_err(VerifyError::io(&list))?;
    let entries = parse_checksums(&contents)?;
    debug!("found {} checksums to validate", entries.len());

    if entries.len() < MIN_CHECKSUMS {
        return Err(VerifyError::TooFewChecksums {
            found: entries.len(),
        });
    }

    for (name, expected) in &entries {
        let path = dir.join(name);
        if is_verified(&path) {
            debug!("{name} already verified");
            continue;
        }
        let actual = sha512_file(&path).map_err(VerifyError::io(&path))?;
        if !digests_match(expected, &actual) {
            return Err(VerifyError::FileMismatch {
                file: name.clone(),
                expected: expected.clone(),
                actual,
            });
        }
        mark_verified(&path)?;
        info!("checksum validated for {name}");
    }
    Ok(())
}
