//! Hex-encoded file digests.

use sha2::{Digest, Sha256, Sha512};
use std::fs::File;
use std::io;
use std::path::Path;

/// Compute the lowercase hex SHA-256 digest of a file.
///
/// # Errors
///
/// Returns any error opening or reading the file.
pub fn sha256_file(path: &Path) -> io::Result<String> {
    file_digest::<Sha256>(path)
}

/// Compute the lowercase hex SHA-512 digest of a file.
///
/// # Errors
///
/// Returns any error opening or reading the file.
pub fn sha512_file(path: &Path) -> io::Result<String> {
    file_digest::<Sha512>(path)
}

fn file_digest<D: Digest + io::Write>(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = D::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Whether two hex digests are equal, ignoring case.
///
/// # Examples
///
/// ```
/// use cast_installer::verify::digest::digests_match;
///
/// assert!(digests_match("ABCDEF", "abcdef"));
/// assert!(!digests_match("abc", "abd"));
/// ```
#[must_use]
pub fn digests_match(expected: &str, actual: &str) -> bool {
    expected.eq_ignore_ascii_case(actual)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_known_content() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("abc.txt");
        std::fs::write(&path, b"abc").expect("write");

        assert_eq!(
            sha256_file(&path).expect("sha256"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            sha512_file(&path).expect("sha512"),
            concat!(
                "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a",
                "2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
            )
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(sha256_file(&dir.path().join("absent")).is_err());
    }
}
