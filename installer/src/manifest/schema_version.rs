//! Schema version newtype for distro manifests.
//!
//! Version 1 is the legacy layout (`base`, SHA-256 + PGP verification).
//! Version 2 adds `name`, `base_dir`, SaltStack pillars and messages, and is
//! verified with cosign-signed SHA-512 checksums.

use super::error::{ManifestError, Result};
use std::fmt;

/// The highest schema version this build can read.
const CURRENT_MAX: u32 = 2;

/// A validated manifest schema version.
///
/// # Examples
///
/// ```
/// use cast_installer::manifest::SchemaVersion;
///
/// let v = SchemaVersion::try_from(2).expect("supported");
/// assert!(!v.is_legacy());
/// assert!(SchemaVersion::try_from(3).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    /// The legacy schema (version 1).
    pub const LEGACY: Self = Self(1);

    /// The current schema (version 2).
    pub const CURRENT: Self = Self(CURRENT_MAX);

    /// Return the inner version number.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Whether this manifest uses the legacy verification scheme.
    #[must_use]
    pub const fn is_legacy(self) -> bool {
        self.0 == 1
    }
}

impl TryFrom<u32> for SchemaVersion {
    type Error = ManifestError;

    fn try_from(value: u32) -> Result<Self> {
        if value == 0 || value > CURRENT_MAX {
            return Err(ManifestError::UnsupportedSchemaVersion {
                value,
                max: CURRENT_MAX,
            });
        }
        Ok(Self(value))
    }
}

impl From<SchemaVersion> for u32 {
    fn from(v: SchemaVersion) -> Self {
        v.0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
