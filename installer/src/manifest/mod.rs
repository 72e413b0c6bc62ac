//! Distro manifest model.
//!
//! A manifest describes the install modes a distro offers, the operating
//! systems it supports and the SaltStack pillars passed to `salt-call`. Two
//! schema generations exist; see [`SchemaVersion`].
//!
//! ```yaml
//! version: 2
//! name: sift
//! base_dir: sift
//! modes:
//!   - name: desktop
//!     state: sift.desktop
//!     default: true
//! supported_os:
//!   - id: ubuntu
//!     release: "22.04"
//! saltstack:
//!   pillars:
//!     sift_user_template: "{{ .User }}"
//! ```

pub mod error;
pub mod os;
pub mod pillars;
pub mod schema_version;

pub use error::ManifestError;
pub use os::{OsConstraint, is_supported};
pub use pillars::{TEMPLATE_SUFFIX, TemplateData, render_pillars};
pub use schema_version::SchemaVersion;

use error::Result;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mode name that selects the manifest's default mode.
pub const DEFAULT_MODE: &str = "default";

/// One install mode, mapping a user-facing name onto a Salt state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mode {
    /// Name passed via `--mode`.
    pub name: String,
    /// Salt state applied for this mode.
    pub state: String,
    /// Whether the mode is kept only for compatibility.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deprecated: bool,
    /// Mode users should switch to. Informational only.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub replacement: String,
    /// Whether this mode is used when none is requested.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

impl Mode {
    /// Build a non-deprecated mode.
    #[must_use]
    pub fn new(name: impl Into<String>, state: impl Into<String>, default: bool) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
            default,
            ..Self::default()
        }
    }

    /// Build a deprecated mode that points at `replacement`.
    #[must_use]
    pub fn deprecated(
        name: impl Into<String>,
        state: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
            deprecated: true,
            replacement: replacement.into(),
            default: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawSaltstack {
    #[serde(default)]
    pillars: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    version: Option<u32>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    base: String,
    #[serde(default)]
    base_dir: String,
    #[serde(default)]
    modes: Vec<Mode>,
    #[serde(default)]
    supported_os: Vec<OsConstraint>,
    #[serde(default)]
    saltstack: RawSaltstack,
    #[serde(default)]
    success_message: String,
    #[serde(default)]
    failure_message: String,
}

/// A validated distro manifest.
///
/// Deserializing a `Manifest` directly, for example as a field of a larger
/// document, applies the same validation as [`Manifest::from_yaml`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawManifest")]
pub struct Manifest {
    schema_version: SchemaVersion,
    name: String,
    base_dir: String,
    modes: Vec<Mode>,
    supported_os: Vec<OsConstraint>,
    pillars: BTreeMap<String, String>,
    success_message: String,
    failure_message: String,
}

impl Manifest {
    /// Build a manifest from parts, checking the default-mode invariant.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::MultipleDefaultModes`] when two modes are
    /// flagged as default.
    pub fn new(
        schema_version: SchemaVersion,
        modes: Vec<Mode>,
        supported_os: Vec<OsConstraint>,
    ) -> Result<Self> {
        validate_modes(&modes)?;
        Ok(Self {
            schema_version,
            name: String::new(),
            base_dir: String::new(),
            modes,
            supported_os,
            pillars: BTreeMap::new(),
            success_message: String::new(),
            failure_message: String::new(),
        })
    }

    /// Parse a manifest from YAML.
    ///
    /// Version 1 documents take the base directory from `base`; version 2
    /// documents from `base_dir` (falling back to `base`).
    ///
    /// # Errors
    ///
    /// Fails when the YAML is malformed, the schema version is missing or
    /// unsupported, or several modes claim to be the default.
    pub fn from_yaml(contents: &str) -> Result<Self> {
        let raw: RawManifest =
            serde_yaml::from_str(contents).map_err(|e| ManifestError::Parse {
                reason: e.to_string(),
            })?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawManifest) -> Result<Self> {
        let schema_version =
            SchemaVersion::try_from(raw.version.ok_or(ManifestError::MissingSchemaVersion)?)?;
        validate_modes(&raw.modes)?;

        let base_dir = if schema_version.is_legacy() || raw.base_dir.is_empty() {
            raw.base
        } else {
            raw.base_dir
        };

        Ok(Self {
            schema_version,
            name: raw.name,
            base_dir,
            modes: raw.modes,
            supported_os: raw.supported_os,
            pillars: raw.saltstack.pillars,
            success_message: raw.success_message,
            failure_message: raw.failure_message,
        })
    }

    /// The manifest schema generation.
    #[must_use]
    pub const fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    /// Distro name used for the extracted source directory. May be empty.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Leading directory inside the archive that holds the Salt tree.
    #[must_use]
    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    /// Declared install modes.
    #[must_use]
    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    /// Declared operating system constraints.
    #[must_use]
    pub fn supported_os(&self) -> &[OsConstraint] {
        &self.supported_os
    }

    /// SaltStack pillars (rendered once [`Self::render`] has run).
    #[must_use]
    pub fn pillars(&self) -> &BTreeMap<String, String> {
        &self.pillars
    }

    /// Message printed after a successful install.
    #[must_use]
    pub fn success_message(&self) -> &str {
        &self.success_message
    }

    /// Message printed after a failed install.
    #[must_use]
    pub fn failure_message(&self) -> &str {
        &self.failure_message
    }

    /// Resolve a requested mode to its Salt state.
    ///
    /// An empty mode or [`DEFAULT_MODE`] selects the mode flagged as default;
    /// anything else must match a mode name exactly. Selecting a deprecated
    /// mode logs a warning naming its replacement but does not redirect.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnknownMode`] when nothing matches.
    ///
    /// # Examples
    ///
    /// ```
    /// use cast_installer::manifest::{Manifest, Mode, SchemaVersion};
    ///
    /// let manifest = Manifest::new(
    ///     SchemaVersion::LEGACY,
    ///     vec![Mode::new("server", "sift.server", true), Mode::new("desktop", "sift.desktop", false)],
    ///     Vec::new(),
    /// )
    /// .expect("valid manifest");
    /// assert_eq!(manifest.mode_state("default").expect("default"), "sift.server");
    /// assert_eq!(manifest.mode_state("desktop").expect("desktop"), "sift.desktop");
    /// assert!(manifest.mode_state("cloud").is_err());
    /// ```
    pub fn mode_state(&self, mode: &str) -> Result<&str> {
        let wants_default = mode.is_empty() || mode == DEFAULT_MODE;
        let selected = self.modes.iter().find(|m| {
            if wants_default {
                m.default
            } else {
                m.name == mode
            }
        });
        let Some(selected) = selected else {
            return Err(ManifestError::UnknownMode {
                mode: mode.to_owned(),
            });
        };
        if selected.deprecated {
            warn!(
                "mode {} is deprecated; use {} instead",
                selected.name, selected.replacement
            );
        }
        Ok(&selected.state)
    }

    /// Render templated pillars in place.
    ///
    /// # Errors
    ///
    /// Propagates template syntax and undefined-field errors.
    pub fn render(&mut self, data: &TemplateData) -> Result<()> {
        self.pillars = render_pillars(&self.pillars, data)?;
        Ok(())
    }
}

impl TryFrom<RawManifest> for Manifest {
    type Error = ManifestError;

    fn try_from(raw: RawManifest) -> Result<Self> {
        Self::from_raw(raw)
    }
}

fn validate_modes(modes: &[Mode]) -> Result<()> {
    let mut defaults = modes.iter().filter(|m| m.default);
    if let (Some(first), Some(second)) = (defaults.next(), defaults.next()) {
        return Err(ManifestError::MultipleDefaultModes {
            first: first.name.clone(),
            second: second.name.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "manifest_tests.rs"]
mod tests;
