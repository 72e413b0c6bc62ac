//! Known distro aliases and their fallback manifests.
//!
//! Older SIFT and REMnux releases predate `manifest.yml` assets, so the
//! registry carries a manifest for each alias that is used when a release
//! does not publish one.

use crate::manifest::{Manifest, ManifestError, Mode, OsConstraint, SchemaVersion};
use std::collections::BTreeMap;

/// A canonical GitHub repository reachable through a short name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Short name keying the fallback manifest.
    pub alias: String,
}

impl Alias {
    /// Build an alias entry.
    #[must_use]
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            alias: alias.into(),
        }
    }
}

/// Lookup table from user identifiers to aliases and fallback manifests.
///
/// # Examples
///
/// ```
/// use cast_installer::registry::Registry;
///
/// let registry = Registry::builtin().expect("builtin registry");
/// let sift = registry.lookup("sift").expect("sift alias");
/// assert_eq!(sift.owner, "teamdfir");
/// assert_eq!(sift.repo, "sift-saltstack");
/// assert!(registry.lookup("SIFT").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Registry {
    aliases: BTreeMap<String, Alias>,
    manifests: BTreeMap<String, Manifest>,
}

impl Registry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The SIFT and REMnux aliases shipped with cast.
    ///
    /// # Errors
    ///
    /// Returns an error only if a built-in manifest violates the manifest
    /// invariants.
    pub fn builtin() -> Result<Self, ManifestError> {
        let sift = Alias::new("teamdfir", "sift-saltstack", "sift");
        let remnux = Alias::new("remnux", "salt-states", "remnux");

        let sift_manifest = Manifest::new(
            SchemaVersion::LEGACY,
            vec![
                Mode::new("desktop", "sift.desktop", false),
                Mode::new("server", "sift.server", true),
                Mode::deprecated("complete", "sift.desktop", "desktop"),
                Mode::deprecated("packages-only", "sift.server", "server"),
            ],
            vec![OsConstraint::new("ubuntu", "20.04", "focal")],
        )?;
        let remnux_manifest = Manifest::new(
            SchemaVersion::LEGACY,
            vec![
                Mode::new("dedicated", "remnux.dedicated", true),
                Mode::new("addon", "remnux.addon", false),
                Mode::new("cloud", "remnux.cloud", false),
            ],
            Vec::new(),
        )?;

        Ok(Self::new()
            .with_alias("sift", sift.clone())
            .with_alias("teamdfir/sift-saltstack", sift)
            .with_alias("remnux", remnux.clone())
            .with_alias("remnux/salt-states", remnux)
            .with_manifest("sift", sift_manifest)
            .with_manifest("remnux", remnux_manifest))
    }

    /// Register `identifier` as a name for `alias`.
    #[must_use]
    pub fn with_alias(mut self, identifier: impl Into<String>, alias: Alias) -> Self {
        self.aliases.insert(identifier.into(), alias);
        self
    }

    /// Register the fallback manifest for an alias name.
    #[must_use]
    pub fn with_manifest(mut self, alias: impl Into<String>, manifest: Manifest) -> Self {
        self.manifests.insert(alias.into(), manifest);
        self
    }

    /// Exact, case-sensitive lookup of a user identifier.
    #[must_use]
    pub fn lookup(&self, identifier: &str) -> Option<&Alias> {
        self.aliases.get(identifier)
    }

    /// Fallback manifest for an alias name.
    #[must_use]
    pub fn fallback_manifest(&self, alias: &str) -> Option<&Manifest> {
        self.manifests.get(alias)
    }
}
