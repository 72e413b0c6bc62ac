//! Distro resolution and acquisition.
//!
//! A user identifier (`sift`, `owner/repo` or a local directory) resolves to
//! a [`Distro`]: a release, its validated manifest and the means to place the
//! Salt tree in the cache. Release-hosted distros download, verify and
//! extract; local distros copy a working tree.

pub mod github;
pub mod local;

pub use github::GitHubDistro;
pub use local::LocalDistro;

use crate::cancel::Cancelled;
use crate::extract::ExtractionError;
use crate::manifest::{Manifest, ManifestError, TemplateData, is_supported};
use crate::registry::Registry;
use crate::release::{ApiError, ReleaseApi, ReleaseDescriptor, SelectionError, select_release};
use crate::sysinfo::OsProbe;
use crate::verify::{Verifier, VerifyError};
use log::{debug, info};
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// Release asset carrying a distro manifest.
pub const MANIFEST_ASSET: &str = "manifest.yml";

/// Template field holding the release version.
pub const VERSION_FIELD: &str = "Version";

/// Errors arising from resolving a distro identifier.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// The identifier is neither an alias nor `owner/repo`.
    #[error("incorrect distro format, expect owner/repo: {identifier}")]
    InvalidIdentifier {
        /// The rejected identifier.
        identifier: String,
    },

    /// No release qualified.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    /// The release has no manifest and no fallback applies.
    #[error("no manifest found for release")]
    NoManifest,

    /// The host does not satisfy the manifest's constraints.
    #[error("operating system is not supported")]
    UnsupportedOs,

    /// The manifest is invalid or failed to render.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A GitHub API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A local distro's `.cast.yml` could not be read.
    #[error("unable to read {path}: {source}")]
    LocalConfig {
        /// The config file path.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// A local distro's `.cast.yml` has no usable manifest.
    #[error("invalid local config {path}: {reason}")]
    LocalConfigInvalid {
        /// The config file path.
        path: PathBuf,
        /// What was wrong with it.
        reason: String,
    },
}

/// Errors arising from placing a distro's Salt tree in the cache.
#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    /// A download failed.
    #[error(transparent)]
    Download(#[from] ApiError),

    /// Verification failed.
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// Extraction failed.
    #[error(transparent)]
    Extract(#[from] ExtractionError),

    /// A v2 release publishes no source tarball.
    #[error("release {tag} has no source tarball")]
    MissingTarball {
        /// The release tag.
        tag: String,
    },

    /// The run was cancelled.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// Filesystem error while preparing the cache.
    #[error("unable to prepare {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
}

impl AcquireError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A resolved distro ready for acquisition and installation.
pub trait Distro {
    /// Cache key, `<owner>_<repo>`.
    fn name(&self) -> &str;

    /// Release tag, or `local` for local distros.
    fn release_name(&self) -> &str;

    /// The validated and rendered manifest.
    fn manifest(&self) -> &Manifest;

    /// Place the Salt tree under `dir`, the distro's cache directory.
    ///
    /// # Errors
    ///
    /// Returns an [`AcquireError`] on download, verification, extraction or
    /// copy failure.
    fn acquire(&self, dir: &Path) -> Result<(), AcquireError>;

    /// Cache directory relative to the cache root.
    fn cache_path(&self) -> PathBuf {
        Path::new(self.name()).join(self.release_name())
    }

    /// Salt file root relative to the cache directory.
    fn source_path(&self) -> PathBuf {
        Path::new("source").join(self.manifest().name())
    }

    /// Resolve an install mode to its Salt state.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::UnknownMode`] when no mode matches.
    fn mode_state(&self, mode: &str) -> Result<&str, ManifestError> {
        self.manifest().mode_state(mode)
    }

    /// Rendered SaltStack pillars.
    fn pillars(&self) -> &BTreeMap<String, String> {
        self.manifest().pillars()
    }

    /// Message printed after a successful install.
    fn success_message(&self) -> &str {
        self.manifest().success_message()
    }

    /// Message printed after a failed install.
    fn failure_message(&self) -> &str {
        self.manifest().failure_message()
    }
}

/// Either kind of distro, chosen at resolution time.
#[derive(Debug)]
pub enum AnyDistro<'a> {
    /// Hosted as GitHub releases.
    GitHub(GitHubDistro<'a>),
    /// A directory on this machine.
    Local(LocalDistro),
}

impl Distro for AnyDistro<'_> {
    fn name(&self) -> &str {
        match self {
            Self::GitHub(distro) => distro.name(),
            Self::Local(distro) => distro.name(),
        }
    }

    fn release_name(&self) -> &str {
        match self {
            Self::GitHub(distro) => distro.release_name(),
            Self::Local(distro) => distro.release_name(),
        }
    }

    fn manifest(&self) -> &Manifest {
        match self {
            Self::GitHub(distro) => distro.manifest(),
            Self::Local(distro) => distro.manifest(),
        }
    }

    fn acquire(&self, dir: &Path) -> Result<(), AcquireError> {
        match self {
            Self::GitHub(distro) => distro.acquire(dir),
            Self::Local(distro) => distro.acquire(dir),
        }
    }
}

/// GitHub coordinates of a distro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Registry alias, when the identifier matched one.
    pub alias: Option<String>,
}

impl RepoId {
    /// Cache key, `<owner>_<repo>`.
    #[must_use]
    pub fn cache_name(&self) -> String {
        format!("{}_{}", self.owner, self.repo)
    }
}

/// Turn a user identifier into repository coordinates.
///
/// Registry aliases match exactly; anything else must be `owner/repo` with
/// both parts non-empty.
///
/// # Errors
///
/// Returns [`ResolveError::InvalidIdentifier`] for any other shape.
///
/// # Examples
///
/// ```
/// use cast_installer::distro::parse_identifier;
/// use cast_installer::registry::Registry;
///
/// let registry = Registry::builtin().expect("registry");
/// let id = parse_identifier("ekristen/cast-states", &registry).expect("owner/repo");
/// assert_eq!(id.cache_name(), "ekristen_cast-states");
/// assert!(parse_identifier("a/b/c", &registry).is_err());
/// ```
pub fn parse_identifier(identifier: &str, registry: &Registry) -> Result<RepoId, ResolveError> {
    if let Some(alias) = registry.lookup(identifier) {
        return Ok(RepoId {
            owner: alias.owner.clone(),
            repo: alias.repo.clone(),
            alias: Some(alias.alias.clone()),
        });
    }

    let invalid = || ResolveError::InvalidIdentifier {
        identifier: identifier.to_owned(),
    };
    let (owner, repo) = identifier.split_once('/').ok_or_else(invalid)?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return Err(invalid());
    }
    Ok(RepoId {
        owner: owner.to_owned(),
        repo: repo.to_owned(),
        alias: None,
    })
}

/// Inputs to [`Resolver::resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    /// Alias, `owner/repo` or a local directory path.
    pub identifier: String,
    /// Exact release tag; `None` or empty selects the latest.
    pub version: Option<String>,
    /// Consider pre-releases.
    pub include_prereleases: bool,
    /// Skip the supported-OS check.
    pub skip_os_check: bool,
    /// Values for pillar templates.
    pub template_data: TemplateData,
}

/// Resolves identifiers using a registry, a release API and an OS probe.
pub struct Resolver<'a> {
    registry: &'a Registry,
    api: &'a dyn ReleaseApi,
    os: &'a dyn OsProbe,
    verifier: Verifier,
}

impl<'a> Resolver<'a> {
    /// Create a resolver.
    #[must_use]
    pub fn new(registry: &'a Registry, api: &'a dyn ReleaseApi, os: &'a dyn OsProbe) -> Self {
        Self {
            registry,
            api,
            os,
            verifier: Verifier::default(),
        }
    }

    /// Use `verifier` for acquired releases.
    #[must_use]
    pub fn with_verifier(mut self, verifier: Verifier) -> Self {
        self.verifier = verifier;
        self
    }

    /// Resolve a request to a distro.
    ///
    /// An identifier naming an existing directory resolves locally;
    /// everything else goes through the registry and the release API.
    ///
    /// # Errors
    ///
    /// Returns a [`ResolveError`] for malformed identifiers, missing releases
    /// or manifests, unsupported hosts and template failures.
    pub fn resolve(&self, request: ResolveRequest) -> Result<AnyDistro<'a>, ResolveError> {
        let path = Path::new(&request.identifier);
        if path.is_dir() {
            info!("resolving local distro at {}", path.display());
            let distro = LocalDistro::load(path, self.os, request.skip_os_check, &request.template_data)?;
            return Ok(AnyDistro::Local(distro));
        }
        self.resolve_release(request).map(AnyDistro::GitHub)
    }

    fn resolve_release(&self, request: ResolveRequest) -> Result<GitHubDistro<'a>, ResolveError> {
        let repo = parse_identifier(&request.identifier, self.registry)?;
        debug!("fetching releases for {}/{}", repo.owner, repo.repo);
        let releases = self.api.list_releases(&repo.owner, &repo.repo)?;
        let selected = select_release(
            releases,
            request.version.as_deref(),
            request.include_prereleases,
        )?;
        let descriptor = ReleaseDescriptor::new(&repo.owner, &repo.repo, selected);
        info!("selected release {} of {}/{}", descriptor.tag, repo.owner, repo.repo);

        let manifest = self.release_manifest(&repo, &descriptor)?;
        let mut data = request.template_data;
        data.insert(VERSION_FIELD.to_owned(), descriptor.tag.clone());
        let manifest = prepare_manifest(manifest, self.os, request.skip_os_check, &data)?;

        Ok(GitHubDistro::new(
            self.api,
            repo.cache_name(),
            descriptor,
            manifest,
            self.verifier.clone(),
        ))
    }

    fn release_manifest(
        &self,
        repo: &RepoId,
        descriptor: &ReleaseDescriptor,
    ) -> Result<Manifest, ResolveError> {
        if let Some(asset) = descriptor.asset(MANIFEST_ASSET) {
            debug!("fetching {MANIFEST_ASSET} (asset {})", asset.id);
            let bytes = self.api.fetch_asset(&repo.owner, &repo.repo, asset.id)?;
            let contents = String::from_utf8_lossy(&bytes);
            return Ok(Manifest::from_yaml(&contents)?);
        }
        repo.alias
            .as_deref()
            .and_then(|alias| self.registry.fallback_manifest(alias))
            .cloned()
            .ok_or(ResolveError::NoManifest)
    }
}

/// Check host support and render pillars.
pub(crate) fn prepare_manifest(
    mut manifest: Manifest,
    os: &dyn OsProbe,
    skip_os_check: bool,
    data: &TemplateData,
) -> Result<Manifest, ResolveError> {
    if skip_os_check {
        debug!("skipping operating system check");
    } else if !manifest.supported_os().is_empty() {
        info!("checking operating system support");
        if !is_supported(manifest.supported_os(), &os.os_info()) {
            return Err(ResolveError::UnsupportedOs);
        }
        info!("operating system is supported");
    }

    debug!("rendering manifest");
    manifest.render(data)?;
    Ok(manifest)
}

#[cfg(test)]
#[path = "resolve_tests.rs"]
mod tests;
