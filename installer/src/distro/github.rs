//! Distros published as GitHub releases.

use super::{AcquireError, Distro};
use crate::extract::{ArchiveExtractor, TarExtractor};
use crate::manifest::Manifest;
use crate::release::{ReleaseApi, ReleaseDescriptor};
use crate::verify::{Verifier, is_verified, sentinel_path};
use log::{debug, info};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

/// A release-hosted distro.
pub struct GitHubDistro<'a> {
    api: &'a dyn ReleaseApi,
    name: String,
    release: ReleaseDescriptor,
    manifest: Manifest,
    verifier: Verifier,
}

impl fmt::Debug for GitHubDistro<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubDistro")
            .field("name", &self.name)
            .field("release", &self.release)
            .field("manifest", &self.manifest)
            .finish_non_exhaustive()
    }
}

impl<'a> GitHubDistro<'a> {
    /// Assemble a distro from a selected release and its manifest.
    #[must_use]
    pub fn new(
        api: &'a dyn ReleaseApi,
        name: String,
        release: ReleaseDescriptor,
        manifest: Manifest,
        verifier: Verifier,
    ) -> Self {
        Self {
            api,
            name,
            release,
            manifest,
            verifier,
        }
    }

    /// The selected release.
    #[must_use]
    pub fn release(&self) -> &ReleaseDescriptor {
        &self.release
    }

    /// URL of the legacy source archive.
    #[must_use]
    pub fn legacy_archive_url(&self) -> String {
        format!(
            "https://github.com/{}/{}/archive/{}.tar.gz",
            self.release.owner, self.release.repo, self.release.tag
        )
    }

    fn download_archive(&self, dir: &Path) -> Result<PathBuf, AcquireError> {
        info!("downloading archive file for {}", self.release.tag);
        if self.manifest.schema_version().is_legacy() {
            let archive = dir.join(legacy_archive_name(&self.release));
            if is_verified(&archive) && archive.is_file() {
                info!("downloading archive file (cached)");
                return Ok(archive);
            }
            let url = self.legacy_archive_url();
            debug!("tarball url: {url}");
            self.api.download_url(&url, &archive)?;
            discard_sentinel(&archive)?;
            return Ok(archive);
        }

        let url = self
            .release
            .tarball_url
            .as_deref()
            .ok_or_else(|| AcquireError::MissingTarball {
                tag: self.release.tag.clone(),
            })?;
        debug!("tarball url: {url}");
        let archive = self.api.download_named(url, dir)?;
        discard_sentinel(&archive)?;
        Ok(archive)
    }

    fn download_assets(&self, dir: &Path) -> Result<(), AcquireError> {
        for asset in &self.release.assets {
            let dest = dir.join(&asset.name);
            if is_verified(&dest) && dest.is_file() {
                info!("downloading release file {} (cached)", asset.name);
                continue;
            }
            info!("downloading release file {}", asset.name);
            self.api
                .download_asset(&self.release.owner, &self.release.repo, asset.id, &dest)?;
            discard_sentinel(&dest)?;
        }
        Ok(())
    }
}

impl Distro for GitHubDistro<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn release_name(&self) -> &str {
        &self.release.tag
    }

    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn acquire(&self, dir: &Path) -> Result<(), AcquireError> {
        fs::create_dir_all(dir).map_err(AcquireError::io(dir))?;

        let archive = self.download_archive(dir)?;
        self.download_assets(dir)?;
        self.verifier
            .verify(&self.release, self.manifest.schema_version(), dir, &archive)?;

        let dest = dir.join(self.source_path());
        info!("extracting archive file to {}", dest.display());
        let files = TarExtractor.extract(&archive, &dest, self.manifest.base_dir())?;
        debug!("extracted {files} files");
        Ok(())
    }
}

/// File name of a legacy source archive: `<repo>-<tag>.tar.gz`, with the
/// owner prepended for `remnux/salt-states`.
///
/// # Examples
///
/// ```
/// use cast_installer::distro::github::legacy_archive_name;
/// use cast_installer::release::{Release, ReleaseDescriptor};
///
/// let release = |owner: &str, repo: &str| {
///     ReleaseDescriptor::new(owner, repo, Release {
///         tag_name: "v1.2".to_owned(),
///         prerelease: false,
///         created_at: None,
///         tarball_url: None,
///         assets: Vec::new(),
///     })
/// };
/// assert_eq!(legacy_archive_name(&release("teamdfir", "sift-saltstack")), "sift-saltstack-v1.2.tar.gz");
/// assert_eq!(legacy_archive_name(&release("remnux", "salt-states")), "remnux-salt-states-v1.2.tar.gz");
/// ```
#[must_use]
pub fn legacy_archive_name(release: &ReleaseDescriptor) -> String {
    if release.owner == "remnux" && release.repo == "salt-states" {
        format!("{}-{}-{}.tar.gz", release.owner, release.repo, release.tag)
    } else {
        format!("{}-{}.tar.gz", release.repo, release.tag)
    }
}

/// A freshly downloaded file must be verified again.
fn discard_sentinel(file: &Path) -> Result<(), AcquireError> {
    let sentinel = sentinel_path(file);
    if sentinel.exists() {
        fs::remove_file(&sentinel).map_err(AcquireError::io(&sentinel))?;
    }
    Ok(())
}
