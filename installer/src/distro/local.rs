//! Distros read from a working tree on this machine.
//!
//! The directory must hold a `.cast.yml` whose `manifest:` key is a distro
//! manifest. Acquisition copies the Salt tree into the cache instead of
//! downloading a release.

use super::{AcquireError, Distro, ResolveError, prepare_manifest};
use crate::manifest::{Manifest, TemplateData};
use crate::sysinfo::OsProbe;
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Project file describing a local distro.
pub const LOCAL_CONFIG: &str = ".cast.yml";

/// Release name reported by local distros.
pub const LOCAL_RELEASE: &str = "local";

#[derive(Debug, Deserialize)]
struct LocalConfig {
    manifest: Option<Manifest>,
}

/// A distro backed by a local directory.
#[derive(Debug, Clone)]
pub struct LocalDistro {
    name: String,
    dir: PathBuf,
    manifest: Manifest,
}

impl LocalDistro {
    /// Load the distro rooted at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::LocalConfig`] when `.cast.yml` cannot be read,
    /// [`ResolveError::LocalConfigInvalid`] when it has no manifest, and the
    /// usual manifest, OS and template errors.
    pub fn load(
        path: &Path,
        os: &dyn OsProbe,
        skip_os_check: bool,
        data: &TemplateData,
    ) -> Result<Self, ResolveError> {
        let dir = fs::canonicalize(path).map_err(|source| ResolveError::LocalConfig {
            path: path.to_path_buf(),
            source,
        })?;
        let config_path = dir.join(LOCAL_CONFIG);
        let contents =
            fs::read_to_string(&config_path).map_err(|source| ResolveError::LocalConfig {
                path: config_path.clone(),
                source,
            })?;
        let config: LocalConfig =
            serde_yaml::from_str(&contents).map_err(|e| ResolveError::LocalConfigInvalid {
                path: config_path.clone(),
                reason: e.to_string(),
            })?;
        let manifest = config
            .manifest
            .ok_or_else(|| ResolveError::LocalConfigInvalid {
                path: config_path,
                reason: "missing manifest key".to_owned(),
            })?;
        let manifest = prepare_manifest(manifest, os, skip_os_check, data)?;
        let basename = dir
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name: format!("local_{basename}"),
            dir,
            manifest,
        })
    }

    /// Absolute path of the working tree.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn salt_dir(&self) -> PathBuf {
        let base = self.manifest.base_dir();
        if base.is_empty() {
            self.dir.clone()
        } else {
            self.dir.join(base)
        }
    }
}

impl Distro for LocalDistro {
    fn name(&self) -> &str {
        &self.name
    }

    fn release_name(&self) -> &str {
        LOCAL_RELEASE
    }

    fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn acquire(&self, dir: &Path) -> Result<(), AcquireError> {
        let source = self.salt_dir();
        let dest = dir.join(self.source_path());
        info!("copying {} to {}", source.display(), dest.display());
        let copied = copy_tree(&source, &dest)?;
        debug!("copied {copied} files");
        Ok(())
    }
}

/// Recursively copy `source` into `dest`, recreating symlinks. Returns the
/// number of regular files copied.
fn copy_tree(source: &Path, dest: &Path) -> Result<usize, AcquireError> {
    fs::create_dir_all(dest).map_err(AcquireError::io(dest))?;
    let mut copied = 0;

    // The cache may live inside the tree being copied.
    let walker = WalkDir::new(source)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| !entry.path().starts_with(dest));

    for entry in walker {
        let entry = entry.map_err(|e| AcquireError::Io {
            path: source.to_path_buf(),
            source: io::Error::from(e),
        })?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target).map_err(AcquireError::io(&target))?;
        } else if file_type.is_symlink() {
            let link = fs::read_link(entry.path()).map_err(AcquireError::io(entry.path()))?;
            if fs::symlink_metadata(&target).is_ok() {
                fs::remove_file(&target).map_err(AcquireError::io(&target))?;
            }
            std::os::unix::fs::symlink(&link, &target).map_err(AcquireError::io(&target))?;
        } else {
            fs::copy(entry.path(), &target).map_err(AcquireError::io(&target))?;
            copied += 1;
        }
    }
    Ok(copied)
}
