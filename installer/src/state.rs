//! Persisted record of the last successful install per distro.
//!
//! The record lives at `<config_dir>/cast/state.yaml`:
//!
//! ```yaml
//! installations:
//!   teamdfir_sift-saltstack:
//!     distro_name: sift
//!     version: v2023.10.1
//!     mode: server
//! ```
//!
//! Loading never fails. A missing file yields an empty record and a corrupt
//! one is replaced by an empty record with a warning. The file is only written
//! after a successful install.

use crate::dirs::{BaseDirs, cast_config_dir};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

const STATE_FILENAME: &str = "state.yaml";

/// The saved facts about one installed distro.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallState {
    /// Display name of the distro.
    #[serde(default)]
    pub distro_name: String,
    /// Installed release tag.
    #[serde(default)]
    pub version: String,
    /// Mode used for the install.
    #[serde(default)]
    pub mode: String,
}

/// All saved installs, keyed by distro cache name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installations {
    /// Entries by distro key.
    #[serde(default)]
    pub installations: BTreeMap<String, InstallState>,
}

/// Errors writing the state file.
#[derive(Debug, thiserror::Error)]
pub enum StateStoreError {
    /// No configuration directory is available on this system.
    #[error("could not determine the cast configuration directory")]
    MissingConfigDirectory,

    /// Creating the state directory failed.
    #[error("failed to create state directory {path}: {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Serializing the record failed.
    #[error("failed to serialize install state: {0}")]
    Serialize(#[from] serde_yaml::Error),

    /// Writing the state file failed.
    #[error("failed to write state file {path}: {source}")]
    Write {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// Mutex-guarded view over the state file.
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    record: Mutex<Installations>,
}

impl StateStore {
    /// Create an empty store backed by `path`. Nothing is read until
    /// [`StateStore::load`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            record: Mutex::new(Installations::default()),
        }
    }

    /// Create a store at the default location for `dirs`.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError::MissingConfigDirectory`] when the platform
    /// has no user configuration directory.
    pub fn for_user(dirs: &dyn BaseDirs) -> Result<Self, StateStoreError> {
        let dir = cast_config_dir(dirs).ok_or(StateStoreError::MissingConfigDirectory)?;
        Ok(Self::new(dir.join(STATE_FILENAME)))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory record with the file's contents.
    pub fn load(&self) {
        *self.lock() = read_record(&self.path);
    }

    /// Copy of the in-memory record.
    #[must_use]
    pub fn snapshot(&self) -> Installations {
        self.lock().clone()
    }

    /// Write the in-memory record, creating the parent directory.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] if the directory cannot be created, the
    /// record cannot be serialized or the file cannot be written.
    pub fn save(&self) -> Result<(), StateStoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| {
                StateStoreError::CreateDirectory {
                    path: parent.to_path_buf(),
                    source,
                }
            })?;
        }
        let yaml = serde_yaml::to_string(&*self.lock())?;
        std::fs::write(&self.path, yaml).map_err(|source| StateStoreError::Write {
            path: self.path.clone(),
            source,
        })?;
        debug!("saved install state to {}", self.path.display());
        Ok(())
    }

    /// Saved state for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<InstallState> {
        self.lock().installations.get(key).cloned()
    }

    /// Record `state` for `key` in memory.
    pub fn set(&self, key: impl Into<String>, state: InstallState) {
        self.lock().installations.insert(key.into(), state);
    }

    fn lock(&self) -> MutexGuard<'_, Installations> {
        // The record is plain data, so a poisoned guard is still consistent.
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_record(path: &Path) -> Installations {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("no install state at {}", path.display());
            return Installations::default();
        }
        Err(e) => {
            warn!("unable to read install state {}: {e}", path.display());
            return Installations::default();
        }
    };

    if content.trim().is_empty() {
        return Installations::default();
    }
    match serde_yaml::from_str::<Installations>(&content) {
        Ok(record) => record,
        Err(e) => {
            warn!("ignoring corrupt install state {}: {e}", path.display());
            Installations::default()
        }
    }
}
