//! Directory resolution abstraction for platform-specific paths.
//!
//! Production code uses [`SystemBaseDirs`], backed by `directories-next`.
//! Tests substitute [`MockBaseDirs`] to point the state store and cache at
//! temporary directories.

use std::path::PathBuf;

/// Application directory name under the user configuration directory.
const APP_DIR: &str = "cast";

/// Default cache root used when none is configured.
pub const DEFAULT_CACHE_ROOT: &str = "/var/cache/cast";

/// Platform directory lookups needed by the installer.
#[cfg_attr(test, mockall::automock)]
pub trait BaseDirs {
    /// The user configuration directory (for example `~/.config`).
    fn config_dir(&self) -> Option<PathBuf>;
}

/// Directory holding cast's own configuration (`~/.config/cast`).
#[must_use]
pub fn cast_config_dir(dirs: &dyn BaseDirs) -> Option<PathBuf> {
    dirs.config_dir().map(|dir| dir.join(APP_DIR))
}

/// [`BaseDirs`] implementation that queries the running system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemBaseDirs;

impl BaseDirs for SystemBaseDirs {
    fn config_dir(&self) -> Option<PathBuf> {
        directories_next::BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
    }
}
