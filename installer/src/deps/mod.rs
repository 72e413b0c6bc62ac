//! Provisioning of the `salt-call` binary.
//!
//! Two install modes are supported. `package` uses the distribution's
//! `salt-common` package at `/usr/bin/salt-call`, installing it with
//! `apt-get` on Debian-family hosts when it is missing. `onedir` uses a
//! self-contained salt bundle unpacked under `<cache>/saltstack/salt`.
//!
//! Adding the upstream apt repository and fetching onedir bundles are left to
//! the host's provisioning; this module only checks for, and where possible
//! installs, the binary the engine will run.

use crate::sysinfo::OsInfo;
use log::{debug, info};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::str::FromStr;

/// Location of `salt-call` when installed from a package.
pub const PACKAGE_SALT_CALL: &str = "/usr/bin/salt-call";

/// Directory below the cache root that holds a onedir bundle.
pub const ONEDIR_DIR: &str = "saltstack";

/// Package providing `salt-call` on Debian-family systems.
const SALT_PACKAGE: &str = "salt-common";

/// Vendors whose package manager is `apt-get`.
const APT_VENDORS: &[&str] = &["ubuntu", "debian"];

/// Abstraction for running external commands.
#[cfg_attr(test, mockall::automock)]
pub trait CommandExecutor {
    /// Runs a command with arguments and returns the captured output.
    ///
    /// # Errors
    ///
    /// Returns any I/O error encountered while spawning or running the
    /// command.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cast_installer::deps::{CommandExecutor, SystemCommandExecutor};
    ///
    /// let output = SystemCommandExecutor.run("salt-call", &["--version"])?;
    /// assert!(output.status.success());
    /// # Ok::<(), std::io::Error>(())
    /// ```
    fn run<'a>(&self, cmd: &str, args: &[&'a str]) -> io::Result<Output>;
}

/// Executes commands on the host system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl CommandExecutor for SystemCommandExecutor {
    fn run(&self, cmd: &str, args: &[&str]) -> io::Result<Output> {
        Command::new(cmd).args(args).output()
    }
}

/// Finds executables on the host.
#[cfg_attr(test, mockall::automock)]
pub trait ToolLocator {
    /// Resolve `name` on `PATH`.
    fn locate(&self, name: &str) -> Option<PathBuf>;

    /// Whether an executable file exists at `path`.
    fn exists(&self, path: &Path) -> bool;
}

/// [`ToolLocator`] backed by the real filesystem and `PATH`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemToolLocator;

impl ToolLocator for SystemToolLocator {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        which::which(name).ok()
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

/// How salt is provided on the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SaltInstallMode {
    /// The `salt-common` system package.
    #[default]
    Package,
    /// A self-contained onedir bundle in the cache.
    OneDir,
}

impl FromStr for SaltInstallMode {
    type Err = DependencyError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "package" => Ok(Self::Package),
            "onedir" => Ok(Self::OneDir),
            _ => Err(DependencyError::UnknownInstallMode {
                mode: value.to_owned(),
            }),
        }
    }
}

/// Errors provisioning `salt-call`.
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    /// The install mode name was not recognised.
    #[error("unsupported saltstack install mode: {mode} (expected package or onedir)")]
    UnknownInstallMode {
        /// The rejected mode.
        mode: String,
    },

    /// The binary is missing and cannot be installed automatically.
    #[error("salt-call not found at {}", .path.display())]
    NotFound {
        /// Where the binary was expected.
        path: PathBuf,
    },

    /// The host's package manager is not supported.
    #[error("unsupported operating system for package install: {vendor}")]
    UnsupportedOs {
        /// Detected vendor id.
        vendor: String,
    },

    /// A package manager command failed.
    #[error("failed to install {tool}: {message}")]
    Install {
        /// Name of the package or command.
        tool: &'static str,
        /// Description of the failure.
        message: String,
    },
}

/// Provides the path of a runnable `salt-call`.
#[cfg_attr(test, mockall::automock)]
pub trait DependencyInstaller {
    /// Make sure salt is available and return the binary to run.
    ///
    /// # Errors
    ///
    /// Returns [`DependencyError`] when salt is missing and cannot be
    /// installed.
    fn ensure_salt(&self) -> Result<PathBuf, DependencyError>;
}

/// [`DependencyInstaller`] for the two [`SaltInstallMode`]s.
pub struct SaltProvisioner<'a> {
    mode: SaltInstallMode,
    cache_root: PathBuf,
    os: OsInfo,
    locator: &'a dyn ToolLocator,
    executor: &'a dyn CommandExecutor,
}

impl std::fmt::Debug for SaltProvisioner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaltProvisioner")
            .field("mode", &self.mode)
            .field("cache_root", &self.cache_root)
            .field("vendor", &self.os.vendor)
            .finish_non_exhaustive()
    }
}

impl<'a> SaltProvisioner<'a> {
    /// Create a provisioner.
    #[must_use]
    pub fn new(
        mode: SaltInstallMode,
        cache_root: impl Into<PathBuf>,
        os: OsInfo,
        locator: &'a dyn ToolLocator,
        executor: &'a dyn CommandExecutor,
    ) -> Self {
        Self {
            mode,
            cache_root: cache_root.into(),
            os,
            locator,
            executor,
        }
    }

    /// The binary path for the configured mode.
    ///
    /// # Examples
    ///
    /// ```
    /// use cast_installer::deps::{
    ///     SaltInstallMode, SaltProvisioner, SystemCommandExecutor, SystemToolLocator,
    /// };
    /// use cast_installer::sysinfo::OsInfo;
    /// use std::path::Path;
    ///
    /// let provisioner = SaltProvisioner::new(
    ///     SaltInstallMode::OneDir,
    ///     "/var/cache/cast",
    ///     OsInfo::default(),
    ///     &SystemToolLocator,
    ///     &SystemCommandExecutor,
    /// );
    /// assert_eq!(
    ///     provisioner.binary(),
    ///     Path::new("/var/cache/cast/saltstack/salt/salt-call")
    /// );
    /// ```
    #[must_use]
    pub fn binary(&self) -> PathBuf {
        match self.mode {
            SaltInstallMode::Package => PathBuf::from(PACKAGE_SALT_CALL),
            SaltInstallMode::OneDir => self
                .cache_root
                .join(ONEDIR_DIR)
                .join("salt")
                .join("salt-call"),
        }
    }

    fn ensure_package(&self) -> Result<PathBuf, DependencyError> {
        let binary = self.binary();
        if self.locator.exists(&binary) {
            debug!("salt-call found at {}", binary.display());
            return Ok(binary);
        }
        if let Some(found) = self.locator.locate("salt-call") {
            info!("using salt-call from PATH: {}", found.display());
            return Ok(found);
        }

        let vendor = self.os.vendor.to_ascii_lowercase();
        if !APT_VENDORS.contains(&vendor.as_str()) {
            return Err(DependencyError::UnsupportedOs {
                vendor: self.os.vendor.clone(),
            });
        }

        info!("updating apt");
        run_checked(self.executor, "apt-get", &["update"])?;
        info!("installing saltstack");
        run_checked(
            self.executor,
            "apt-get",
            &[
                "install",
                "-o",
                "Dpkg::Options::=--force-confdef",
                "-o",
                "Dpkg::Options::=--force-confold",
                "-y",
                "--allow-change-held-packages",
                "--no-install-suggests",
                SALT_PACKAGE,
            ],
        )?;

        if !self.locator.exists(&binary) {
            return Err(DependencyError::NotFound { path: binary });
        }
        info!("salt installed properly");
        Ok(binary)
    }

    fn ensure_onedir(&self) -> Result<PathBuf, DependencyError> {
        let binary = self.binary();
        if self.locator.exists(&binary) {
            debug!("onedir salt-call found at {}", binary.display());
            Ok(binary)
        } else {
            Err(DependencyError::NotFound { path: binary })
        }
    }
}

impl DependencyInstaller for SaltProvisioner<'_> {
    fn ensure_salt(&self) -> Result<PathBuf, DependencyError> {
        match self.mode {
            SaltInstallMode::Package => self.ensure_package(),
            SaltInstallMode::OneDir => self.ensure_onedir(),
        }
    }
}

/// Run a command and turn a spawn failure or non-zero exit into an error.
fn run_checked(
    executor: &dyn CommandExecutor,
    cmd: &'static str,
    args: &[&str],
) -> Result<(), DependencyError> {
    let output = executor
        .run(cmd, args)
        .map_err(|e| DependencyError::Install {
            tool: cmd,
            message: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DependencyError::Install {
            tool: cmd,
            message: stderr.trim().to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests;
