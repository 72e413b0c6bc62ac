//! End-to-end `cast install`.
//!
//! [`install`] resolves a distro, places its Salt tree in the cache, picks the
//! state to apply, makes sure `salt-call` exists, runs it and records the
//! result. Every external collaborator arrives through [`Services`] so the
//! flow can be driven with fakes.

use crate::cancel::Cancellation;
use crate::deps::DependencyInstaller;
use crate::distro::{Distro, ResolveRequest, Resolver};
use crate::engine::{ExecutionResult, SaltConfig, SaltEngine};
use crate::error::{InstallerError, Result};
use crate::manifest::{DEFAULT_MODE, TemplateData};
use crate::output::write_distro_message;
use crate::registry::Registry;
use crate::release::ReleaseApi;
use crate::state::{InstallState, StateStore};
use crate::sysinfo::OsProbe;
use crate::verify::Verifier;
use log::{debug, info, warn};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Template field holding the target user.
const USER_FIELD: &str = "User";

/// Cache subdirectory for the engine's minion config and logs.
const INSTALLER_DIR: &str = "installer";

/// Everything the user chose for one install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallConfig {
    /// Alias, `owner/repo` or local path, optionally suffixed `@<tag>`.
    pub identifier: String,
    /// Consider pre-releases.
    pub include_prereleases: bool,
    /// Explicit install mode; `None` falls back to the saved mode.
    pub mode: Option<String>,
    /// Target user for the install.
    pub user: Option<String>,
    /// Root of the download and working cache.
    pub cache_root: PathBuf,
    /// Discard any cached copy of the selected release first.
    pub no_cache: bool,
    /// `key=value` template variables.
    pub variables: Vec<String>,
    /// Skip the supported-OS check.
    pub skip_os_check: bool,
    /// Require a target user when running as root.
    pub root_check: bool,
    /// Run salt with `test=True`.
    pub salt_test: bool,
    /// Apply this state instead of the mode's state.
    pub salt_state: Option<String>,
    /// Override the Salt file root.
    pub salt_file_root: Option<PathBuf>,
    /// `salt-call -l` level.
    pub salt_log_level: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            include_prereleases: false,
            mode: None,
            user: None,
            cache_root: PathBuf::from(crate::dirs::DEFAULT_CACHE_ROOT),
            no_cache: false,
            variables: Vec::new(),
            skip_os_check: false,
            root_check: true,
            salt_test: false,
            salt_state: None,
            salt_file_root: None,
            salt_log_level: "info".to_owned(),
        }
    }
}

/// External collaborators of an install.
pub struct Services<'a> {
    /// Alias and fallback manifest tables.
    pub registry: &'a Registry,
    /// GitHub releases.
    pub api: &'a dyn ReleaseApi,
    /// Host OS facts.
    pub os: &'a dyn OsProbe,
    /// Provides `salt-call`.
    pub deps: &'a dyn DependencyInstaller,
    /// Saved install state.
    pub state: &'a StateStore,
}

/// What a successful install did.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallOutcome {
    /// Distro cache name.
    pub distro: String,
    /// Installed release tag.
    pub release: String,
    /// Mode recorded in the state file.
    pub mode: String,
    /// The state that was applied.
    pub state: String,
    /// The salt run.
    pub result: ExecutionResult,
}

/// Split `name@version`. A path that exists as given is never split.
///
/// # Examples
///
/// ```
/// use cast_installer::install_flow::split_identifier;
///
/// assert_eq!(split_identifier("sift@v2023.1"), ("sift", Some("v2023.1")));
/// assert_eq!(split_identifier("remnux"), ("remnux", None));
/// assert_eq!(split_identifier("sift@"), ("sift", None));
/// ```
#[must_use]
pub fn split_identifier(identifier: &str) -> (&str, Option<&str>) {
    if Path::new(identifier).exists() {
        return (identifier, None);
    }
    match identifier.split_once('@') {
        Some((name, version)) => (name, Some(version).filter(|v| !v.is_empty())),
        None => (identifier, None),
    }
}

/// Build pillar template data from the user and `key=value` variables.
/// Malformed variables are skipped with a warning.
///
/// # Examples
///
/// ```
/// use cast_installer::install_flow::template_data;
///
/// let data = template_data(Some("analyst"), &["theme=dark".to_owned(), "oops".to_owned()]);
/// assert_eq!(data.get("User").map(String::as_str), Some("analyst"));
/// assert_eq!(data.get("theme").map(String::as_str), Some("dark"));
/// assert_eq!(data.len(), 2);
/// ```
#[must_use]
pub fn template_data(user: Option<&str>, variables: &[String]) -> TemplateData {
    let mut data = TemplateData::new();
    data.insert(USER_FIELD.to_owned(), user.unwrap_or_default().to_owned());
    for variable in variables {
        match variable.split_once('=') {
            Some((key, value)) if !key.is_empty() && !value.contains('=') => {
                data.insert(key.to_owned(), value.to_owned());
            }
            _ => warn!("invalid saltstack pillar ({variable})"),
        }
    }
    data
}

/// Pick the mode: explicit, then saved, then `default`.
#[must_use]
pub fn effective_mode(explicit: Option<&str>, saved: Option<&InstallState>) -> String {
    if let Some(mode) = explicit.filter(|m| !m.is_empty()) {
        return mode.to_owned();
    }
    if let Some(saved) = saved.filter(|s| !s.mode.is_empty()) {
        info!("using saved mode from previous installation: {}", saved.mode);
        return saved.mode.clone();
    }
    DEFAULT_MODE.to_owned()
}

/// Install a distro.
///
/// The distro's failure message is written to `out` before a failed run is
/// returned as an error; the success message after a successful one.
///
/// # Errors
///
/// Returns [`InstallerError`] when resolution, acquisition, mode resolution,
/// salt provisioning or the salt run fails, or when `cancel` fires before
/// salt starts.
pub fn install(
    config: &InstallConfig,
    services: &Services<'_>,
    cancel: &Cancellation,
    out: &mut dyn Write,
) -> Result<InstallOutcome> {
    services.state.load();
    let data = template_data(config.user.as_deref(), &config.variables);
    let (identifier, version) = split_identifier(&config.identifier);
    debug!("distro {identifier} version {}", version.unwrap_or("latest"));

    let resolver = Resolver::new(services.registry, services.api, services.os)
        .with_verifier(Verifier::new());
    let distro = resolver.resolve(ResolveRequest {
        identifier: identifier.to_owned(),
        version: version.map(str::to_owned),
        include_prereleases: config.include_prereleases,
        skip_os_check: config.skip_os_check,
        template_data: data,
    })?;
    info!("distro validated successfully");

    let distro_dir = config.cache_root.join(distro.cache_path());
    prepare_cache(&distro_dir, config.no_cache)?;
    cancel.check()?;
    distro.acquire(&distro_dir)?;
    info!("distro downloaded successfully");

    let mode = effective_mode(
        config.mode.as_deref(),
        services.state.get(distro.name()).as_ref(),
    );
    let state = match &config.salt_state {
        Some(state) if !state.is_empty() => {
            info!("installing using state: {state}");
            state.clone()
        }
        _ => {
            info!("installing using mode: {mode}");
            distro.mode_state(&mode)?.to_owned()
        }
    };

    let binary = services.deps.ensure_salt()?;
    cancel.check()?;

    let engine = SaltEngine::new(SaltConfig {
        binary,
        work_dir: config.cache_root.join(INSTALLER_DIR),
        file_root: config
            .salt_file_root
            .clone()
            .unwrap_or_else(|| distro_dir.join("source")),
        state: state.clone(),
        pillars: distro.pillars().clone(),
        log_level: config.salt_log_level.clone(),
        test: config.salt_test,
        user: config.user.clone().filter(|u| !u.is_empty()),
        root_check: config.root_check,
    })?;

    let result = match engine.run(cancel) {
        Ok(result) => result,
        Err(e) => {
            write_distro_message(out, distro.failure_message());
            return Err(e.into());
        }
    };
    if let Err(failure) = result.check() {
        write_distro_message(out, distro.failure_message());
        return Err(InstallerError::Salt(failure));
    }

    services.state.set(
        distro.name(),
        InstallState {
            distro_name: identifier.to_owned(),
            version: distro.release_name().to_owned(),
            mode: mode.clone(),
        },
    );
    if let Err(e) = services.state.save() {
        warn!("failed to save installation state: {e}");
    }
    write_distro_message(out, distro.success_message());

    Ok(InstallOutcome {
        distro: distro.name().to_owned(),
        release: distro.release_name().to_owned(),
        mode,
        state,
        result,
    })
}

fn prepare_cache(dir: &Path, no_cache: bool) -> Result<()> {
    if no_cache && dir.exists() {
        info!("removing cached release at {}", dir.display());
        fs::remove_dir_all(dir)?;
    }
    debug!("distro cache path {}", dir.display());
    fs::create_dir_all(dir)?;
    Ok(())
}
