//! CLI argument definitions for cast.
//!
//! Parsing lives here so the binary stays a thin shell around
//! [`crate::install_flow::install`] and [`crate::init::write_template`].

use crate::deps::SaltInstallMode;
use crate::install_flow::InstallConfig;
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Install verified SaltStack-based distros such as SIFT and REMnux.
#[derive(Parser, Debug)]
#[command(name = "cast")]
#[command(version, about)]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Install the latest SIFT release:\n",
    "    $ sudo cast install sift\n\n",
    "  Install a specific REMnux release in cloud mode:\n",
    "    $ sudo cast install remnux@v2024.1.1 --mode cloud\n\n",
    "  Install from a local checkout:\n",
    "    $ sudo cast install ./my-distro --no-os-check\n\n",
    "  Start a new distro project:\n",
    "    $ cast init\n",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Logging options.
    #[command(flatten)]
    pub log: LogArgs,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Install a distro.
    Install(InstallArgs),

    /// Write a `.cast.yml` template into the current directory.
    Init,
}

/// Logging options shared by every subcommand.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct LogArgs {
    /// Log level (trace, debug, info, warn, error).
    #[arg(
        short = 'l',
        long,
        global = true,
        env = "LOG_LEVEL",
        default_value = "info"
    )]
    pub log_level: String,

    /// Include the source location in log lines.
    #[arg(long, global = true, env = "LOG_CALLER")]
    pub log_caller: bool,

    /// Disable coloured log output.
    #[arg(long, global = true, env = "LOG_DISABLE_COLOR")]
    pub log_disable_color: bool,

    /// Print full timestamps instead of uptime.
    #[arg(long, global = true, env = "LOG_FULL_TIMESTAMP")]
    pub log_full_timestamp: bool,
}

/// Arguments for `cast install`.
#[derive(Args, Debug, Clone)]
pub struct InstallArgs {
    /// Distro alias, `owner/repo`, or local directory, optionally `@<tag>`.
    #[arg(value_name = "DISTRO")]
    pub distro: String,

    /// GitHub token for API requests.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Consider pre-releases when picking the latest release.
    #[arg(long = "pre-release")]
    pub pre_release: bool,

    /// Install mode; defaults to the saved mode, then the manifest default.
    #[arg(long, env = "CAST_MODE")]
    pub mode: Option<String>,

    /// User to install for.
    #[arg(long, env = "SUDO_USER")]
    pub user: Option<String>,

    /// Cache directory for downloads and salt state.
    #[arg(
        long,
        env = "CAST_CACHE_PATH",
        default_value = crate::dirs::DEFAULT_CACHE_ROOT
    )]
    pub cache_path: Utf8PathBuf,

    /// Discard the cached copy of the selected release.
    #[arg(long)]
    pub no_cache: bool,

    /// Template variable as `key=value` (repeatable).
    #[arg(
        long = "variable",
        value_name = "KEY=VALUE",
        env = "CAST_VARIABLE",
        value_delimiter = ','
    )]
    pub variables: Vec<String>,

    /// Skip the supported operating system check.
    #[arg(long)]
    pub no_os_check: bool,

    /// Put the cache under the temporary directory.
    #[arg(long, hide = true)]
    pub dev: bool,

    /// Allow running as root without a target user.
    #[arg(long, hide = true)]
    pub no_root_check: bool,

    /// Run salt with `test=True`.
    #[arg(long, hide = true)]
    pub saltstack_test: bool,

    /// Apply this state instead of the mode's state.
    #[arg(long, hide = true)]
    pub saltstack_state: Option<String>,

    /// Override the Salt file root.
    #[arg(long, hide = true)]
    pub saltstack_file_root: Option<Utf8PathBuf>,

    /// `salt-call` log level.
    #[arg(long, hide = true, default_value = "info")]
    pub saltstack_log_level: String,

    /// How `salt-call` is provided (package or onedir).
    #[arg(long, hide = true, default_value = "package")]
    pub saltstack_install_mode: SaltInstallMode,
}

impl InstallArgs {
    /// The cache root, relocated under the temporary directory with `--dev`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cast_installer::cli::{Cli, Command};
    /// use clap::Parser;
    ///
    /// let cli = Cli::parse_from(["cast", "install", "sift", "--cache-path", "/srv/cast"]);
    /// let Command::Install(args) = cli.command else { panic!("install") };
    /// assert_eq!(args.cache_root(), std::path::PathBuf::from("/srv/cast"));
    /// ```
    #[must_use]
    pub fn cache_root(&self) -> PathBuf {
        if self.dev {
            return dev_cache_root(&std::env::temp_dir(), &self.cache_path);
        }
        self.cache_path.clone().into_std_path_buf()
    }

    /// Map the parsed flags onto the library's install configuration.
    #[must_use]
    pub fn install_config(&self) -> InstallConfig {
        InstallConfig {
            identifier: self.distro.clone(),
            include_prereleases: self.pre_release,
            mode: self.mode.clone().filter(|m| !m.is_empty()),
            user: self.target_user(),
            cache_root: self.cache_root(),
            no_cache: self.no_cache,
            variables: self.variables.clone(),
            skip_os_check: self.no_os_check,
            root_check: !self.no_root_check,
            salt_test: self.saltstack_test,
            salt_state: self.saltstack_state.clone().filter(|s| !s.is_empty()),
            salt_file_root: self
                .saltstack_file_root
                .clone()
                .map(Utf8PathBuf::into_std_path_buf),
            salt_log_level: self.saltstack_log_level.clone(),
        }
    }

    /// The GitHub token, falling back to `CAST_GITHUB_TOKEN`.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        non_empty(self.github_token.clone()).or_else(|| env_value("CAST_GITHUB_TOKEN"))
    }

    /// The target user, falling back to `CAST_SUDO_USER`.
    #[must_use]
    pub fn target_user(&self) -> Option<String> {
        non_empty(self.user.clone()).or_else(|| env_value("CAST_SUDO_USER"))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn env_value(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

fn dev_cache_root(temp: &std::path::Path, cache_path: &Utf8Path) -> PathBuf {
    temp.join(cache_path.as_str().trim_start_matches('/'))
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
