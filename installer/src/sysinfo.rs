//! Host operating system detection.
//!
//! Facts come from `/etc/os-release`, with vendor-specific release files
//! taking precedence for Debian, CentOS and RHEL. The probe is rooted at a
//! configurable directory so tests can supply a fake filesystem.

use log::debug;
use std::path::{Path, PathBuf};

/// Dynamic loaders whose presence identifies the userland architecture.
const LOADERS: [(&str, &str); 3] = [
    ("lib64/ld-linux-x86-64.so.2", "x86_64"),
    ("lib/ld-linux.so.2", "i386"),
    ("lib/ld-linux-aarch64.so.1", "arm64"),
];

/// Facts about the host operating system.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OsInfo {
    /// Human readable name (`PRETTY_NAME`).
    pub name: String,
    /// Distribution identifier (`ID`), for example `ubuntu`.
    pub vendor: String,
    /// Version number extracted from free-form version text.
    pub version: String,
    /// Release number (`VERSION_ID` or a vendor release file).
    pub release: String,
    /// Release codename (`VERSION_CODENAME`), for example `focal`.
    pub codename: String,
    /// Userland architecture.
    pub architecture: String,
}

/// Source of [`OsInfo`] for the machine being provisioned.
#[cfg_attr(test, mockall::automock)]
pub trait OsProbe {
    /// Detect the host operating system.
    fn os_info(&self) -> OsInfo;
}

/// [`OsProbe`] that reads system files below a root directory.
#[derive(Debug, Clone)]
pub struct SystemOsProbe {
    root: PathBuf,
}

impl SystemOsProbe {
    /// Probe the running system (`/`).
    #[must_use]
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Probe a filesystem tree rooted at `root`.
    #[must_use]
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn read_trimmed(&self, relative: &str) -> Option<String> {
        std::fs::read_to_string(self.root.join(relative))
            .ok()
            .map(|content| content.trim().to_owned())
            .filter(|content| !content.is_empty())
    }
}

impl Default for SystemOsProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl OsProbe for SystemOsProbe {
    fn os_info(&self) -> OsInfo {
        let mut info = self
            .read_trimmed("etc/os-release")
            .map(|content| parse_os_release(&content))
            .unwrap_or_default();
        info.architecture = detect_architecture(&self.root);

        match info.vendor.as_str() {
            "debian" => {
                if let Some(release) = self.read_trimmed("etc/debian_version") {
                    info.release = release;
                }
            }
            "centos" => {
                if let Some(release) = self
                    .read_trimmed("etc/centos-release")
                    .as_deref()
                    .and_then(centos_release)
                {
                    info.release = release;
                }
            }
            "rhel" => {
                let from_file = self
                    .read_trimmed("etc/redhat-release")
                    .as_deref()
                    .and_then(first_version_token);
                if let Some(release) = from_file.or_else(|| first_version_token(&info.name)) {
                    info.release = release;
                }
            }
            _ => {}
        }

        debug!(
            "detected os vendor={} release={} codename={} arch={}",
            info.vendor, info.release, info.codename, info.architecture
        );
        info
    }
}

/// Parse the `KEY=value` lines of an `os-release` document.
#[must_use]
pub fn parse_os_release(content: &str) -> OsInfo {
    let mut info = OsInfo::default();
    for line in content.lines() {
        let Some((key, raw)) = line.split_once('=') else {
            continue;
        };
        let value = raw.trim().trim_matches('"').to_owned();
        match key.trim() {
            "PRETTY_NAME" => info.name = value,
            "ID" => info.vendor = value,
            "VERSION_ID" => info.release = value,
            "VERSION_CODENAME" => info.codename = value,
            "VERSION" => {
                if let Some(version) = version_token(value.split([' ', '('])) {
                    info.version = version;
                }
            }
            _ => {}
        }
    }
    info
}

fn detect_architecture(root: &Path) -> String {
    LOADERS
        .iter()
        .find(|(loader, _)| root.join(loader).exists())
        .map(|(_, arch)| (*arch).to_owned())
        .unwrap_or_default()
}

/// `CentOS Linux release 7.9.2009 (Core)` yields `7.9.2009`.
fn centos_release(text: &str) -> Option<String> {
    let rest = text
        .strip_prefix("CentOS Linux release ")
        .or_else(|| text.strip_prefix("CentOS release "))?;
    rest.split_whitespace().next().map(str::to_owned)
}

/// First run of digits and dots that follows a space or an opening paren.
fn first_version_token(text: &str) -> Option<String> {
    version_token(text.split([' ', '(']).skip(1))
}

fn version_token<'a>(tokens: impl Iterator<Item = &'a str>) -> Option<String> {
    tokens
        .map(|token| {
            token
                .chars()
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect::<String>()
        })
        .find(|token| token.starts_with(|c: char| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const UBUNTU_FOCAL: &str = concat!(
        "NAME=\"Ubuntu\"\n",
        "VERSION=\"20.04.6 LTS (Focal Fossa)\"\n",
        "ID=ubuntu\n",
        "ID_LIKE=debian\n",
        "PRETTY_NAME=\"Ubuntu 20.04.6 LTS\"\n",
        "VERSION_ID=\"20.04\"\n",
        "VERSION_CODENAME=focal\n",
    );

    #[test]
    fn parses_ubuntu_os_release() {
        let info = parse_os_release(UBUNTU_FOCAL);
        assert_eq!(info.vendor, "ubuntu");
        assert_eq!(info.release, "20.04");
        assert_eq!(info.codename, "focal");
        assert_eq!(info.name, "Ubuntu 20.04.6 LTS");
        assert_eq!(info.version, "20.04.6");
    }

    #[rstest]
    #[case("CentOS Linux release 7.9.2009 (Core)", Some("7.9.2009"))]
    #[case("CentOS release 6.10 (Final)", Some("6.10"))]
    #[case("Fedora release 38", None)]
    fn extracts_centos_release(#[case] text: &str, #[case] expected: Option<&str>) {
        assert_eq!(centos_release(text).as_deref(), expected);
    }

    #[test]
    fn extracts_rhel_release_from_text() {
        let text = "Red Hat Enterprise Linux release 9.2 (Plow)";
        assert_eq!(first_version_token(text).as_deref(), Some("9.2"));
    }

    #[test]
    fn probe_prefers_debian_version_file() {
        let root = tempfile::tempdir().expect("temp dir");
        let etc = root.path().join("etc");
        std::fs::create_dir_all(&etc).expect("create etc");
        std::fs::write(
            etc.join("os-release"),
            "ID=debian\nVERSION_ID=\"12\"\nVERSION_CODENAME=bookworm\n",
        )
        .expect("write os-release");
        std::fs::write(etc.join("debian_version"), "12.5\n").expect("write debian_version");

        let info = SystemOsProbe::with_root(root.path()).os_info();
        assert_eq!(info.vendor, "debian");
        assert_eq!(info.release, "12.5");
        assert_eq!(info.codename, "bookworm");
    }

    #[test]
    fn probe_detects_architecture_from_loader() {
        let root = tempfile::tempdir().expect("temp dir");
        let lib64 = root.path().join("lib64");
        std::fs::create_dir_all(&lib64).expect("create lib64");
        std::fs::write(lib64.join("ld-linux-x86-64.so.2"), b"").expect("write loader");

        let info = SystemOsProbe::with_root(root.path()).os_info();
        assert_eq!(info.architecture, "x86_64");
        assert!(info.vendor.is_empty());
    }
}
