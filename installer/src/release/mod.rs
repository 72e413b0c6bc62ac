//! GitHub release model and release selection.

pub mod api;

pub use api::{ApiError, HttpReleaseApi, ReleaseApi};
#[cfg(test)]
pub use api::MockReleaseApi;

use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

/// A release asset as listed by the GitHub API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset id used for download.
    pub id: u64,
    /// File name.
    pub name: String,
    /// Size in bytes.
    #[serde(default)]
    pub size: u64,
}

/// A repository release as listed by the GitHub API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Git tag of the release.
    pub tag_name: String,
    /// Whether GitHub marks the release as a pre-release.
    #[serde(default)]
    pub prerelease: bool,
    /// RFC 3339 creation timestamp.
    #[serde(default)]
    pub created_at: Option<String>,
    /// Source tarball URL.
    #[serde(default)]
    pub tarball_url: Option<String>,
    /// Attached assets.
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// The release chosen for installation, together with its repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseDescriptor {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Git tag.
    pub tag: String,
    /// Whether the release is a pre-release.
    pub is_prerelease: bool,
    /// Creation timestamp, when known.
    pub created_at: Option<String>,
    /// Attached assets.
    pub assets: Vec<Asset>,
    /// Source tarball URL, when published.
    pub tarball_url: Option<String>,
}

impl ReleaseDescriptor {
    /// Combine a listed release with its repository coordinates.
    #[must_use]
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, release: Release) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            tag: release.tag_name,
            is_prerelease: release.prerelease,
            created_at: release.created_at,
            assets: release.assets,
            tarball_url: release.tarball_url,
        }
    }

    /// Find an asset by exact name.
    #[must_use]
    pub fn asset(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|asset| asset.name == name)
    }

    /// Names of all assets, in listing order.
    #[must_use]
    pub fn asset_names(&self) -> Vec<String> {
        self.assets.iter().map(|asset| asset.name.clone()).collect()
    }
}

/// Errors from choosing a release.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    /// Nothing is left once pre-releases are filtered out.
    #[error("repository has no releases")]
    NoReleases,

    /// The requested tag is not among the qualifying releases.
    #[error("unable to find releases: {version}")]
    VersionNotFound {
        /// The requested tag.
        version: String,
    },
}

/// Choose the release to install.
///
/// Pre-releases are ignored unless `include_prereleases` is set. A requested
/// `version` must equal a tag exactly; otherwise the newest release by
/// creation time wins, with listing order breaking ties.
///
/// # Errors
///
/// Returns [`SelectionError::NoReleases`] or
/// [`SelectionError::VersionNotFound`].
///
/// # Examples
///
/// ```
/// use cast_installer::release::{Release, select_release};
///
/// let release = |tag: &str, created: &str, prerelease: bool| Release {
///     tag_name: tag.to_owned(),
///     prerelease,
///     created_at: Some(created.to_owned()),
///     tarball_url: None,
///     assets: Vec::new(),
/// };
/// let releases = vec![
///     release("v1", "2023-01-01T00:00:00Z", false),
///     release("v3-rc1", "2023-03-01T00:00:00Z", true),
///     release("v2", "2023-02-01T00:00:00Z", false),
/// ];
/// assert_eq!(select_release(releases.clone(), None, false).expect("stable").tag_name, "v2");
/// assert_eq!(select_release(releases, None, true).expect("any").tag_name, "v3-rc1");
/// ```
pub fn select_release(
    releases: Vec<Release>,
    version: Option<&str>,
    include_prereleases: bool,
) -> Result<Release, SelectionError> {
    let mut candidates: Vec<Release> = releases
        .into_iter()
        .filter(|release| include_prereleases || !release.prerelease)
        .collect();

    if candidates.is_empty() {
        return Err(SelectionError::NoReleases);
    }

    if let Some(version) = version.filter(|v| !v.is_empty()) {
        return candidates
            .into_iter()
            .find(|release| release.tag_name == version)
            .ok_or_else(|| SelectionError::VersionNotFound {
                version: version.to_owned(),
            });
    }

    // RFC 3339 UTC timestamps order lexicographically; undated releases sort last.
    candidates.sort_by_key(|release| Reverse(release.created_at.clone()));
    candidates
        .into_iter()
        .next()
        .ok_or(SelectionError::NoReleases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    fn release(tag: &str, created: Option<&str>, prerelease: bool) -> Release {
        Release {
            tag_name: tag.to_owned(),
            prerelease,
            created_at: created.map(str::to_owned),
            tarball_url: None,
            assets: Vec::new(),
        }
    }

    #[fixture]
    fn releases() -> Vec<Release> {
        vec![
            release("v2023.1", Some("2023-01-10T00:00:00Z"), false),
            release("v2024.1", Some("2024-01-10T00:00:00Z"), false),
            release("v2024.2-rc1", Some("2024-02-10T00:00:00Z"), true),
        ]
    }

    #[rstest]
    fn picks_latest_stable(releases: Vec<Release>) {
        let chosen = select_release(releases, None, false).expect("select");
        assert_eq!(chosen.tag_name, "v2024.1");
    }

    #[rstest]
    fn includes_prereleases_when_asked(releases: Vec<Release>) {
        let chosen = select_release(releases, None, true).expect("select");
        assert_eq!(chosen.tag_name, "v2024.2-rc1");
    }

    #[rstest]
    #[case("v2023.1", false, Ok("v2023.1"))]
    #[case("v2024.2-rc1", true, Ok("v2024.2-rc1"))]
    #[case("v2024.2-rc1", false, Err(()))]
    #[case("v9", true, Err(()))]
    fn exact_version_lookup(
        releases: Vec<Release>,
        #[case] version: &str,
        #[case] include_prereleases: bool,
        #[case] expected: Result<&str, ()>,
    ) {
        let chosen = select_release(releases, Some(version), include_prereleases);
        match expected {
            Ok(tag) => assert_eq!(chosen.expect("found").tag_name, tag),
            Err(()) => assert_eq!(
                chosen.expect_err("missing"),
                SelectionError::VersionNotFound {
                    version: version.to_owned()
                }
            ),
        }
    }

    #[test]
    fn only_prereleases_means_no_releases() {
        let releases = vec![release("v1-rc1", None, true)];
        assert_eq!(
            select_release(releases, None, false),
            Err(SelectionError::NoReleases)
        );
    }

    #[test]
    fn undated_releases_fall_back_to_listing_order() {
        let releases = vec![release("first", None, false), release("second", None, false)];
        let chosen = select_release(releases, None, false).expect("select");
        assert_eq!(chosen.tag_name, "first");
    }

    #[test]
    fn empty_version_means_latest() {
        let releases = vec![release("only", None, false)];
        let chosen = select_release(releases, Some(""), false).expect("select");
        assert_eq!(chosen.tag_name, "only");
    }

    #[test]
    fn deserializes_github_payload() {
        let json = r#"[{
            "tag_name": "v1.0.0",
            "prerelease": false,
            "created_at": "2024-05-01T12:00:00Z",
            "tarball_url": "https://api.github.com/repos/o/r/tarball/v1.0.0",
            "assets": [{"id": 42, "name": "manifest.yml", "size": 120, "label": null}],
            "draft": false
        }]"#;
        let releases: Vec<Release> = serde_json::from_str(json).expect("decode");
        let descriptor = ReleaseDescriptor::new("o", "r", releases[0].clone());
        assert_eq!(descriptor.tag, "v1.0.0");
        assert_eq!(descriptor.asset("manifest.yml").map(|a| a.id), Some(42));
        assert_eq!(descriptor.asset_names(), vec!["manifest.yml".to_owned()]);
    }
}
