//! Supported operating system constraints.

use crate::sysinfo::OsInfo;
use serde::{Deserialize, Serialize};

/// One `supported_os` entry from a manifest.
///
/// Every non-empty field is a criterion; the host matches when all of them
/// compare equal, ignoring ASCII case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsConstraint {
    /// Distribution identifier, compared with [`OsInfo::vendor`].
    #[serde(default)]
    pub id: String,
    /// Release number, compared with [`OsInfo::release`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release: String,
    /// Release codename, compared with [`OsInfo::codename`].
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub codename: String,
}

impl OsConstraint {
    /// Build a constraint from its three criteria.
    #[must_use]
    pub fn new(id: impl Into<String>, release: impl Into<String>, codename: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            release: release.into(),
            codename: codename.into(),
        }
    }

    /// Whether `host` satisfies every non-empty criterion.
    ///
    /// # Examples
    ///
    /// ```
    /// use cast_installer::manifest::OsConstraint;
    /// use cast_installer::sysinfo::OsInfo;
    ///
    /// let host = OsInfo {
    ///     vendor: "ubuntu".to_owned(),
    ///     release: "20.04".to_owned(),
    ///     codename: "focal".to_owned(),
    ///     ..OsInfo::default()
    /// };
    /// assert!(OsConstraint::new("Ubuntu", "20.04", "").matches(&host));
    /// assert!(!OsConstraint::new("ubuntu", "22.04", "").matches(&host));
    /// ```
    #[must_use]
    pub fn matches(&self, host: &OsInfo) -> bool {
        [
            (&self.id, &host.vendor),
            (&self.release, &host.release),
            (&self.codename, &host.codename),
        ]
        .into_iter()
        .filter(|(wanted, _)| !wanted.is_empty())
        .all(|(wanted, actual)| wanted.eq_ignore_ascii_case(actual))
    }
}

/// Whether `host` is acceptable under `constraints`.
///
/// An empty constraint list accepts every host.
#[must_use]
pub fn is_supported(constraints: &[OsConstraint], host: &OsInfo) -> bool {
    constraints.is_empty() || constraints.iter().any(|c| c.matches(host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn focal() -> OsInfo {
        OsInfo {
            vendor: "ubuntu".to_owned(),
            release: "20.04".to_owned(),
            codename: "focal".to_owned(),
            ..OsInfo::default()
        }
    }

    #[rstest]
    #[case::id_and_release(OsConstraint::new("ubuntu", "20.04", ""), true)]
    #[case::all_fields(OsConstraint::new("ubuntu", "20.04", "focal"), true)]
    #[case::case_insensitive(OsConstraint::new("UBUNTU", "", "Focal"), true)]
    #[case::other_release(OsConstraint::new("ubuntu", "22.04", ""), false)]
    #[case::other_vendor(OsConstraint::new("debian", "", ""), false)]
    #[case::empty_constraint(OsConstraint::default(), true)]
    fn matches_constraint(focal: OsInfo, #[case] constraint: OsConstraint, #[case] expected: bool) {
        assert_eq!(constraint.matches(&focal), expected);
    }

    #[rstest]
    fn no_constraints_support_everything(focal: OsInfo) {
        assert!(is_supported(&[], &focal));
        assert!(is_supported(&[], &OsInfo::default()));
    }

    #[rstest]
    fn any_matching_constraint_is_enough(focal: OsInfo) {
        let constraints = [
            OsConstraint::new("ubuntu", "22.04", "jammy"),
            OsConstraint::new("ubuntu", "20.04", "focal"),
        ];
        assert!(is_supported(&constraints, &focal));
        assert!(!is_supported(&constraints[..1], &focal));
    }
}
