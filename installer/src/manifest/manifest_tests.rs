//! Unit tests for manifest parsing and mode resolution.

use super::*;
use rstest::rstest;

const V1_MANIFEST: &str = r"
version: 1
base: sift
modes:
  - name: desktop
    state: sift.desktop
  - name: server
    state: sift.server
    default: true
  - name: complete
    state: sift.desktop
    deprecated: true
    replacement: desktop
supported_os:
  - id: ubuntu
    release: '20.04'
    codename: focal
";

const V2_MANIFEST: &str = r#"
version: 2
name: remnux
base_dir: remnux
modes:
  - name: dedicated
    state: remnux.dedicated
    default: true
  - name: addon
    state: remnux.addon
saltstack:
  pillars:
    remnux_user_template: "{{ .User }}"
    remnux_channel: stable
success_message: "REMnux is ready."
failure_message: "See /var/cache/cast/installer/logs/saltstack.log"
"#;

#[test]
fn parses_legacy_manifest() {
    let manifest = Manifest::from_yaml(V1_MANIFEST).expect("parse v1");
    assert_eq!(manifest.schema_version(), SchemaVersion::LEGACY);
    assert_eq!(manifest.base_dir(), "sift");
    assert_eq!(manifest.name(), "");
    assert_eq!(manifest.modes().len(), 3);
    assert_eq!(
        manifest.supported_os(),
        &[OsConstraint::new("ubuntu", "20.04", "focal")]
    );
    assert!(manifest.pillars().is_empty());
}

#[test]
fn parses_current_manifest() {
    let manifest = Manifest::from_yaml(V2_MANIFEST).expect("parse v2");
    assert_eq!(manifest.schema_version(), SchemaVersion::CURRENT);
    assert_eq!(manifest.name(), "remnux");
    assert_eq!(manifest.base_dir(), "remnux");
    assert_eq!(manifest.success_message(), "REMnux is ready.");
    assert!(manifest.failure_message().contains("saltstack.log"));
    assert_eq!(manifest.pillars().len(), 2);
    assert!(manifest.supported_os().is_empty());
}

#[test]
fn current_manifest_falls_back_to_base() {
    let manifest = Manifest::from_yaml("version: 2\nbase: states\n").expect("parse");
    assert_eq!(manifest.base_dir(), "states");
}

#[rstest]
#[case::missing_version("modes: []\n")]
#[case::not_yaml("version: [1")]
fn rejects_malformed_documents(#[case] yaml: &str) {
    assert!(Manifest::from_yaml(yaml).is_err());
}

#[test]
fn missing_version_is_reported() {
    let err = Manifest::from_yaml("name: x\n").expect_err("no version");
    assert_eq!(err, ManifestError::MissingSchemaVersion);
}

#[test]
fn rejects_unknown_schema_version() {
    let err = Manifest::from_yaml("version: 3\n").expect_err("v3");
    assert!(matches!(
        err,
        ManifestError::UnsupportedSchemaVersion { value: 3, .. }
    ));
}

#[test]
fn rejects_two_default_modes() {
    let yaml = concat!(
        "version: 2\n",
        "modes:\n",
        "  - {name: a, state: s.a, default: true}\n",
        "  - {name: b, state: s.b, default: true}\n",
    );
    let err = Manifest::from_yaml(yaml).expect_err("two defaults");
    assert_eq!(
        err,
        ManifestError::MultipleDefaultModes {
            first: "a".to_owned(),
            second: "b".to_owned(),
        }
    );
}

#[rstest]
#[case("", "sift.server")]
#[case("default", "sift.server")]
#[case("desktop", "sift.desktop")]
#[case("server", "sift.server")]
#[case("complete", "sift.desktop")]
fn resolves_mode_state(#[case] mode: &str, #[case] expected: &str) {
    let manifest = Manifest::from_yaml(V1_MANIFEST).expect("parse v1");
    assert_eq!(manifest.mode_state(mode).expect("resolve"), expected);
}

#[test]
fn unknown_mode_names_the_mode() {
    let manifest = Manifest::from_yaml(V1_MANIFEST).expect("parse v1");
    let err = manifest.mode_state("cloud").expect_err("unknown");
    assert_eq!(err.to_string(), "unable to resolve state from mode: cloud");
}

#[test]
fn default_without_default_mode_fails() {
    let manifest = Manifest::new(
        SchemaVersion::CURRENT,
        vec![Mode::new("only", "x.only", false)],
        Vec::new(),
    )
    .expect("manifest");
    assert!(matches!(
        manifest.mode_state("default"),
        Err(ManifestError::UnknownMode { .. })
    ));
}

#[test]
fn render_replaces_template_pillars() {
    let mut manifest = Manifest::from_yaml(V2_MANIFEST).expect("parse v2");
    let data = TemplateData::from([("User".to_owned(), "analyst".to_owned())]);
    manifest.render(&data).expect("render");
    assert_eq!(
        manifest.pillars().get("remnux_user").map(String::as_str),
        Some("analyst")
    );
    assert!(!manifest.pillars().contains_key("remnux_user_template"));
    assert_eq!(
        manifest.pillars().get("remnux_channel").map(String::as_str),
        Some("stable")
    );
}

#[test]
fn render_fails_on_missing_user() {
    let mut manifest = Manifest::from_yaml(V2_MANIFEST).expect("parse v2");
    let err = manifest.render(&TemplateData::new()).expect_err("undefined");
    assert!(matches!(err, ManifestError::TemplateUndefinedField { .. }));
}
