//! Tests for salt provisioning.

use super::*;
use mockall::Sequence;
use mockall::predicate::eq;
use rstest::rstest;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

fn exit_status(code: i32) -> ExitStatus {
    ExitStatus::from_raw(code << 8)
}

fn success_output() -> Output {
    Output {
        status: exit_status(0),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

fn failure_output(stderr: &str) -> Output {
    Output {
        status: exit_status(100),
        stdout: Vec::new(),
        stderr: stderr.as_bytes().to_vec(),
    }
}

fn ubuntu() -> OsInfo {
    OsInfo {
        vendor: "ubuntu".to_owned(),
        release: "22.04".to_owned(),
        codename: "jammy".to_owned(),
        ..OsInfo::default()
    }
}

fn is_install(cmd: &str, args: &[&str]) -> bool {
    cmd == "apt-get" && args.first() == Some(&"install") && args.last() == Some(&"salt-common")
}

#[rstest]
#[case("package", SaltInstallMode::Package)]
#[case("onedir", SaltInstallMode::OneDir)]
#[case("OneDir", SaltInstallMode::OneDir)]
fn install_mode_parses(#[case] input: &str, #[case] expected: SaltInstallMode) {
    assert_eq!(input.parse::<SaltInstallMode>().ok(), Some(expected));
}

#[test]
fn unknown_install_mode_is_rejected() {
    let err = "binary".parse::<SaltInstallMode>().expect_err("rejected");
    assert!(err.to_string().contains("binary"));
}

#[test]
fn package_mode_uses_existing_binary() {
    let mut locator = MockToolLocator::new();
    locator
        .expect_exists()
        .withf(|path| path == Path::new(PACKAGE_SALT_CALL))
        .return_const(true);
    let executor = MockCommandExecutor::new();

    let provisioner =
        SaltProvisioner::new(SaltInstallMode::Package, "/cache", ubuntu(), &locator, &executor);
    assert_eq!(
        provisioner.ensure_salt().expect("salt"),
        PathBuf::from(PACKAGE_SALT_CALL)
    );
}

#[test]
fn package_mode_falls_back_to_path_lookup() {
    let mut locator = MockToolLocator::new();
    locator.expect_exists().return_const(false);
    locator
        .expect_locate()
        .with(eq("salt-call"))
        .returning(|_| Some(PathBuf::from("/opt/salt/bin/salt-call")));
    let executor = MockCommandExecutor::new();

    let provisioner =
        SaltProvisioner::new(SaltInstallMode::Package, "/cache", ubuntu(), &locator, &executor);
    assert_eq!(
        provisioner.ensure_salt().expect("salt"),
        PathBuf::from("/opt/salt/bin/salt-call")
    );
}

#[test]
fn package_mode_installs_with_apt_when_missing() {
    let mut locator = MockToolLocator::new();
    let mut lookups = Sequence::new();
    locator
        .expect_exists()
        .times(1)
        .in_sequence(&mut lookups)
        .return_const(false);
    locator.expect_locate().returning(|_| None);
    locator
        .expect_exists()
        .times(1)
        .in_sequence(&mut lookups)
        .return_const(true);

    let mut executor = MockCommandExecutor::new();
    let mut sequence = Sequence::new();
    executor
        .expect_run()
        .withf(|cmd, args| cmd == "apt-get" && args == ["update"])
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, _| Ok(success_output()));
    executor
        .expect_run()
        .withf(|cmd, args| is_install(cmd, args))
        .times(1)
        .in_sequence(&mut sequence)
        .returning(|_, _| Ok(success_output()));

    let provisioner =
        SaltProvisioner::new(SaltInstallMode::Package, "/cache", ubuntu(), &locator, &executor);
    assert_eq!(
        provisioner.ensure_salt().expect("salt"),
        PathBuf::from(PACKAGE_SALT_CALL)
    );
}

#[test]
fn package_install_failure_reports_stderr() {
    let mut locator = MockToolLocator::new();
    locator.expect_exists().return_const(false);
    locator.expect_locate().returning(|_| None);

    let mut executor = MockCommandExecutor::new();
    executor
        .expect_run()
        .withf(|cmd, args| cmd == "apt-get" && args == ["update"])
        .returning(|_, _| Ok(success_output()));
    executor
        .expect_run()
        .withf(|cmd, args| is_install(cmd, args))
        .returning(|_, _| Ok(failure_output("E: Unable to locate package salt-common\n")));

    let provisioner =
        SaltProvisioner::new(SaltInstallMode::Package, "/cache", ubuntu(), &locator, &executor);
    match provisioner.ensure_salt() {
        Err(DependencyError::Install { tool, message }) => {
            assert_eq!(tool, "apt-get");
            assert_eq!(message, "E: Unable to locate package salt-common");
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn package_mode_reports_missing_binary_after_install() {
    let mut locator = MockToolLocator::new();
    locator.expect_exists().return_const(false);
    locator.expect_locate().returning(|_| None);
    let mut executor = MockCommandExecutor::new();
    executor.expect_run().returning(|_, _| Ok(success_output()));

    let provisioner =
        SaltProvisioner::new(SaltInstallMode::Package, "/cache", ubuntu(), &locator, &executor);
    let err = provisioner.ensure_salt().expect_err("still missing");
    assert_eq!(err.to_string(), "salt-call not found at /usr/bin/salt-call");
}

#[test]
fn package_mode_refuses_non_apt_hosts() {
    let mut locator = MockToolLocator::new();
    locator.expect_exists().return_const(false);
    locator.expect_locate().returning(|_| None);
    let executor = MockCommandExecutor::new();
    let fedora = OsInfo {
        vendor: "fedora".to_owned(),
        ..OsInfo::default()
    };

    let provisioner =
        SaltProvisioner::new(SaltInstallMode::Package, "/cache", fedora, &locator, &executor);
    assert!(matches!(
        provisioner.ensure_salt(),
        Err(DependencyError::UnsupportedOs { vendor }) if vendor == "fedora"
    ));
}

#[rstest]
#[case::present(true)]
#[case::absent(false)]
fn onedir_mode_checks_cache_bundle(#[case] present: bool) {
    let expected = PathBuf::from("/cache/saltstack/salt/salt-call");
    let mut locator = MockToolLocator::new();
    let checked = expected.clone();
    locator
        .expect_exists()
        .withf(move |path| path == checked)
        .return_const(present);
    let executor = MockCommandExecutor::new();

    let provisioner =
        SaltProvisioner::new(SaltInstallMode::OneDir, "/cache", ubuntu(), &locator, &executor);
    match provisioner.ensure_salt() {
        Ok(path) => {
            assert!(present);
            assert_eq!(path, expected);
        }
        Err(DependencyError::NotFound { path }) => {
            assert!(!present);
            assert_eq!(path, expected);
        }
        Err(other) => panic!("unexpected error: {other}"),
    }
}
