//! Unit tests for the salt engine, driven by a fake `salt-call` script.

use super::*;
use rstest::{fixture, rstest};
use std::os::unix::fs::PermissionsExt;
use tempfile::TempDir;

const REPORT: &str = "local:
  pkg_|-curl_|-curl_|-installed:
    __id__: curl
    __run_num__: 0
    __sls__: sift.packages.curl
    comment: installed
    result: true
  cmd_|-broken_|-false_|-run:
    __id__: broken
    __run_num__: 1
    __sls__: sift.scripts.broken
    comment: boom
    result: false
";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Write an executable `salt-call` that runs `body`.
    fn salt_call(&self, body: &str) -> PathBuf {
        let bin = self.dir.path().join("bin");
        fs::create_dir_all(&bin).expect("bin dir");
        let path = bin.join("salt-call");
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    fn config(&self, binary: PathBuf) -> SaltConfig {
        SaltConfig {
            binary,
            work_dir: self.dir.path().join("installer"),
            file_root: self.dir.path().join("source"),
            state: "sift.server".to_owned(),
            pillars: BTreeMap::from([("sift_user".to_owned(), "analyst".to_owned())]),
            log_level: "info".to_owned(),
            test: false,
            user: Some("analyst".to_owned()),
            root_check: true,
        }
    }
}

#[fixture]
fn workspace() -> Workspace {
    Workspace {
        dir: TempDir::new().expect("tempdir"),
    }
}

#[rstest]
fn args_follow_salt_call_conventions(workspace: Workspace) {
    let mut config = workspace.config(PathBuf::from("/usr/bin/salt-call"));
    config.test = true;
    let engine = SaltEngine::new(config).expect("engine");

    let args = engine.args().expect("args");

    let config_dir = workspace.dir.path().join("installer/salt");
    let file_root = workspace.dir.path().join("source");
    assert_eq!(
        args,
        vec![
            "--config-dir".to_owned(),
            config_dir.display().to_string(),
            "--local".to_owned(),
            "--retcode-passthrough".to_owned(),
            "-l".to_owned(),
            "info".to_owned(),
            "--out".to_owned(),
            "yaml".to_owned(),
            "--file-root".to_owned(),
            file_root.display().to_string(),
            "--no-color".to_owned(),
            "state.apply".to_owned(),
            "sift.server".to_owned(),
            r#"pillar={"sift_user":"analyst"}"#.to_owned(),
            "test=True".to_owned(),
        ]
    );
}

#[rstest]
fn generic_salt_binary_gets_call_subcommand(workspace: Workspace) {
    let engine =
        SaltEngine::new(workspace.config(PathBuf::from("/opt/salt/salt"))).expect("engine");
    let args = engine.args().expect("args");
    assert_eq!(args.first().map(String::as_str), Some("call"));
    assert!(!args.iter().any(|a| a == "test=True"));
}

#[rstest]
fn setup_writes_minion_config(workspace: Workspace) {
    let engine =
        SaltEngine::new(workspace.config(PathBuf::from("salt-call"))).expect("engine");
    engine.setup().expect("setup");

    let minion = fs::read_to_string(engine.config_dir().join("minion")).expect("minion");
    assert_eq!(minion, "enable_fqdns_grains: False\n");
    assert!(engine.log_dir().is_dir());
}

#[rstest]
#[case::root_without_user(true, 0, None, None, false)]
#[case::root_with_user(true, 0, Some("analyst"), None, true)]
#[case::root_with_sudo_user(true, 0, None, Some("analyst"), true)]
#[case::root_with_empty_user(true, 0, Some(""), Some(""), false)]
#[case::unprivileged(true, 1000, None, None, true)]
#[case::check_disabled(false, 0, None, None, true)]
fn root_check(
    #[case] enabled: bool,
    #[case] euid: u32,
    #[case] user: Option<&str>,
    #[case] sudo_user: Option<&str>,
    #[case] allowed: bool,
) {
    let result = check_root(enabled, euid, user, sudo_user);
    assert_eq!(result.is_ok(), allowed);
    if let Err(err) = result {
        assert_eq!(
            err.to_string(),
            "--user was not provided, or install was not ran with sudo"
        );
    }
}

#[rstest]
fn partial_failure_is_classified_and_logged(workspace: Workspace) {
    let body = format!(
        "echo '[INFO    ] Running state [curl] at time 10:00:00' >&2\n\
         echo '    Result: True' >&2\n\
         echo '[INFO    ] Completed state [curl] at time 10:00:01 (duration_in_ms=12.5)' >&2\n\
         cat <<'EOF'\n{REPORT}EOF\n\
         exit 2"
    );
    let binary = workspace.salt_call(&body);
    let engine = SaltEngine::new(workspace.config(binary)).expect("engine");

    let result = engine.run(&Cancellation::new()).expect("run");

    assert_eq!(result.class, ExitClass::PartialFailure);
    assert_eq!((result.total, result.success, result.failed), (2, 1, 1));
    assert_eq!(
        result.first_failure.as_ref().map(|o| o.id.as_str()),
        Some("broken")
    );

    let log = fs::read_to_string(engine.log_dir().join("saltstack.log")).expect("log");
    assert!(log.starts_with("[INFO    ] Running state [curl]"));
    assert!(log.contains("__id__: broken"));
    let results = fs::read_to_string(engine.log_dir().join("results.yaml")).expect("results");
    assert_eq!(results, REPORT);
}

#[rstest]
fn success_run_checks_clean(workspace: Workspace) {
    let binary = workspace.salt_call("echo 'local: {}'\nexit 0");
    let engine = SaltEngine::new(workspace.config(binary)).expect("engine");

    let result = engine.run(&Cancellation::new()).expect("run");

    assert_eq!(result.class, ExitClass::Success);
    assert!(result.check().is_ok());
}

#[rstest]
fn execution_error_carries_salt_output(workspace: Workspace) {
    let binary = workspace.salt_call("echo 'local:'\necho '- No matching sls found'\nexit 1");
    let engine = SaltEngine::new(workspace.config(binary)).expect("engine");

    let result = engine.run(&Cancellation::new()).expect("run");

    assert_eq!(result.class, ExitClass::ExecutionError);
    assert_eq!(result.errors, vec!["No matching sls found".to_owned()]);
}

#[rstest]
fn cancellation_terminates_the_process_group(workspace: Workspace) {
    let binary = workspace.salt_call("sleep 30 &\nwait");
    let engine = SaltEngine::new(workspace.config(binary)).expect("engine");
    let cancel = Cancellation::new();
    cancel.cancel();

    let started = std::time::Instant::now();
    let result = engine.run(&cancel).expect("run");

    assert_eq!(result.class, ExitClass::Terminated);
    assert_eq!(result.check(), Err(SaltFailure::Terminated));
    assert!(started.elapsed() < std::time::Duration::from_secs(20));
}

#[rstest]
fn missing_binary_is_a_spawn_error(workspace: Workspace) {
    let binary = workspace.dir.path().join("absent/salt-call");
    let engine = SaltEngine::new(workspace.config(binary)).expect("engine");

    let err = engine.run(&Cancellation::new()).expect_err("spawn fails");
    assert!(matches!(err, ExecutionError::Spawn { .. }));
}
