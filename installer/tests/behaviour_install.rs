//! Behaviour tests for end-to-end distro installs.
//!
//! Each scenario installs a local project with a scripted `salt-call`, so
//! the whole flow runs without network access or root.

mod support;

use cast_installer::cancel::Cancellation;
use cast_installer::install_flow::{InstallConfig, InstallOutcome, Services, install};
use cast_installer::registry::Registry;
use cast_installer::state::{InstallState, StateStore};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use std::path::PathBuf;
use support::{
    JammyHost, OfflineApi, ScriptedSalt, failing_report, passing_report, write_lab_project,
    write_salt_call,
};
use tempfile::TempDir;

const LAB_KEY: &str = "local_lab";

#[derive(Default)]
struct InstallWorld {
    temp_dir: Option<TempDir>,
    project: Option<PathBuf>,
    salt_call: Option<PathBuf>,
    mode: Option<String>,
    state: Option<String>,
    api: OfflineApi,
    outcome: Option<Result<InstallOutcome, String>>,
    output: String,
}

impl InstallWorld {
    fn root(&self) -> PathBuf {
        self.temp_dir
            .as_ref()
            .expect("temp dir created")
            .path()
            .to_path_buf()
    }

    fn state_path(&self) -> PathBuf {
        self.root().join("config").join("state.yaml")
    }

    fn salt_args(&self) -> Vec<String> {
        let args = std::fs::read_to_string(self.root().join("args.txt")).expect("salt-call ran");
        args.lines().map(str::to_owned).collect()
    }

    fn install(&mut self, identifier: String) {
        let root = self.root();
        let salt_call = self
            .salt_call
            .clone()
            .unwrap_or_else(|| root.join("bin").join("salt-call"));
        let registry = Registry::builtin().expect("builtin registry");
        let deps = ScriptedSalt { binary: salt_call };
        let state = StateStore::new(self.state_path());
        let services = Services {
            registry: &registry,
            api: &self.api,
            os: &JammyHost,
            deps: &deps,
            state: &state,
        };
        let config = InstallConfig {
            identifier,
            mode: self.mode.clone(),
            user: Some("analyst".to_owned()),
            cache_root: root.join("cache"),
            root_check: false,
            salt_state: self.state.clone(),
            ..InstallConfig::default()
        };

        let mut output = Vec::new();
        let result = install(&config, &services, &Cancellation::new(), &mut output);
        self.output = String::from_utf8(output).expect("utf8 output");
        self.outcome = Some(result.map_err(|err| err.to_string()));
    }
}

#[fixture]
fn world() -> InstallWorld {
    InstallWorld::default()
}

#[given("a local lab project")]
fn given_lab_project(world: &mut InstallWorld) {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    world.project = Some(write_lab_project(temp_dir.path()));
    world.temp_dir = Some(temp_dir);
}

#[given("a salt-call that passes")]
fn given_passing_salt(world: &mut InstallWorld) {
    let report = passing_report("lab.server");
    world.salt_call = Some(write_salt_call(&world.root(), &report, 0));
}

#[given("a salt-call with a failing state")]
fn given_failing_salt(world: &mut InstallWorld) {
    let report = failing_report("lab.server");
    world.salt_call = Some(write_salt_call(&world.root(), &report, 2));
}

#[given("the lab project was installed before in mode \"{mode}\"")]
fn given_saved_mode(world: &mut InstallWorld, mode: String) {
    let store = StateStore::new(world.state_path());
    store.set(
        LAB_KEY,
        InstallState {
            distro_name: "lab".to_owned(),
            version: "local".to_owned(),
            mode,
        },
    );
    store.save().expect("save state");
}

#[given("the state \"{state}\" is requested")]
fn given_state(world: &mut InstallWorld, state: String) {
    world.state = Some(state);
}

#[given("the mode \"{mode}\" is requested")]
fn given_mode(world: &mut InstallWorld, mode: String) {
    world.mode = Some(mode);
}

#[when("the lab project is installed")]
fn when_lab_installed(world: &mut InstallWorld) {
    let project = world.project.clone().expect("project written");
    world.install(project.display().to_string());
}

#[when("\"{identifier}\" is installed")]
fn when_identifier_installed(world: &mut InstallWorld, identifier: String) {
    world.install(identifier);
}

#[then("the install succeeds")]
fn then_succeeds(world: &mut InstallWorld) {
    match world.outcome.as_ref().expect("install ran") {
        Ok(outcome) => assert_eq!(outcome.distro, LAB_KEY),
        Err(err) => panic!("install failed: {err}"),
    }
}

#[then("the install fails with \"{fragment}\"")]
fn then_fails(world: &mut InstallWorld, fragment: String) {
    match world.outcome.as_ref().expect("install ran") {
        Ok(outcome) => panic!("install unexpectedly succeeded: {outcome:?}"),
        Err(err) => assert!(err.contains(&fragment), "{err} lacks {fragment}"),
    }
}

#[then("salt applied state \"{state}\"")]
fn then_applied_state(world: &mut InstallWorld, state: String) {
    let args = world.salt_args();
    let position = args
        .iter()
        .position(|arg| arg == "state.apply")
        .expect("state.apply argument");
    assert_eq!(args.get(position + 1), Some(&state));
}

#[then("salt received pillar \"{key}\" set to \"{value}\"")]
fn then_pillar(world: &mut InstallWorld, key: String, value: String) {
    let args = world.salt_args();
    let pillar = args
        .iter()
        .find_map(|arg| arg.strip_prefix("pillar="))
        .expect("pillar argument");
    let pillars: serde_json::Value = serde_json::from_str(pillar).expect("pillar json");
    assert_eq!(pillars.get(&key).and_then(|v| v.as_str()), Some(value.as_str()));
}

#[then("salt was not run")]
fn then_salt_not_run(world: &mut InstallWorld) {
    assert!(!world.root().join("args.txt").exists());
}

#[then("the output ends with \"{message}\"")]
fn then_output_ends_with(world: &mut InstallWorld, message: String) {
    assert!(
        world.output.trim_end().ends_with(&message),
        "unexpected output: {:?}",
        world.output
    );
}

#[then("the saved mode for the lab project is \"{mode}\"")]
fn then_saved_mode(world: &mut InstallWorld, mode: String) {
    let store = StateStore::new(world.state_path());
    store.load();
    let saved = store.get(LAB_KEY).expect("lab state saved");
    assert_eq!(saved.mode, mode);
    assert_eq!(saved.version, "local");
}

#[then("no install state is saved")]
fn then_no_state(world: &mut InstallWorld) {
    assert!(!world.state_path().exists());
}

#[then("no release requests were made")]
fn then_no_requests(world: &mut InstallWorld) {
    assert_eq!(world.api.calls.get(), 0);
}

#[scenario(
    path = "tests/features/install.feature",
    name = "Install a local distro with its default mode"
)]
fn scenario_default_mode(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/install.feature",
    name = "Failed states print the failure message"
)]
fn scenario_failed_states(world: InstallWorld) {
    let _ = world;
}

#[scenario(path = "tests/features/install.feature", name = "A saved mode is reused")]
fn scenario_saved_mode(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/install.feature",
    name = "An explicit state bypasses modes"
)]
fn scenario_explicit_state(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/install.feature",
    name = "Pillar templates see the target user"
)]
fn scenario_pillar_templates(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/install.feature",
    name = "Unknown modes are rejected before salt runs"
)]
fn scenario_unknown_mode(world: InstallWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/install.feature",
    name = "Malformed identifiers never reach the network"
)]
fn scenario_malformed_identifier(world: InstallWorld) {
    let _ = world;
}
