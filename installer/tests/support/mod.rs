//! Test support for installer behaviour tests.
//!
//! Hand-written fakes for the installer's I/O seams, plus helpers that lay
//! out a local distro project and a scripted `salt-call` in a temp dir.

use cast_installer::deps::{DependencyError, DependencyInstaller};
use cast_installer::release::{ApiError, Release, ReleaseApi};
use cast_installer::sysinfo::{OsInfo, OsProbe};
use std::cell::Cell;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Release API that must not be reached; counts attempts.
#[derive(Default)]
pub struct OfflineApi {
    pub calls: Cell<usize>,
}

impl OfflineApi {
    fn refuse(&self, url: &str) -> ApiError {
        self.calls.set(self.calls.get() + 1);
        ApiError::Http {
            url: url.to_owned(),
            reason: "offline".to_owned(),
        }
    }
}

impl ReleaseApi for OfflineApi {
    fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>, ApiError> {
        Err(self.refuse(&format!("{owner}/{repo}")))
    }

    fn fetch_asset(&self, owner: &str, repo: &str, _asset_id: u64) -> Result<Vec<u8>, ApiError> {
        Err(self.refuse(&format!("{owner}/{repo}")))
    }

    fn download_asset(
        &self,
        owner: &str,
        repo: &str,
        _asset_id: u64,
        _dest: &Path,
    ) -> Result<(), ApiError> {
        Err(self.refuse(&format!("{owner}/{repo}")))
    }

    fn download_url(&self, url: &str, _dest: &Path) -> Result<(), ApiError> {
        Err(self.refuse(url))
    }

    fn download_named(&self, url: &str, _dest_dir: &Path) -> Result<PathBuf, ApiError> {
        Err(self.refuse(url))
    }
}

/// An Ubuntu 22.04 host.
pub struct JammyHost;

impl OsProbe for JammyHost {
    fn os_info(&self) -> OsInfo {
        OsInfo {
            name: "Ubuntu 22.04.4 LTS".to_owned(),
            vendor: "ubuntu".to_owned(),
            version: "22.04".to_owned(),
            release: "22.04".to_owned(),
            codename: "jammy".to_owned(),
            architecture: "x86_64".to_owned(),
        }
    }
}

/// Hands out a fixed `salt-call` path.
pub struct ScriptedSalt {
    pub binary: PathBuf,
}

impl DependencyInstaller for ScriptedSalt {
    fn ensure_salt(&self) -> Result<PathBuf, DependencyError> {
        if self.binary.is_file() {
            Ok(self.binary.clone())
        } else {
            Err(DependencyError::NotFound {
                path: self.binary.clone(),
            })
        }
    }
}

/// `.cast.yml` for a project named `lab` with server and desktop modes.
pub const LAB_PROJECT: &str = "\
manifest:
  version: 2
  name: lab
  modes:
    - name: server
      state: lab.server
      default: true
    - name: desktop
      state: lab.desktop
  supported_os:
    - id: ubuntu
      release: 22.04
      codename: jammy
  saltstack:
    pillars:
      lab_user_template: \"{{ .User }}\"
  success_message: lab is ready
  failure_message: lab failed, see the salt log
";

/// Write a `lab` project under `root` and return its directory.
pub fn write_lab_project(root: &Path) -> PathBuf {
    let dir = root.join("lab");
    fs::create_dir_all(&dir).expect("create project dir");
    fs::write(dir.join(".cast.yml"), LAB_PROJECT).expect("write .cast.yml");
    fs::write(dir.join("server.sls"), "curl:\n  pkg.installed\n").expect("write state");
    dir
}

/// Write an executable `salt-call` under `root` that records its arguments
/// in `args.txt`, prints `report` and exits with `code`.
pub fn write_salt_call(root: &Path, report: &str, code: i32) -> PathBuf {
    let bin = root.join("bin");
    fs::create_dir_all(&bin).expect("create bin dir");
    let args_file = root.join("args.txt");
    let script = format!(
        "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{}'\ncat <<'EOF'\n{report}EOF\nexit {code}\n",
        args_file.display()
    );
    let path = bin.join("salt-call");
    fs::write(&path, script).expect("write salt-call");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod salt-call");
    path
}

/// A report with one passing state from `sls`.
pub fn passing_report(sls: &str) -> String {
    format!(
        "local:\n  pkg_|-curl_|-curl_|-installed:\n    __id__: curl\n    __run_num__: 0\n    __sls__: {sls}\n    comment: installed\n    result: true\n"
    )
}

/// A report with one passing and one failing state.
pub fn failing_report(sls: &str) -> String {
    format!(
        "{}  cmd_|-broken_|-false_|-run:\n    __id__: broken\n    __run_num__: 1\n    __sls__: {sls}\n    comment: boom\n    result: false\n",
        passing_report(sls)
    )
}
