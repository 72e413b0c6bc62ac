//! `cast init`: scaffold a `.cast.yml` for a new distro project.

use crate::distro::local::LOCAL_CONFIG;
use log::info;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Starting point for a distro project's `.cast.yml`.
pub const TEMPLATE: &str = "\
release:
  github:
    owner: <owner> # Set this to the owner of the GitHub Repository
    repository: <repo> # Set this to the repository name
manifest:
  version: 2
  name: <distro-name> # Set this to the name of your distribution
  modes:
    - name: server
      state: <distro-name>.server
      default: true
  supported_os:
    - id: ubuntu
      release: 20.04
      codename: focal
";

/// Errors writing the project file.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// The project already has a `.cast.yml`.
    #[error("file {} already exists", .path.display())]
    AlreadyExists {
        /// The existing file.
        path: PathBuf,
    },

    /// Writing the file failed.
    #[error("unable to write {}: {source}", .path.display())]
    Write {
        /// The target file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
}

/// Write [`TEMPLATE`] to `<dir>/.cast.yml`, refusing to overwrite.
///
/// # Errors
///
/// Returns [`InitError::AlreadyExists`] when the file is present and
/// [`InitError::Write`] for any other I/O failure.
pub fn write_template(dir: &Path) -> Result<PathBuf, InitError> {
    let path = dir.join(LOCAL_CONFIG);
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)
        .map_err(|source| {
            if source.kind() == io::ErrorKind::AlreadyExists {
                InitError::AlreadyExists { path: path.clone() }
            } else {
                InitError::Write {
                    path: path.clone(),
                    source,
                }
            }
        })?;
    file.write_all(TEMPLATE.as_bytes())
        .map_err(|source| InitError::Write {
            path: path.clone(),
            source,
        })?;
    info!("generated {LOCAL_CONFIG}");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Manifest;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn project() -> TempDir {
        tempfile::tempdir().expect("create tempdir")
    }

    #[rstest]
    fn writes_template(project: TempDir) {
        let path = write_template(project.path()).expect("write template");

        assert_eq!(path, project.path().join(".cast.yml"));
        assert_eq!(std::fs::read_to_string(path).expect("read"), TEMPLATE);
    }

    #[rstest]
    fn refuses_to_overwrite(project: TempDir) {
        let path = project.path().join(".cast.yml");
        std::fs::write(&path, "manifest: {}\n").expect("seed");

        let err = write_template(project.path()).expect_err("exists");
        assert!(matches!(err, InitError::AlreadyExists { .. }));
        assert_eq!(std::fs::read_to_string(path).expect("read"), "manifest: {}\n");
    }

    #[test]
    fn template_manifest_parses() {
        #[derive(serde::Deserialize)]
        struct Project {
            manifest: Manifest,
        }

        let manifest = serde_yaml::from_str::<Project>(TEMPLATE)
            .expect("template parses")
            .manifest;

        assert_eq!(manifest.name(), "<distro-name>");
        assert_eq!(
            manifest.mode_state("default").expect("default mode"),
            "<distro-name>.server"
        );
        assert_eq!(
            manifest.supported_os().first().map(|os| os.release.as_str()),
            Some("20.04")
        );
    }
}
