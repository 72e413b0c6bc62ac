//! cast installer library.
//!
//! Resolves SaltStack-based distros (SIFT, REMnux and any project with a
//! `.cast.yml`) to a GitHub release or a local directory, verifies and unpacks
//! the release, and drives `salt-call` to apply the chosen mode. The `cast`
//! binary is a thin wrapper over [`install_flow::install`].
//!
//! # Modules
//!
//! - [`cancel`] - Cooperative cancellation token
//! - [`cli`] - Command-line argument definitions
//! - [`deps`] - Provisioning of `salt-call`
//! - [`dirs`] - Directory resolution abstraction for platform-specific paths
//! - [`distro`] - Distro resolution and acquisition
//! - [`engine`] - `salt-call` execution and result classification
//! - [`error`] - Top-level error type
//! - [`extract`] - Safe tarball extraction
//! - [`init`] - `.cast.yml` scaffolding
//! - [`install_flow`] - End-to-end install orchestration
//! - [`manifest`] - Distro manifests, modes and pillars
//! - [`output`] - Terminal output helpers
//! - [`registry`] - Built-in aliases and fallback manifests
//! - [`release`] - GitHub release selection and download
//! - [`state`] - Saved install state
//! - [`sysinfo`] - Host operating system detection
//! - [`verify`] - Release signature and checksum verification

pub mod cancel;
pub mod cli;
pub mod deps;
pub mod dirs;
pub mod distro;
pub mod engine;
pub mod error;
pub mod extract;
pub mod init;
pub mod install_flow;
pub mod manifest;
pub mod output;
pub mod registry;
pub mod release;
pub mod state;
pub mod sysinfo;
pub mod verify;
