//! GitHub REST client for release listing and asset download.
//!
//! [`ReleaseApi`] abstracts the network so resolution and acquisition can be
//! tested without HTTP. [`HttpReleaseApi`] is the `ureq` implementation.

use super::Release;
use crate::cancel::{CancellableReader, Cancellation, Cancelled};
use log::debug;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("cast/", env!("CARGO_PKG_VERSION"));
const ACCEPT_JSON: &str = "application/vnd.github+json";
const ACCEPT_BINARY: &str = "application/octet-stream";
const RELEASES_PER_PAGE: u32 = 100;

/// Time allowed to establish a connection.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Time allowed for response headers to arrive.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// Access to a repository's releases and their files.
#[cfg_attr(test, mockall::automock)]
pub trait ReleaseApi {
    /// List the releases of `owner/repo`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the payload is invalid.
    fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>, ApiError>;

    /// Fetch a release asset into memory.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    fn fetch_asset(&self, owner: &str, repo: &str, asset_id: u64) -> Result<Vec<u8>, ApiError>;

    /// Download a release asset to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request or the file write fails.
    fn download_asset(
        &self,
        owner: &str,
        repo: &str,
        asset_id: u64,
        dest: &Path,
    ) -> Result<(), ApiError>;

    /// Download `url` to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request or the file write fails.
    fn download_url(&self, url: &str, dest: &Path) -> Result<(), ApiError>;

    /// Download `url` into `dest_dir`, naming the file after the response's
    /// `Content-Disposition`. Returns the written path.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::MissingFilename`] when the response names no
    /// file, or any request or write failure.
    fn download_named(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, ApiError>;
}

/// Errors arising from GitHub API calls.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// HTTP request failed.
    #[error("request failed for {url}: {reason}")]
    Http {
        /// The URL that was requested.
        url: String,
        /// A human-readable description of the failure.
        reason: String,
    },

    /// The server answered 404.
    #[error("not found: {url}")]
    NotFound {
        /// The URL that returned 404.
        url: String,
    },

    /// The response body could not be decoded.
    #[error("invalid response from {url}: {reason}")]
    Decode {
        /// The URL that was requested.
        url: String,
        /// Decoder message.
        reason: String,
    },

    /// The response did not name a file to save.
    #[error("no filename in content-disposition for {url}")]
    MissingFilename {
        /// The URL that was requested.
        url: String,
    },

    /// The run was cancelled.
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    /// I/O error writing a download.
    #[error("I/O error writing download: {0}")]
    Io(#[from] std::io::Error),
}

/// [`ReleaseApi`] backed by `api.github.com`.
///
/// # Examples
///
/// ```
/// use cast_installer::cancel::Cancellation;
/// use cast_installer::release::HttpReleaseApi;
///
/// let api = HttpReleaseApi::new(None, Cancellation::new());
/// assert!(!api.is_authenticated());
/// ```
#[derive(Debug, Clone)]
pub struct HttpReleaseApi {
    token: Option<String>,
    cancel: Cancellation,
}

impl HttpReleaseApi {
    /// Create a client, optionally authenticated with a token.
    #[must_use]
    pub fn new(token: Option<String>, cancel: Cancellation) -> Self {
        let token = token.filter(|t| !t.is_empty());
        Self { token, cancel }
    }

    /// Whether requests carry an `Authorization` header.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    /// URL listing releases for a repository.
    #[must_use]
    pub fn releases_url(owner: &str, repo: &str) -> String {
        format!("{API_BASE}/repos/{owner}/{repo}/releases?per_page={RELEASES_PER_PAGE}")
    }

    /// URL of a single release asset.
    #[must_use]
    pub fn asset_url(owner: &str, repo: &str, asset_id: u64) -> String {
        format!("{API_BASE}/repos/{owner}/{repo}/releases/assets/{asset_id}")
    }

    fn get(&self, url: &str, accept: &str) -> Result<ureq::http::Response<ureq::Body>, ApiError> {
        self.cancel.check()?;
        debug!("GET {url}");
        let mut request = http_agent()
            .get(url)
            .header("User-Agent", USER_AGENT)
            .header("Accept", accept);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request.call().map_err(|e| map_ureq_error(url, &e))
    }

    fn save(&self, url: &str, body: ureq::Body, dest: &Path) -> Result<(), ApiError> {
        let dir = dest.parent().unwrap_or_else(|| Path::new("."));
        let mut staged = tempfile::NamedTempFile::new_in(dir)?;
        let mut reader = CancellableReader::new(body.into_reader(), self.cancel.clone());
        std::io::copy(&mut reader, &mut staged).map_err(|e| {
            if self.cancel.is_cancelled() {
                ApiError::Cancelled(Cancelled)
            } else {
                ApiError::Http {
                    url: url.to_owned(),
                    reason: e.to_string(),
                }
            }
        })?;
        staged.persist(dest).map_err(|e| ApiError::Io(e.error))?;
        Ok(())
    }
}

impl ReleaseApi for HttpReleaseApi {
    fn list_releases(&self, owner: &str, repo: &str) -> Result<Vec<Release>, ApiError> {
        let url = Self::releases_url(owner, repo);
        let body = self
            .get(&url, ACCEPT_JSON)?
            .into_body()
            .read_to_string()
            .map_err(|e| ApiError::Http {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            url,
            reason: e.to_string(),
        })
    }

    fn fetch_asset(&self, owner: &str, repo: &str, asset_id: u64) -> Result<Vec<u8>, ApiError> {
        let url = Self::asset_url(owner, repo, asset_id);
        let mut bytes = Vec::new();
        let body = self.get(&url, ACCEPT_BINARY)?.into_body();
        CancellableReader::new(body.into_reader(), self.cancel.clone())
            .read_to_end(&mut bytes)
            .map_err(|e| ApiError::Http {
                url,
                reason: e.to_string(),
            })?;
        Ok(bytes)
    }

    fn download_asset(
        &self,
        owner: &str,
        repo: &str,
        asset_id: u64,
        dest: &Path,
    ) -> Result<(), ApiError> {
        let url = Self::asset_url(owner, repo, asset_id);
        let body = self.get(&url, ACCEPT_BINARY)?.into_body();
        self.save(&url, body, dest)
    }

    fn download_url(&self, url: &str, dest: &Path) -> Result<(), ApiError> {
        let body = self.get(url, ACCEPT_BINARY)?.into_body();
        self.save(url, body, dest)
    }

    fn download_named(&self, url: &str, dest_dir: &Path) -> Result<PathBuf, ApiError> {
        let response = self.get(url, ACCEPT_BINARY)?;
        let filename = response
            .headers()
            .get("content-disposition")
            .and_then(|value| value.to_str().ok())
            .and_then(filename_from_disposition)
            .ok_or_else(|| ApiError::MissingFilename {
                url: url.to_owned(),
            })?;
        let dest = dest_dir.join(filename);
        self.save(url, response.into_body(), &dest)?;
        Ok(dest)
    }
}

/// Extract a bare file name from a `Content-Disposition` header value.
///
/// Directory components are discarded so the name cannot escape the
/// download directory.
///
/// # Examples
///
/// ```
/// use cast_installer::release::api::filename_from_disposition;
///
/// assert_eq!(
///     filename_from_disposition("attachment; filename=sift-v1.tar.gz").as_deref(),
///     Some("sift-v1.tar.gz")
/// );
/// assert_eq!(filename_from_disposition("inline"), None);
/// ```
#[must_use]
pub fn filename_from_disposition(header: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|param| param.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("filename"))
        .map(|(_, value)| value.trim().trim_matches('"'))
        .and_then(|value| Path::new(value).file_name())
        .and_then(|name| name.to_str())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
}

/// Shared `ureq` agent with timeouts and proxy settings from the environment.
fn http_agent() -> &'static ureq::Agent {
    static AGENT: OnceLock<ureq::Agent> = OnceLock::new();
    AGENT.get_or_init(|| {
        let config = ureq::Agent::config_builder()
            .proxy(ureq::Proxy::try_from_env())
            .timeout_connect(Some(CONNECT_TIMEOUT))
            .timeout_recv_response(Some(RESPONSE_TIMEOUT))
            .build();
        ureq::Agent::new_with_config(config)
    })
}

/// Map a ureq error to an [`ApiError`].
fn map_ureq_error(url: &str, err: &ureq::Error) -> ApiError {
    match err {
        ureq::Error::StatusCode(404) => ApiError::NotFound {
            url: url.to_owned(),
        },
        other => ApiError::Http {
            url: url.to_owned(),
            reason: other.to_string(),
        },
    }
}
