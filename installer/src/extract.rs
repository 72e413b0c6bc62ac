//! Unpacking of distro source archives.
//!
//! Release archives wrap their contents in a single top-level directory
//! (`<repo>-<tag>/` for GitHub tarballs), which is dropped on extraction. The
//! compression format is sniffed from the first bytes of the file, so gzip,
//! xz and plain tar archives are all accepted regardless of their names.

use log::debug;
use std::fs::{self, File, OpenOptions, Permissions};
use std::io::{self, BufRead, BufReader, Read};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const XZ_MAGIC: &[u8] = &[0xfd, b'7', b'z', b'X', b'Z', 0x00];

/// Trait for unpacking source archives, enabling test mocking.
#[cfg_attr(test, mockall::automock)]
pub trait ArchiveExtractor {
    /// Extract `archive` into `dest`, stripping the leading directory and,
    /// when it matches, the `base_hint` directory below it.
    ///
    /// Returns the number of regular files written.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::PathTraversal`] or
    /// [`ExtractionError::UnsafeLink`] for entries that would land outside
    /// `dest` or would be written through a symlinked directory, and
    /// [`ExtractionError::Io`] for read or write failures,
    /// including malformed headers.
    fn extract(&self, archive: &Path, dest: &Path, base_hint: &str)
    -> Result<usize, ExtractionError>;
}

/// Errors arising from archive extraction.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// I/O error during extraction.
    #[error("extraction I/O error: {0}")]
    Io(#[from] io::Error),

    /// An entry path is absolute or climbs out of the destination.
    #[error("path traversal detected: {path}")]
    PathTraversal {
        /// The offending entry path.
        path: String,
    },

    /// A symlink points outside the destination.
    #[error("symlink {path} points outside the destination: {target}")]
    UnsafeLink {
        /// The link's entry path.
        path: String,
        /// The declared link target.
        target: String,
    },
}

/// Compression wrapping a tar stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// gzip (`.tar.gz`, `.tgz`).
    Gzip,
    /// xz (`.tar.xz`).
    Xz,
    /// Uncompressed tar.
    None,
}

impl Compression {
    /// Identify the compression from the leading bytes of a file.
    ///
    /// # Examples
    ///
    /// ```
    /// use cast_installer::extract::Compression;
    ///
    /// assert_eq!(Compression::sniff(&[0x1f, 0x8b, 0x08]), Compression::Gzip);
    /// assert_eq!(Compression::sniff(b"ustar"), Compression::None);
    /// ```
    #[must_use]
    pub fn sniff(head: &[u8]) -> Self {
        if head.starts_with(GZIP_MAGIC) {
            Self::Gzip
        } else if head.starts_with(XZ_MAGIC) {
            Self::Xz
        } else {
            Self::None
        }
    }
}

/// Default extractor built on the `tar`, `flate2` and `xz2` crates.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarExtractor;

impl ArchiveExtractor for TarExtractor {
    fn extract(
        &self,
        archive: &Path,
        dest: &Path,
        base_hint: &str,
    ) -> Result<usize, ExtractionError> {
        let mut reader = BufReader::new(File::open(archive)?);
        let compression = Compression::sniff(reader.fill_buf()?);
        debug!("extracting {} ({compression:?})", archive.display());

        let stream: Box<dyn Read> = match compression {
            Compression::Gzip => Box::new(flate2::read::GzDecoder::new(reader)),
            Compression::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
            Compression::None => Box::new(reader),
        };
        fs::create_dir_all(dest)?;
        unpack(tar::Archive::new(stream), dest, base_hint)
    }
}

fn unpack<R: Read>(
    mut archive: tar::Archive<R>,
    dest: &Path,
    base_hint: &str,
) -> Result<usize, ExtractionError> {
    let mut files = 0;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let entry_path = entry.path()?.into_owned();
        validate_entry_path(&entry_path)?;

        let Some(relative) = strip_components(&entry_path, base_hint) else {
            continue;
        };
        let target = dest.join(&relative);
        reject_linked_ancestors(dest, &relative)?;

        match entry.header().entry_type() {
            tar::EntryType::Directory => fs::create_dir_all(&target)?,
            tar::EntryType::Regular | tar::EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                if is_symlink(&target)? {
                    fs::remove_file(&target)?;
                }
                let mode = entry.header().mode()? & 0o7777;
                let mut file = OpenOptions::new()
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .mode(mode)
                    .open(&target)?;
                io::copy(&mut entry, &mut file)?;
                drop(file);
                fs::set_permissions(&target, Permissions::from_mode(mode))?;
                files += 1;
            }
            tar::EntryType::Symlink => {
                let link = entry
                    .link_name()?
                    .map(std::borrow::Cow::into_owned)
                    .unwrap_or_default();
                validate_link(&relative, &link)?;
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)?;
                }
                if fs::symlink_metadata(&target).is_ok() {
                    fs::remove_file(&target)?;
                }
                std::os::unix::fs::symlink(&link, &target)?;
            }
            other => debug!("skipping {} ({other:?})", entry_path.display()),
        }
    }
    Ok(files)
}

/// Drop the archive's top-level directory and, when the next component
/// starts with `base_hint`, that component too. Returns `None` when nothing
/// remains.
///
/// # Examples
///
/// ```
/// use cast_installer::extract::strip_components;
/// use std::path::{Path, PathBuf};
///
/// let path = Path::new("sift-v1.0/sift/init.sls");
/// assert_eq!(strip_components(path, ""), Some(PathBuf::from("sift/init.sls")));
/// assert_eq!(strip_components(path, "sift"), Some(PathBuf::from("init.sls")));
/// assert_eq!(strip_components(Path::new("sift-v1.0/"), ""), None);
/// ```
#[must_use]
pub fn strip_components(path: &Path, base_hint: &str) -> Option<PathBuf> {
    let mut components = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .skip(1)
        .peekable();

    if !base_hint.is_empty() {
        let matches_hint = components
            .peek()
            .is_some_and(|c| c.as_os_str().to_string_lossy().starts_with(base_hint));
        if matches_hint {
            components.next();
        }
    }

    let remainder: PathBuf = components.collect();
    (!remainder.as_os_str().is_empty()).then_some(remainder)
}

/// Validate that a tar entry path does not escape the destination
/// directory via `..` components or absolute paths.
fn validate_entry_path(path: &Path) -> Result<(), ExtractionError> {
    let escapes = path
        .components()
        .any(|c| matches!(c, Component::RootDir | Component::Prefix(_) | Component::ParentDir));
    if escapes {
        return Err(ExtractionError::PathTraversal {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Refuse entries whose parent directories already exist as symlinks under
/// `dest`; writing through them could reach outside the destination.
fn reject_linked_ancestors(dest: &Path, relative: &Path) -> Result<(), ExtractionError> {
    let mut current = dest.to_path_buf();
    let parents = relative.parent().map(Path::components).into_iter().flatten();
    for component in parents {
        current.push(component);
        match fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => {
                return Err(ExtractionError::PathTraversal {
                    path: relative.display().to_string(),
                });
            }
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn is_symlink(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(meta) => Ok(meta.file_type().is_symlink()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// A relative symlink target may climb at most as far as the directory
/// holding the link.
fn validate_link(relative: &Path, link: &Path) -> Result<(), ExtractionError> {
    let unsafe_link = || ExtractionError::UnsafeLink {
        path: relative.display().to_string(),
        target: link.display().to_string(),
    };
    if link.is_absolute() {
        return Err(unsafe_link());
    }

    let mut depth = relative.components().count().saturating_sub(1);
    for component in link.components() {
        match component {
            Component::ParentDir => {
                depth = depth.checked_sub(1).ok_or_else(unsafe_link)?;
            }
            Component::Normal(_) => depth += 1,
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return Err(unsafe_link()),
        }
    }
    Ok(())
}
