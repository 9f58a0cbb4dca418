//! Path validation for cache locations.
//!
//! Filenames come straight from remote records, so they are checked before
//! being joined onto the cache directory.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a relative path, ensuring it never leaves the directory it is
/// joined onto (no `..` past the start, no absolute prefixes).
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use graft_assets::validate_path;
/// assert!(validate_path("static/.cache-directus").is_ok());
/// assert!(validate_path("../outside").is_err());
/// assert_eq!(validate_path("static/./cache//").unwrap(), Path::new("static/cache"));
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // Null bytes pass through Path::components() on Unix but cause
                // truncation in C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir => {},
            Component::RootDir | Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}

/// Validates a remote filename: a single path component once normalized.
pub fn validate_filename(filename: &str) -> Result<PathBuf> {
    let validated = validate(filename)?;
    if validated.components().count() != 1 {
        exn::bail!(ErrorKind::InvalidPath(PathBuf::from(filename)));
    }
    Ok(validated)
}

/// Join path components with forward slashes, whatever the platform.
pub(crate) fn to_slash(path: &Path) -> String {
    path.components().map(|c| c.as_os_str().to_string_lossy()).collect::<Vec<_>>().join("/")
}
