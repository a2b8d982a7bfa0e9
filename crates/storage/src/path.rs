//! Remote path normalization.
//!
//! Remote paths are always absolute, `/`-separated strings regardless of the
//! host platform, so this works on `&str` rather than [`std::path::Path`].
//! Directory paths carry a trailing `/`, file paths never do.

use crate::error::{ErrorKind, Result};
use crate::models::NodeKind;

/// Collapse `.`, `..` and repeated separators into an absolute path.
///
/// Trailing slashes are dropped; use [`directory`] to get the directory form.
/// Paths that climb above `/` or contain NUL bytes are rejected with
/// [`InvalidPath`](crate::error::ErrorKind::InvalidPath).
///
/// # Examples
///
/// ```
/// use geocrawl_storage::path::normalize;
/// assert_eq!(normalize("pub//data/./x/../a.tif").unwrap(), "/pub/data/a.tif");
/// assert_eq!(normalize("/").unwrap(), "/");
/// assert!(normalize("/a/../../etc/passwd").is_err());
/// ```
pub fn normalize(path: &str) -> Result<String> {
    if path.contains('\0') {
        exn::bail!(ErrorKind::InvalidPath(path.to_string()));
    }
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {},
            ".." => {
                if segments.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_string()));
                }
            },
            normal => segments.push(normal),
        }
    }
    Ok(format!("/{}", segments.join("/")))
}

/// Normalized directory form of `path`, always ending with `/`.
pub fn directory(path: &str) -> Result<String> {
    let normalized = normalize(path)?;
    Ok(match normalized.as_str() {
        "/" => normalized,
        _ => normalized + "/",
    })
}

/// Full path of the entry `name` inside directory `parent`.
pub fn join(parent: &str, name: &str, kind: NodeKind) -> Result<String> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        exn::bail!(ErrorKind::InvalidPath(format!("{parent}{name}")));
    }
    let joined = format!("{parent}/{name}");
    match kind {
        NodeKind::Directory => directory(&joined),
        NodeKind::File => normalize(&joined),
    }
}

/// Validate a path that must name a file (not the root).
pub fn validate_file(path: &str) -> Result<String> {
    let normalized = normalize(path)?;
    match normalized.as_str() {
        "/" => exn::bail!(ErrorKind::InvalidPath(path.to_string())),
        _ => Ok(normalized),
    }
}

/// Last segment of a path, ignoring any trailing `/`.
pub fn file_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}
