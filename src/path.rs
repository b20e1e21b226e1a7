//! Path manipulation utilities for d0s
//!
//! Manifest paths are resolved lexically: `..` and `.` are folded without
//! touching the filesystem, so a path inside a remote checkout can be checked
//! against the checkout root before anything is read.

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Lexically normalise a path, folding `.` and `..` components.
///
/// A `..` at the root of an absolute path is dropped; a leading `..` on a
/// relative path is kept.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let popped = match out.components().next_back() {
                    Some(Component::Normal(_)) => out.pop(),
                    Some(Component::RootDir) | Some(Component::Prefix(_)) => true,
                    _ => false,
                };
                if !popped {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Join a relative POSIX-style path onto a repository-relative directory,
/// refusing to escape the repository root.
///
/// ```
/// use d0s::path::join_within;
///
/// assert_eq!(join_within("apps/traefik", "manifest.yml").unwrap(), "apps/traefik/manifest.yml");
/// assert_eq!(join_within("apps/traefik", "../env/a.env").unwrap(), "apps/env/a.env");
/// assert!(join_within("apps", "../../etc/passwd").is_err());
/// ```
pub fn join_within(base: &str, relative: &str) -> Result<String> {
    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty() && *p != ".").collect();
    for part in relative.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(Error::InvalidReference {
                        reference: relative.to_string(),
                        message: format!("path escapes the repository root from {:?}", base),
                    });
                }
            }
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// POSIX parent of a repository-relative path (`""` for a top-level file)
pub fn posix_parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Encode a string to be filesystem-safe
///
/// This converts URL characters that are problematic for filesystems
/// into safe alternatives.
pub fn encode_url_path(url: &str) -> String {
    url.chars()
        .map(|c| match c {
            '/' => '-',
            '\\' => '-',
            ':' => '_',
            // Keep alphanumeric, dots, dashes, underscores as-is
            c if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' => c,
            // Replace other characters with underscores
            _ => '_',
        })
        .collect()
}
