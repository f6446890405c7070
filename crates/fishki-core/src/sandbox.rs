//! Path sandbox.
//!
//! Every client-supplied filename passes through [`resolve`] before the
//! filesystem is touched. Resolution is purely lexical: nothing is read,
//! stat'ed or canonicalised, so the result only depends on the two inputs.
//!
//! Rules:
//!
//! - `/` and `\` are both treated as separators.
//! - Empty and `.` segments are dropped.
//! - Any `..` segment is rejected, even when it would normalise away
//!   (`a/../b`).
//! - Absolute inputs (leading separator, drive or UNC prefix) are rejected.
//! - The joined result must still be relative-to-root without a parent
//!   component.
//!
//! [`resolve_page`] additionally refuses dot-segments (`.git/config`,
//! `notes/.draft.md`). Those entries are never part of the page tree, and
//! the `.git` directory in particular must stay out of reach of clients.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

use crate::models::PATH_SEPARATOR;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SandboxError {
    #[error("invalid path: {0:?} is absolute")]
    Absolute(String),
    #[error("invalid path: {0:?} escapes the wiki root")]
    Escape(String),
    #[error("invalid path: {0:?} contains a forbidden character")]
    ForbiddenCharacter(String),
    #[error("invalid path: {0:?} names a hidden entry")]
    Hidden(String),
    #[error("invalid path: {0:?} leads outside the wiki root through a symlink")]
    SymlinkEscape(String),
}

/// Normalise an untrusted relative path into its canonical `/`-separated form.
///
/// Returns an empty string for inputs that denote the root itself (`""`,
/// `"."`, `"./"`).
pub fn normalize(user_path: &str) -> Result<String, SandboxError> {
    if user_path.contains('\0') {
        return Err(SandboxError::ForbiddenCharacter(user_path.to_string()));
    }
    if user_path.starts_with(['/', '\\']) || Path::new(user_path).is_absolute() {
        return Err(SandboxError::Absolute(user_path.to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in user_path.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return Err(SandboxError::Escape(user_path.to_string())),
            _ => {}
        }
        // Drive letters and other platform prefixes hide inside a single segment.
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => segments.push(segment),
            _ => return Err(SandboxError::Absolute(user_path.to_string())),
        }
    }

    Ok(segments.join(&PATH_SEPARATOR.to_string()))
}

/// Resolve `user_path` against `root`, rejecting anything that would leave it.
pub fn resolve(root: &Path, user_path: &str) -> Result<PathBuf, SandboxError> {
    let normalized = normalize(user_path)?;
    let joined = if normalized.is_empty() {
        root.to_path_buf()
    } else {
        normalized
            .split(PATH_SEPARATOR)
            .fold(root.to_path_buf(), |acc, segment| acc.join(segment))
    };

    let relative = joined
        .strip_prefix(root)
        .map_err(|_| SandboxError::Escape(user_path.to_string()))?;
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_)))
    {
        return Err(SandboxError::Escape(user_path.to_string()));
    }

    Ok(joined)
}

/// Like [`resolve`], but also rejects any segment starting with `.`.
pub fn resolve_page(root: &Path, user_path: &str) -> Result<PathBuf, SandboxError> {
    let normalized = normalize(user_path)?;
    if normalized
        .split(PATH_SEPARATOR)
        .any(|segment| segment.starts_with('.'))
    {
        return Err(SandboxError::Hidden(user_path.to_string()));
    }
    resolve(root, &normalized)
}
