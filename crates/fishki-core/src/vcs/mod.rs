//! Version-control abstraction.
//!
//! The [`Vcs`] trait is the capability set the wiki needs from its
//! version-control backend. Every operation is parameterised by the
//! repository path, so one client value can serve whichever wiki root is
//! currently active.
//!
//! ```text
//!   Uninitialized ──init──▶ Initialized
//!                              │  commit / status: always
//!                              │  pull / push / fetch: remote configured,
//!                              │                        clean working tree
//! ```
//!
//! Implementations:
//!
//! | Type | Where |
//! |------|-------|
//! | `GitCli` | `fishki::git`: shells out to the `git` binary |
//! | [`FakeVcs`](fake::FakeVcs) | this crate, configurable test double |

pub mod fake;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Upper bound on commit message length, in characters.
pub const MAX_COMMIT_MESSAGE_LEN: usize = 100;

/// Used when sanitising leaves nothing behind.
pub const FALLBACK_COMMIT_MESSAGE: &str = "Update wiki";

/// Failure kinds reported by a [`Vcs`] implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VcsError {
    #[error("not a repository: {}", .0.display())]
    NotARepository(PathBuf),

    #[error("no remote configured: {}", .0.display())]
    NoRemoteConfigured(PathBuf),

    #[error("working tree has uncommitted changes: {}", .0.display())]
    UncleanWorkingTree(PathBuf),

    /// The external tool ran and failed. `output` is kept for diagnostics only.
    #[error("{operation} failed: {message}")]
    OperationFailed {
        operation: String,
        message: String,
        output: String,
    },
}

impl VcsError {
    pub fn failed(
        operation: impl Into<String>,
        message: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        VcsError::OperationFailed {
            operation: operation.into(),
            message: message.into(),
            output: output.into(),
        }
    }

    /// Captured tool output, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            VcsError::OperationFailed { output, .. } if !output.is_empty() => Some(output),
            _ => None,
        }
    }
}

/// Result of [`Vcs::commit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new history entry was created.
    Committed,
    /// Nothing was staged; no history entry was created.
    Unchanged,
}

/// One line of a porcelain status listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEntry {
    /// Two-character status code, e.g. `" M"`, `"??"`, `"A "`.
    pub code: String,
    pub path: String,
}

impl ChangeEntry {
    pub fn is_modified(&self) -> bool {
        self.code.contains('M')
    }

    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }
}

/// Pending changes in a working tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Changeset {
    pub entries: Vec<ChangeEntry>,
}

impl Changeset {
    /// Parse `git status --porcelain` (v1) output.
    pub fn from_porcelain(output: &str) -> Self {
        let entries = output
            .lines()
            .filter(|line| line.len() >= 3)
            .filter_map(|line| {
                let code = line.get(..2)?;
                let path = line.get(3..)?;
                Some(ChangeEntry {
                    code: code.to_string(),
                    path: path.to_string(),
                })
            })
            .collect();
        Self { entries }
    }

    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn modified_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_modified()).count()
    }

    pub fn untracked_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_untracked()).count()
    }
}

/// Commits relative to the upstream branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Divergence {
    pub ahead: u32,
    pub behind: u32,
}

/// Capability set of a version-control backend.
///
/// Arguments are always passed to the backend as discrete values, never
/// through a shell. Implementations must make [`init`](Vcs::init)
/// idempotent and must treat a commit with nothing staged as
/// [`CommitOutcome::Unchanged`] rather than an error.
#[async_trait]
pub trait Vcs: Send + Sync {
    /// Create a repository at `path`. No-op if one already exists.
    async fn init(&self, path: &Path) -> Result<(), VcsError>;

    /// Stage everything under `path` and commit it with `message`.
    async fn commit(&self, path: &Path, message: &str) -> Result<CommitOutcome, VcsError>;

    /// Integrate upstream changes. Requires a remote and a clean tree.
    async fn pull(&self, path: &Path) -> Result<(), VcsError>;

    /// Publish local commits. Requires a remote and a clean tree.
    async fn push(&self, path: &Path) -> Result<(), VcsError>;

    /// Update remote-tracking refs without touching the working tree.
    async fn fetch(&self, path: &Path) -> Result<(), VcsError>;

    async fn status(&self, path: &Path) -> Result<Changeset, VcsError>;

    async fn has_remote(&self, path: &Path) -> bool;

    async fn is_repository(&self, path: &Path) -> bool;

    /// Name of the checked-out branch (`"HEAD"` when detached).
    async fn current_branch(&self, path: &Path) -> Result<String, VcsError>;

    /// Ahead/behind counts against the upstream branch.
    async fn divergence(&self, path: &Path) -> Result<Divergence, VcsError>;
}

/// Make a commit message safe to hand to the backend and to anything that
/// later reads the history.
///
/// Control characters and shell metacharacters are removed, whitespace runs
/// collapse to one space, and the result is capped at
/// [`MAX_COMMIT_MESSAGE_LEN`] characters.
pub fn sanitize_commit_message(message: &str) -> String {
    const METACHARACTERS: &[char] = &[
        '`', '$', ';', '&', '|', '<', '>', '\\', '"', '\'', '*', '?', '!', '{', '}', '(', ')',
        '[', ']', '~', '#',
    ];

    let cleaned: String = message
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .filter(|c| !c.is_control() && !METACHARACTERS.contains(c))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let capped: String = collapsed.chars().take(MAX_COMMIT_MESSAGE_LEN).collect();
    let capped = capped.trim_end().to_string();

    if capped.is_empty() {
        FALLBACK_COMMIT_MESSAGE.to_string()
    } else {
        capped
    }
}
