//! Synchronization orchestrator.
//!
//! [`Wiki`] ties the sandbox, the indexer and a [`Vcs`] client together
//! behind the operations the HTTP layer and the CLI expose. Every operation
//! starts from a fresh [`ConfigHandle::snapshot`], so a concurrent `init`
//! never changes the root halfway through a request.
//!
//! Mutating operations (save, delete, init, pull, push) are serialised
//! through a single async mutex. Reads (list, load, status, fetch) run
//! concurrently.
//!
//! # Push policy
//!
//! After a successful commit, save and delete push when a remote exists.
//! A push failure does not fail the request: the commit is already durable
//! locally, so the result is [`SyncOutcome::Warning`] carrying the message.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use fishki_core::sandbox::{self, SandboxError};
use fishki_core::tree::{build_tree, root_node};
use fishki_core::vcs::{sanitize_commit_message, Vcs, VcsError};
use fishki_core::{CommitOutcome, PageNode};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ConfigHandle;
use crate::error::WikiError;

pub type Result<T> = std::result::Result<T, WikiError>;

/// Result of a mutating operation whose local part succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Committed, and pushed if a remote exists.
    Done,
    /// Committed locally; the follow-up push failed with this message.
    Warning(String),
}

impl SyncOutcome {
    pub fn warning(&self) -> Option<&str> {
        match self {
            SyncOutcome::Done => None,
            SyncOutcome::Warning(message) => Some(message),
        }
    }
}

/// Repository summary for `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepoSummary {
    pub branch: String,
    pub ahead: u32,
    pub behind: u32,
    pub modified: usize,
    pub untracked: usize,
    pub has_remote: bool,
}

pub struct Wiki {
    config: ConfigHandle,
    vcs: Arc<dyn Vcs>,
    mutations: Mutex<()>,
}

impl Wiki {
    pub fn new(config: ConfigHandle, vcs: Arc<dyn Vcs>) -> Self {
        Self {
            config,
            vcs,
            mutations: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ConfigHandle {
        &self.config
    }

    fn root(&self) -> Result<PathBuf> {
        self.config
            .snapshot()
            .wiki_root()
            .map(Path::to_path_buf)
            .ok_or(WikiError::ConfigurationMissing)
    }

    /// The page tree, wrapped in a folder named after the root directory.
    pub async fn list(&self) -> Result<PageNode> {
        let root = self.root()?;
        let walk_root = root.clone();
        let children = tokio::task::spawn_blocking(move || build_tree(&walk_root))
            .await
            .map_err(anyhow::Error::from)??;
        Ok(root_node(&root, children))
    }

    /// Raw bytes of one page.
    pub async fn load(&self, filename: &str) -> Result<Vec<u8>> {
        let root = self.root()?;
        let normalized = required(filename)?;
        let path = sandbox::resolve_page(&root, &normalized)?;
        confine(&root, &path, filename).await?;

        let meta = metadata(&path, filename).await?;
        if meta.is_dir() {
            return Err(WikiError::invalid_request(format!(
                "{} is a directory",
                filename
            )));
        }
        tokio::fs::read(&path)
            .await
            .map_err(|e| WikiError::io(format!("reading {}", filename), e))
    }

    /// Write `content` to `filename`, creating parent directories, then
    /// commit `Updated <filename>` and push if possible.
    pub async fn save(&self, filename: &str, content: &[u8]) -> Result<SyncOutcome> {
        let root = self.root()?;
        let normalized = required(filename)?;
        let path = sandbox::resolve_page(&root, &normalized)?;

        let _guard = self.mutations.lock().await;

        confine(&root, &path, &normalized).await?;
        if tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
            return Err(WikiError::invalid_request(format!(
                "{} is a directory",
                normalized
            )));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| WikiError::io(format!("creating directories for {}", normalized), e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| WikiError::io(format!("writing {}", normalized), e))?;
        info!(page = %normalized, bytes = content.len(), "page saved");

        self.commit_and_push(&root, &format!("Updated {}", normalized))
            .await
    }

    /// Remove `filename`, commit `Deleted <filename>`, push if possible, and
    /// prune directories the removal left empty.
    pub async fn delete(&self, filename: &str) -> Result<SyncOutcome> {
        let root = self.root()?;
        let normalized = required(filename)?;
        let path = sandbox::resolve_page(&root, &normalized)?;

        let _guard = self.mutations.lock().await;

        // Removing a link never follows it, so only the directories above it
        // need confining.
        if let Some(parent) = path.parent() {
            confine(&root, parent, &normalized).await?;
        }
        let meta = metadata(&path, &normalized).await?;
        if meta.is_dir() {
            return Err(WikiError::invalid_request(format!(
                "{} is a directory",
                normalized
            )));
        }
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| WikiError::io(format!("removing {}", normalized), e))?;
        info!(page = %normalized, "page deleted");

        let outcome = self
            .commit_and_push(&root, &format!("Deleted {}", normalized))
            .await?;
        prune_empty_ancestors(&root, &path).await;
        Ok(outcome)
    }

    /// Initialise a repository at `path` and adopt it as the wiki root.
    pub async fn init(&self, path: &Path) -> Result<()> {
        if !path.is_absolute() {
            return Err(WikiError::invalid_request(format!(
                "wiki path must be absolute: {}",
                path.display()
            )));
        }

        let _guard = self.mutations.lock().await;

        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| WikiError::io(format!("creating {}", path.display()), e))?;
        self.vcs.init(path).await?;
        self.config.set_wiki_root(path.to_path_buf())?;
        info!(root = %path.display(), "wiki initialised");
        Ok(())
    }

    pub async fn pull(&self) -> Result<()> {
        let root = self.root()?;
        let _guard = self.mutations.lock().await;
        self.vcs.pull(&root).await?;
        Ok(())
    }

    pub async fn push(&self) -> Result<()> {
        let root = self.root()?;
        let _guard = self.mutations.lock().await;
        self.vcs.push(&root).await?;
        Ok(())
    }

    pub async fn fetch(&self) -> Result<()> {
        let root = self.root()?;
        self.vcs.fetch(&root).await?;
        Ok(())
    }

    pub async fn status(&self) -> Result<RepoSummary> {
        let root = self.root()?;
        if !self.vcs.is_repository(&root).await {
            return Err(VcsError::NotARepository(root).into());
        }

        let changes = self.vcs.status(&root).await?;
        let branch = self.vcs.current_branch(&root).await?;
        let has_remote = self.vcs.has_remote(&root).await;

        let mut summary = RepoSummary {
            branch,
            ahead: 0,
            behind: 0,
            modified: changes.modified_count(),
            untracked: changes.untracked_count(),
            has_remote,
        };

        if has_remote {
            if let Err(e) = self.vcs.fetch(&root).await {
                warn!(error = %e, "fetch before status failed");
            }
            match self.vcs.divergence(&root).await {
                Ok(d) => {
                    summary.ahead = d.ahead;
                    summary.behind = d.behind;
                }
                Err(e) => debug!(error = %e, "no upstream divergence available"),
            }
        }
        Ok(summary)
    }

    async fn commit_and_push(&self, root: &Path, message: &str) -> Result<SyncOutcome> {
        let message = sanitize_commit_message(message);
        if self.vcs.commit(root, &message).await? == CommitOutcome::Unchanged {
            debug!(%message, "nothing to commit");
        }

        if !self.vcs.has_remote(root).await {
            return Ok(SyncOutcome::Done);
        }
        match self.vcs.push(root).await {
            Ok(()) => Ok(SyncOutcome::Done),
            Err(e) => {
                warn!(error = %e, details = e.output().unwrap_or(""), "push after commit failed");
                Ok(SyncOutcome::Warning(e.to_string()))
            }
        }
    }
}

/// Validate and normalise a filename for a mutating operation.
fn required(filename: &str) -> Result<String> {
    if filename.trim().is_empty() {
        return Err(WikiError::invalid_request("filename is required"));
    }
    if filename.ends_with('/') || filename.ends_with('\\') {
        return Err(WikiError::invalid_request("filename must name a file"));
    }
    let normalized = sandbox::normalize(filename)?;
    if normalized.is_empty() {
        return Err(WikiError::invalid_request("filename must name a file"));
    }
    Ok(normalized)
}

/// Check that `path`, once symlinks are resolved, still lies under `root`
/// and outside its dot-entries.
///
/// The deepest existing ancestor of `path` (the path itself when it exists)
/// is canonicalised and compared against the canonical root. A dangling
/// link is refused outright, since writing through it would create its
/// target wherever it points.
async fn confine(root: &Path, path: &Path, filename: &str) -> Result<()> {
    let real_root = match tokio::fs::canonicalize(root).await {
        Ok(real) => real,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(WikiError::io(format!("resolving {}", root.display()), e)),
    };

    let mut candidate = Some(path);
    while let Some(current) = candidate {
        if !current.starts_with(root) {
            break;
        }
        match tokio::fs::canonicalize(current).await {
            Ok(real) => {
                let Ok(inside) = real.strip_prefix(&real_root) else {
                    return Err(SandboxError::SymlinkEscape(filename.to_string()).into());
                };
                if inside
                    .components()
                    .any(|c| c.as_os_str().to_string_lossy().starts_with('.'))
                {
                    return Err(SandboxError::Hidden(filename.to_string()).into());
                }
                return Ok(());
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if tokio::fs::symlink_metadata(current).await.is_ok() {
                    return Err(SandboxError::SymlinkEscape(filename.to_string()).into());
                }
                candidate = current.parent();
            }
            Err(e) => return Err(WikiError::io(format!("resolving {}", filename), e)),
        }
    }
    Ok(())
}

async fn metadata(path: &Path, filename: &str) -> Result<std::fs::Metadata> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => Ok(meta),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(WikiError::NotFound(filename.to_string()))
        }
        Err(e) => Err(WikiError::io(format!("reading {}", filename), e)),
    }
}

/// Remove now-empty directories between `removed` and `root`, exclusive.
///
/// Walks the lexical parents of a path that was built by joining onto
/// `root`, so the walk stops at `root` by component comparison and never
/// follows a symlink out of it. The first directory that cannot be removed
/// (typically because it is not empty) ends the walk.
async fn prune_empty_ancestors(root: &Path, removed: &Path) {
    let mut dir = removed.parent();
    while let Some(current) = dir {
        if current == root || !current.starts_with(root) {
            break;
        }
        if let Err(e) = tokio::fs::remove_dir(current).await {
            debug!(dir = %current.display(), error = %e, "stopping ancestor cleanup");
            break;
        }
        debug!(dir = %current.display(), "removed empty directory");
        dir = current.parent();
    }
}
