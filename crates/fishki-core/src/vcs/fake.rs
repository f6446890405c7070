//! Configurable in-memory [`Vcs`] implementation for tests.
//!
//! Every return value and every per-operation error is a plain field on
//! [`FakeState`]; tests set what they need with [`FakeVcs::configure`] and
//! inspect recorded calls with [`FakeVcs::snapshot`]. No filesystem or
//! process access happens here.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{Changeset, CommitOutcome, Divergence, Vcs, VcsError};

/// Field-settable behaviour and call log of a [`FakeVcs`].
#[derive(Debug, Clone)]
pub struct FakeState {
    pub is_repository: bool,
    pub has_remote: bool,
    /// When `true`, commits report [`CommitOutcome::Unchanged`] and are not logged.
    pub nothing_to_commit: bool,
    pub changeset: Changeset,
    pub branch: String,
    pub divergence: Divergence,

    pub init_error: Option<VcsError>,
    pub commit_error: Option<VcsError>,
    pub pull_error: Option<VcsError>,
    pub push_error: Option<VcsError>,
    pub fetch_error: Option<VcsError>,
    pub status_error: Option<VcsError>,

    pub inits: Vec<PathBuf>,
    /// `(repository path, message)` for every commit that created history.
    pub commits: Vec<(PathBuf, String)>,
    pub pulls: usize,
    pub pushes: usize,
    pub fetches: usize,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            is_repository: true,
            has_remote: false,
            nothing_to_commit: false,
            changeset: Changeset::default(),
            branch: "main".to_string(),
            divergence: Divergence::default(),
            init_error: None,
            commit_error: None,
            pull_error: None,
            push_error: None,
            fetch_error: None,
            status_error: None,
            inits: Vec::new(),
            commits: Vec::new(),
            pulls: 0,
            pushes: 0,
            fetches: 0,
        }
    }
}

/// Test double for [`Vcs`].
#[derive(Debug, Default)]
pub struct FakeVcs {
    state: Mutex<FakeState>,
}

impl FakeVcs {
    /// An initialised repository with no remote and nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn configure(&self, f: impl FnOnce(&mut FakeState)) {
        f(&mut self.state.lock());
    }

    pub fn snapshot(&self) -> FakeState {
        self.state.lock().clone()
    }

    fn fail_or(err: &Option<VcsError>) -> Result<(), VcsError> {
        match err {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Vcs for FakeVcs {
    async fn init(&self, path: &Path) -> Result<(), VcsError> {
        let mut state = self.state.lock();
        Self::fail_or(&state.init_error)?;
        if !state.is_repository {
            state.is_repository = true;
            state.inits.push(path.to_path_buf());
        }
        Ok(())
    }

    async fn commit(&self, path: &Path, message: &str) -> Result<CommitOutcome, VcsError> {
        let mut state = self.state.lock();
        if !state.is_repository {
            return Err(VcsError::NotARepository(path.to_path_buf()));
        }
        Self::fail_or(&state.commit_error)?;
        if state.nothing_to_commit {
            return Ok(CommitOutcome::Unchanged);
        }
        state.commits.push((path.to_path_buf(), message.to_string()));
        Ok(CommitOutcome::Committed)
    }

    async fn pull(&self, path: &Path) -> Result<(), VcsError> {
        let mut state = self.state.lock();
        state.pulls += 1;
        ensure_syncable(&state, path)?;
        Self::fail_or(&state.pull_error)
    }

    async fn push(&self, path: &Path) -> Result<(), VcsError> {
        let mut state = self.state.lock();
        state.pushes += 1;
        ensure_syncable(&state, path)?;
        Self::fail_or(&state.push_error)
    }

    async fn fetch(&self, path: &Path) -> Result<(), VcsError> {
        let mut state = self.state.lock();
        state.fetches += 1;
        if !state.is_repository {
            return Err(VcsError::NotARepository(path.to_path_buf()));
        }
        if !state.has_remote {
            return Err(VcsError::NoRemoteConfigured(path.to_path_buf()));
        }
        Self::fail_or(&state.fetch_error)
    }

    async fn status(&self, path: &Path) -> Result<Changeset, VcsError> {
        let state = self.state.lock();
        if !state.is_repository {
            return Err(VcsError::NotARepository(path.to_path_buf()));
        }
        Self::fail_or(&state.status_error)?;
        Ok(state.changeset.clone())
    }

    async fn has_remote(&self, _path: &Path) -> bool {
        self.state.lock().has_remote
    }

    async fn is_repository(&self, _path: &Path) -> bool {
        self.state.lock().is_repository
    }

    async fn current_branch(&self, path: &Path) -> Result<String, VcsError> {
        let state = self.state.lock();
        if !state.is_repository {
            return Err(VcsError::NotARepository(path.to_path_buf()));
        }
        Ok(state.branch.clone())
    }

    async fn divergence(&self, _path: &Path) -> Result<Divergence, VcsError> {
        Ok(self.state.lock().divergence)
    }
}

fn ensure_syncable(state: &FakeState, path: &Path) -> Result<(), VcsError> {
    if !state.is_repository {
        return Err(VcsError::NotARepository(path.to_path_buf()));
    }
    if !state.has_remote {
        return Err(VcsError::NoRemoteConfigured(path.to_path_buf()));
    }
    if !state.changeset.is_clean() {
        return Err(VcsError::UncleanWorkingTree(path.to_path_buf()));
    }
    Ok(())
}
