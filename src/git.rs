//! [`Vcs`] implementation backed by the `git` command-line tool.
//!
//! Every operation spawns `git` with an explicit argument vector in the
//! repository directory; no shell is involved, so commit messages and
//! filenames are never interpreted. Each invocation is bounded by the
//! configured timeout and killed if it overruns.
//!
//! | Operation | Commands |
//! |-----------|----------|
//! | init | `git init` (skipped if `.git` exists) |
//! | commit | `git add --all`, `git status --porcelain`, `git commit -m <msg>` |
//! | pull | `git pull --rebase` |
//! | push | `git rev-parse @{u}`, `git push` |
//! | fetch | `git fetch` |
//! | status | `git status --porcelain` |
//! | has_remote | `git remote` |
//! | current_branch | `git symbolic-ref --short HEAD` |
//! | divergence | `git rev-list --left-right --count HEAD...@{u}` |

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use fishki_core::tree::VCS_METADATA_DIR;
use fishki_core::vcs::{Changeset, CommitOutcome, Divergence, Vcs, VcsError};
use tokio::process::Command;
use tracing::debug;

use crate::config::GitConfig;

/// Shells out to `git`.
#[derive(Debug, Clone)]
pub struct GitCli {
    binary: PathBuf,
    timeout: Duration,
    author: Option<(String, String)>,
}

impl GitCli {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
            author: None,
        }
    }

    pub fn from_config(config: &GitConfig) -> Self {
        let mut cli = Self::new(config.binary.clone(), config.timeout());
        if let Some((name, email)) = config.author() {
            cli = cli.with_author(name, email);
        }
        cli
    }

    /// Commit as this identity instead of whatever git is configured with.
    pub fn with_author(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.author = Some((name.into(), email.into()));
        self
    }

    /// Run `git <args>` in `repo` and return its output, successful or not.
    async fn output(&self, repo: &Path, operation: &str, args: &[&str]) -> Result<Output, VcsError> {
        debug!(repo = %repo.display(), ?args, "running git");

        let mut cmd = Command::new(&self.binary);
        cmd.args(args)
            .current_dir(repo)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => Err(VcsError::failed(
                operation,
                format!("timed out after {}s", self.timeout.as_secs()),
                "",
            )),
            Ok(Err(e)) => Err(VcsError::failed(
                operation,
                format!("failed to execute '{}': {}", self.binary.display(), e),
                "",
            )),
            Ok(Ok(output)) => Ok(output),
        }
    }

    /// Run `git <args>` and require a zero exit status.
    async fn run(&self, repo: &Path, operation: &str, args: &[&str]) -> Result<String, VcsError> {
        let output = self.output(repo, operation, args).await?;
        if !output.status.success() {
            return Err(VcsError::failed(
                operation,
                output.status.to_string(),
                captured(&output),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn ensure_repository(&self, repo: &Path) -> Result<(), VcsError> {
        if self.is_repository(repo).await {
            Ok(())
        } else {
            Err(VcsError::NotARepository(repo.to_path_buf()))
        }
    }

    /// Pull and push start from a repository with a remote and a clean tree.
    async fn ensure_syncable(&self, repo: &Path) -> Result<(), VcsError> {
        self.ensure_repository(repo).await?;
        if !self.has_remote(repo).await {
            return Err(VcsError::NoRemoteConfigured(repo.to_path_buf()));
        }
        if !self.status(repo).await?.is_clean() {
            return Err(VcsError::UncleanWorkingTree(repo.to_path_buf()));
        }
        Ok(())
    }

    async fn remotes(&self, repo: &Path) -> Vec<String> {
        match self.run(repo, "remote", &["remote"]).await {
            Ok(out) => out.lines().map(|l| l.trim().to_string()).filter(|l| !l.is_empty()).collect(),
            Err(_) => Vec::new(),
        }
    }
}

#[async_trait]
impl Vcs for GitCli {
    async fn init(&self, path: &Path) -> Result<(), VcsError> {
        if self.is_repository(path).await {
            debug!(path = %path.display(), "repository already initialised");
            return Ok(());
        }
        self.run(path, "init", &["init"]).await?;
        Ok(())
    }

    async fn commit(&self, path: &Path, message: &str) -> Result<CommitOutcome, VcsError> {
        self.ensure_repository(path).await?;
        self.run(path, "add", &["add", "--all"]).await?;

        if self.status(path).await?.is_clean() {
            return Ok(CommitOutcome::Unchanged);
        }

        let mut args: Vec<String> = Vec::new();
        if let Some((name, email)) = &self.author {
            args.extend([
                "-c".to_string(),
                format!("user.name={}", name),
                "-c".to_string(),
                format!("user.email={}", email),
            ]);
        }
        args.extend(["commit".to_string(), "-m".to_string(), message.to_string()]);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        self.run(path, "commit", &args).await?;
        Ok(CommitOutcome::Committed)
    }

    async fn pull(&self, path: &Path) -> Result<(), VcsError> {
        self.ensure_syncable(path).await?;
        self.run(path, "pull", &["pull", "--rebase"]).await?;
        Ok(())
    }

    async fn push(&self, path: &Path) -> Result<(), VcsError> {
        self.ensure_syncable(path).await?;

        let upstream = self
            .output(
                path,
                "push",
                &["rev-parse", "--abbrev-ref", "--symbolic-full-name", "@{u}"],
            )
            .await?;
        if !upstream.status.success() {
            let branch = self.current_branch(path).await.unwrap_or_else(|_| "HEAD".to_string());
            let remote = self
                .remotes(path)
                .await
                .into_iter()
                .next()
                .unwrap_or_else(|| "origin".to_string());
            return Err(VcsError::failed(
                "push",
                format!(
                    "no upstream branch configured; try: git push --set-upstream {} {}",
                    remote, branch
                ),
                captured(&upstream),
            ));
        }

        self.run(path, "push", &["push"]).await?;
        Ok(())
    }

    async fn fetch(&self, path: &Path) -> Result<(), VcsError> {
        self.ensure_repository(path).await?;
        if !self.has_remote(path).await {
            return Err(VcsError::NoRemoteConfigured(path.to_path_buf()));
        }
        self.run(path, "fetch", &["fetch"]).await?;
        Ok(())
    }

    async fn status(&self, path: &Path) -> Result<Changeset, VcsError> {
        self.ensure_repository(path).await?;
        let out = self.run(path, "status", &["status", "--porcelain"]).await?;
        Ok(Changeset::from_porcelain(&out))
    }

    async fn has_remote(&self, path: &Path) -> bool {
        !self.remotes(path).await.is_empty()
    }

    async fn is_repository(&self, path: &Path) -> bool {
        tokio::fs::metadata(path.join(VCS_METADATA_DIR))
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn current_branch(&self, path: &Path) -> Result<String, VcsError> {
        self.ensure_repository(path).await?;
        // symbolic-ref also answers on an unborn branch, unlike rev-parse.
        let out = self
            .output(path, "branch", &["symbolic-ref", "--short", "HEAD"])
            .await?;
        if out.status.success() {
            return Ok(String::from_utf8_lossy(&out.stdout).trim().to_string());
        }
        Ok("HEAD".to_string())
    }

    async fn divergence(&self, path: &Path) -> Result<Divergence, VcsError> {
        let out = self
            .run(
                path,
                "rev-list",
                &["rev-list", "--left-right", "--count", "HEAD...@{u}"],
            )
            .await?;
        parse_divergence(&out)
            .ok_or_else(|| VcsError::failed("rev-list", "unexpected output", out.trim()))
    }
}

/// Parse `rev-list --left-right --count` output: `"<ahead>\t<behind>"`.
fn parse_divergence(out: &str) -> Option<Divergence> {
    let mut parts = out.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    Some(Divergence { ahead, behind })
}

fn captured(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    match (stderr.trim(), stdout.trim()) {
        ("", out) => out.to_string(),
        (err, "") => err.to_string(),
        (err, out) => format!("{}\n{}", err, out),
    }
}
