//! Configuration parsing, validation and the shared runtime handle.
//!
//! Fishki is configured via a TOML file (default `config/fishki.toml`):
//!
//! ```toml
//! [wiki]
//! root = "/home/me/wiki"
//!
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [git]
//! binary = "git"
//! timeout_secs = 30
//! author_name = "Fishki"
//! author_email = "fishki@localhost"
//!
//! [rate_limit]
//! window_secs = 60
//! max_requests = 60
//! trust_forwarded_for = true
//!
//! [csrf]
//! secure_cookie = false
//! ```
//!
//! Every section is optional. Handlers never read the file directly: they
//! take a [`ConfigHandle::snapshot`] per request, and the only runtime
//! mutation is [`ConfigHandle::set_wiki_root`].

use anyhow::{Context, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub wiki: WikiConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub csrf: CsrfConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct WikiConfig {
    /// Absolute path of the active wiki root. `None` until configured.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GitConfig {
    #[serde(default = "default_git_binary")]
    pub binary: PathBuf,
    #[serde(default = "default_git_timeout")]
    pub timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_email: Option<String>,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            binary: default_git_binary(),
            timeout_secs: default_git_timeout(),
            author_name: None,
            author_email: None,
        }
    }
}

fn default_git_binary() -> PathBuf {
    PathBuf::from("git")
}
fn default_git_timeout() -> u64 {
    30
}

impl GitConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Commit identity, only when both halves are configured.
    pub fn author(&self) -> Option<(&str, &str)> {
        match (&self.author_name, &self.author_email) {
            (Some(name), Some(email)) => Some((name.as_str(), email.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    /// Use the first `X-Forwarded-For` entry as the client identity.
    ///
    /// Only safe behind a proxy that overwrites the header; otherwise any
    /// client can pick its own identity and dodge the limit.
    #[serde(default = "default_trust_forwarded_for")]
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
            trust_forwarded_for: default_trust_forwarded_for(),
        }
    }
}

fn default_window_secs() -> u64 {
    60
}
fn default_max_requests() -> usize {
    60
}
fn default_trust_forwarded_for() -> bool {
    true
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct CsrfConfig {
    /// Mark the token cookie `Secure`. Enable when served over TLS.
    #[serde(default)]
    pub secure_cookie: bool,
}

impl Config {
    /// The configured wiki root, treating an empty path as unset.
    pub fn wiki_root(&self) -> Option<&Path> {
        self.wiki
            .root
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.git.timeout_secs == 0 {
        anyhow::bail!("git.timeout_secs must be > 0");
    }
    if config.rate_limit.window_secs == 0 {
        anyhow::bail!("rate_limit.window_secs must be > 0");
    }
    if config.rate_limit.max_requests == 0 {
        anyhow::bail!("rate_limit.max_requests must be > 0");
    }
    if config.git.author_name.is_some() != config.git.author_email.is_some() {
        anyhow::bail!("git.author_name and git.author_email must be set together");
    }
    if let Some(root) = config.wiki_root() {
        if !root.is_absolute() {
            anyhow::bail!("wiki.root must be an absolute path, got {}", root.display());
        }
    }
    Ok(())
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

/// Load `path`, writing a default configuration there first if it is missing.
pub fn load_or_create_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "config file not found, creating default");
        let config = Config::default();
        save_config(path, &config)?;
        return Ok(config);
    }
    load_config(path)
}

pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config).with_context(|| "Failed to serialize config")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

/// Shared, swappable view of the configuration.
///
/// Readers get an immutable snapshot that stays consistent for the whole
/// request even if the root changes meanwhile.
#[derive(Clone)]
pub struct ConfigHandle {
    current: Arc<RwLock<Arc<Config>>>,
    file: Option<PathBuf>,
}

impl ConfigHandle {
    /// A handle whose updates are kept in memory only.
    pub fn new(config: Config) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
            file: None,
        }
    }

    /// A handle that persists updates back to `file`.
    pub fn with_file(config: Config, file: PathBuf) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(config))),
            file: Some(file),
        }
    }

    pub fn snapshot(&self) -> Arc<Config> {
        self.current.read().clone()
    }

    /// Adopt `root` as the active wiki root.
    ///
    /// Holds the write lock across persistence so concurrent setters cannot
    /// interleave file writes.
    pub fn set_wiki_root(&self, root: PathBuf) -> Result<()> {
        let mut current = self.current.write();
        let mut next = (**current).clone();
        next.wiki.root = Some(root);
        if let Some(file) = &self.file {
            save_config(file, &next)?;
        }
        tracing::info!(root = ?next.wiki.root, "wiki root updated");
        *current = Arc::new(next);
        Ok(())
    }
}
