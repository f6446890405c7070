//! Error taxonomy for wiki operations.
//!
//! Every failure surfaced by [`crate::wiki::Wiki`] has a stable kind
//! ([`WikiError::code`]) and a human-readable message. Captured output from
//! the version-control tool travels separately in [`WikiError::details`] and
//! is never part of the message.

use fishki_core::{SandboxError, VcsError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WikiError {
    /// The requested path would leave the wiki root.
    #[error(transparent)]
    InvalidPath(#[from] SandboxError),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("wiki path not set")]
    ConfigurationMissing,

    #[error(transparent)]
    Vcs(#[from] VcsError),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl WikiError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        WikiError::InvalidRequest(message.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        WikiError::Io {
            context: context.into(),
            source,
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            WikiError::InvalidPath(_) => "invalid_path",
            WikiError::InvalidRequest(_) => "bad_request",
            WikiError::NotFound(_) => "not_found",
            WikiError::ConfigurationMissing => "not_configured",
            WikiError::Vcs(VcsError::NotARepository(_)) => "not_a_repository",
            WikiError::Vcs(VcsError::NoRemoteConfigured(_)) => "no_remote",
            WikiError::Vcs(VcsError::UncleanWorkingTree(_)) => "unclean_working_tree",
            WikiError::Vcs(VcsError::OperationFailed { .. }) => "vcs_failed",
            WikiError::Io { .. } | WikiError::Internal(_) => "internal",
        }
    }

    /// Supplementary diagnostic text (captured tool output).
    pub fn details(&self) -> Option<&str> {
        match self {
            WikiError::Vcs(err) => err.output(),
            _ => None,
        }
    }
}
