//! # Fishki Core
//!
//! Runtime-free building blocks of the Fishki wiki backend.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Page tree types: [`PageNode`](models::PageNode), [`NodeKind`](models::NodeKind) |
//! | [`sandbox`] | Resolve untrusted relative paths inside the wiki root |
//! | [`tree`] | Walk the wiki root into an ordered page tree |
//! | [`vcs`] | Version-control capability trait, error taxonomy, fake client |
//! | [`rate_limit`] | Sliding-window per-client admission control |
//!
//! Nothing in this crate performs network I/O or spawns processes; the git
//! implementation of [`vcs::Vcs`] and the HTTP layer live in the `fishki`
//! crate.

pub mod models;
pub mod rate_limit;
pub mod sandbox;
pub mod tree;
pub mod vcs;

pub use models::{NodeKind, PageNode};
pub use rate_limit::RateLimiter;
pub use sandbox::{resolve, resolve_page, SandboxError};
pub use tree::build_tree;
pub use vcs::{Changeset, CommitOutcome, Divergence, Vcs, VcsError};
