//! # Fishki
//!
//! A self-hosted markdown wiki whose pages live in a git repository.
//!
//! Every save and delete becomes a commit in the wiki root; when a remote is
//! configured the commit is pushed right away, and a failed push is reported
//! as a warning rather than an error because the edit is already durable
//! locally.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌──────────────┐
//! │   HTTP   │──▶│     Wiki     │──▶│  Vcs (git)   │
//! │  (axum)  │   │ orchestrator │   │  subprocess  │
//! └──────────┘   └──────┬───────┘   └──────────────┘
//!      ▲                │
//! ┌──────────┐   ┌──────▼───────┐
//! │   CLI    │   │ sandbox/tree │
//! │ (fishki) │   │ (fishki-core)│
//! └──────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fishki init /home/me/wiki     # create the repository and adopt it
//! fishki tree                   # print the page tree
//! fishki serve                  # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and the shared [`ConfigHandle`](config::ConfigHandle) |
//! | [`error`] | [`WikiError`](error::WikiError) taxonomy |
//! | [`git`] | `git` subprocess implementation of [`Vcs`](fishki_core::Vcs) |
//! | [`wiki`] | Save/delete/sync orchestration |
//! | [`csrf`] | Double-submit-cookie CSRF guard |
//! | [`security`] | Rate limiting and security headers |
//! | [`render`] | Markdown to HTML |
//! | [`server`] | HTTP API |

pub mod config;
pub mod csrf;
pub mod error;
pub mod git;
pub mod render;
pub mod security;
pub mod server;
pub mod wiki;
