//! # Fishki CLI (`fishki`)
//!
//! Starts the wiki server and drives the same repository operations from the
//! command line.
//!
//! ## Usage
//!
//! ```bash
//! fishki --config ./config/fishki.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fishki serve` | Start the HTTP server |
//! | `fishki init <path>` | Initialise a repository and adopt it as the wiki root |
//! | `fishki tree` | Print the page tree as JSON |
//! | `fishki status` | Print branch, divergence and change counts as JSON |
//! | `fishki pull` | Pull with rebase |
//! | `fishki push` | Push to the upstream branch |
//! | `fishki fetch` | Fetch from the remote |
//!
//! The config file is created with defaults when it does not exist.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use fishki::config::{load_or_create_config, ConfigHandle};
use fishki::git::GitCli;
use fishki::server::run_server;
use fishki::wiki::Wiki;
use tracing_subscriber::EnvFilter;

/// Fishki: a markdown wiki stored in git.
#[derive(Parser)]
#[command(name = "fishki", version, about = "A self-hosted markdown wiki stored in git")]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(
        long,
        global = true,
        env = "FISHKI_CONFIG",
        default_value = "./config/fishki.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Initialise a repository at PATH and make it the wiki root.
    ///
    /// Safe to repeat: an existing repository is adopted as-is.
    Init {
        /// Directory for the wiki; created if missing.
        path: PathBuf,
    },

    /// Print the page tree of the wiki root.
    Tree,

    /// Print the repository status.
    Status,

    /// Pull remote changes with rebase. Requires a clean working tree.
    Pull,

    /// Push local commits. Requires a clean working tree.
    Push,

    /// Fetch from the remote without merging.
    Fetch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = load_or_create_config(&cli.config)?;
    let git = Arc::new(GitCli::from_config(&config.git));
    let handle = ConfigHandle::with_file(config, cli.config.clone());

    let wiki = Wiki::new(handle.clone(), git.clone());
    match cli.command {
        Commands::Serve => run_server(handle, git).await?,
        Commands::Init { path } => {
            let path = if path.is_absolute() {
                path
            } else {
                std::env::current_dir()
                    .context("Failed to resolve current directory")?
                    .join(path)
            };
            wiki.init(&path).await?;
            println!("Initialised wiki at {}", path.display());
        }
        Commands::Tree => {
            let tree = wiki.list().await?;
            println!("{}", serde_json::to_string_pretty(&tree)?);
        }
        Commands::Status => {
            let summary = wiki.status().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Pull => {
            wiki.pull().await?;
            println!("Pulled.");
        }
        Commands::Push => {
            wiki.push().await?;
            println!("Pushed.");
        }
        Commands::Fetch => {
            wiki.fetch().await?;
            println!("Fetched.");
        }
    }

    Ok(())
}
