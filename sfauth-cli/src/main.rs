//! sfauth CLI
//!
//! Command-line interface for Salesforce OAuth setup and credential management.
//!
//! # Usage
//!
//! ```bash
//! # Guided OAuth setup (opens the browser)
//! sfauth init --instance-url mycompany.my.salesforce.com --client-id 3MVG9...
//!
//! # Show configuration and where the token is stored
//! sfauth config show
//!
//! # Verify the stored token against the API
//! sfauth config test
//!
//! # Remove the stored token and configuration
//! sfauth config clear --force
//! ```

mod config;
mod init;
mod prompt;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sfauth_core::{ConfigPaths, FallbackStore, MigrationOutcome, migrate_legacy_token};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sfauth")]
#[command(about = "Salesforce OAuth setup and credential management")]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Set up Salesforce authentication
    ///
    /// Prerequisites: a Connected App with OAuth enabled, callback URL
    /// http://localhost:8080/callback and the scopes api, refresh_token
    /// and offline_access.
    Init(init::InitArgs),

    /// Manage configuration
    #[command(subcommand)]
    Config(config::ConfigCommand),

    /// Show the stored token status
    Token,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let paths = ConfigPaths::discover().context("failed to locate the configuration directory")?;
    let store = Arc::new(FallbackStore::platform_default(&paths));

    migrate_token_file(&paths, &store).await;

    match cli.command {
        Commands::Init(args) => init::run(args, &paths, store).await,
        Commands::Config(command) => config::run(command, &paths, store).await,
        Commands::Token => config::token_status(&paths, store.as_ref()).await,
    }
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`, `debug` with `--verbose`).
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Promote a plaintext token file left by an older release into secure storage.
async fn migrate_token_file(paths: &ConfigPaths, store: &FallbackStore) {
    match migrate_legacy_token(&paths.token_path(), &store.secure_only()).await {
        Ok(MigrationOutcome::Migrated { erased: true }) => {
            eprintln!("Migrated token to secure storage; the old token file was securely deleted.");
        }
        Ok(MigrationOutcome::Migrated { erased: false }) => {
            eprintln!(
                "Migrated token to secure storage, but could not delete {}. Remove it manually.",
                paths.shorten(&paths.token_path())
            );
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "token migration failed"),
    }
}
