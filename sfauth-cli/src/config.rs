//! `config` subcommands and token status.

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use sfauth_core::{
    Backend, Config, ConfigPaths, CredentialStore, TokenRecord, is_production_url,
    is_sandbox_url, mask,
};
use std::sync::Arc;

use crate::init::verify_connectivity;
use crate::prompt;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display current configuration and token storage
    Show,

    /// Verify authentication works against the Salesforce API
    Test,

    /// Remove stored credentials and configuration
    Clear {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

pub async fn run(command: ConfigCommand, paths: &ConfigPaths, store: Arc<dyn CredentialStore>) -> Result<()> {
    match command {
        ConfigCommand::Show => show(paths, store.as_ref()).await,
        ConfigCommand::Test => test(paths, store).await,
        ConfigCommand::Clear { force } => clear(paths, store.as_ref(), force).await,
    }
}

async fn show(paths: &ConfigPaths, store: &dyn CredentialStore) -> Result<()> {
    let config = Config::load(paths).context("failed to load configuration")?;

    println!("Salesforce CLI Configuration");
    println!("============================");
    println!();

    if config.instance_url.is_empty() {
        println!("Instance URL:    Not configured");
    } else {
        println!("Instance URL:    {}{}", config.instance_url, instance_kind(&config.instance_url));
    }

    if config.client_id.is_empty() {
        println!("Client ID:       Not configured");
    } else {
        println!("Client ID:       {}", mask(&config.client_id));
    }
    println!("Callback port:   {}", config.callback_port());
    println!();

    let backend = stored_in(store).await;
    match backend {
        Some(backend) => println!("Token:           Found (stored in {})", backend),
        None => println!("Token:           Not found"),
    }
    println!();

    println!("Config file:     {}", paths.shorten(&paths.config_path()));
    if backend == Some(Backend::File) {
        println!("Token file:      {}", paths.shorten(&paths.token_path()));
    }

    Ok(())
}

async fn test(paths: &ConfigPaths, store: Arc<dyn CredentialStore>) -> Result<()> {
    let config = Config::load(paths).context("failed to load configuration")?;
    if !config.is_configured() {
        bail!("not configured - please run 'sfauth init' first");
    }

    println!("Testing Salesforce connection...");
    println!();

    if stored_in(store.as_ref()).await.is_none() {
        println!("  Token:       NOT FOUND");
        bail!("no OAuth token found - please run 'sfauth init' first");
    }
    println!("  Token:       Found");

    verify_connectivity(&config, store).await?;

    println!();
    println!("Connection successful!");
    Ok(())
}

async fn clear(paths: &ConfigPaths, store: &dyn CredentialStore, force: bool) -> Result<()> {
    if !force && !prompt::confirm("This will remove all stored credentials. Continue?")? {
        println!("Cancelled.");
        return Ok(());
    }

    // An unreadable token still counts as something to remove.
    let had_token = store.has_stored_token().await.unwrap_or(true);
    let token_result = store.delete().await;

    let file = Config::read_file(paths).unwrap_or_default();
    let had_config = file != Config::default();
    let config_result = if had_config { Config::clear(paths) } else { Ok(()) };

    match &token_result {
        Err(e) => println!("Warning: failed to remove token: {}", e),
        Ok(()) if had_token => println!("Token removed."),
        Ok(()) => {}
    }
    match &config_result {
        Err(e) => println!("Warning: failed to clear config: {}", e),
        Ok(()) if had_config => println!("Configuration cleared."),
        Ok(()) => {}
    }

    if !had_token && !had_config {
        println!("Nothing to clear.");
    } else if token_result.is_ok() && config_result.is_ok() {
        println!();
        println!("All credentials cleared. Run 'sfauth init' to reconfigure.");
    }

    Ok(())
}

/// `sfauth token`: where the token lives and when it expires, without revealing it.
pub async fn token_status(paths: &ConfigPaths, store: &dyn CredentialStore) -> Result<()> {
    let Some(record) = store.get().await.context("failed to read stored token")? else {
        println!("Token:           Not found");
        println!();
        println!("Run 'sfauth init' to authenticate.");
        return Ok(());
    };

    let backend = store.active_backend().await;
    println!("Token:           Found (stored in {})", backend);
    for line in describe(&record) {
        println!("{}", line);
    }
    if backend == Backend::File {
        println!();
        println!("Token file:      {}", paths.shorten(&paths.token_path()));
    }

    Ok(())
}

/// Masked, display-ready lines describing a token record.
fn describe(record: &TokenRecord) -> Vec<String> {
    let refresh = if record.has_refresh_token() {
        record.refresh_token.masked()
    } else {
        "None".to_string()
    };

    let expiry = match record.expiry {
        None => "Never".to_string(),
        Some(at) if record.is_expired() => format!("{} (expired)", at.to_rfc3339()),
        Some(at) => at.to_rfc3339(),
    };

    vec![
        format!("Token type:      {}", record.token_type),
        format!("Access token:    {}", record.access_token.masked()),
        format!("Refresh token:   {}", refresh),
        format!("Expires:         {}", expiry),
    ]
}

/// The backend holding the token, or `None` when no token is stored.
async fn stored_in(store: &dyn CredentialStore) -> Option<Backend> {
    match store.has_stored_token().await {
        Ok(true) => Some(store.active_backend().await),
        Ok(false) => None,
        Err(e) => {
            tracing::debug!(error = %e, "could not check for a stored token");
            None
        }
    }
}

fn instance_kind(url: &str) -> &'static str {
    if is_production_url(url) {
        " (production)"
    } else if is_sandbox_url(url) {
        " (sandbox)"
    } else {
        ""
    }
}
