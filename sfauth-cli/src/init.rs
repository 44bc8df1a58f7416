//! Guided OAuth setup.

use anyhow::{Context, Result, bail};
use clap::Args;
use sfauth_core::{
    CallbackListener, Config, ConfigPaths, CredentialStore, Session, authorization_url,
    exchange_code,
};
use sfauth_core::config::DEFAULT_AUTH_TIMEOUT_SECS;
use std::io::{self, BufReader, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::prompt;

const DEFAULT_INSTANCE: &str = "login.salesforce.com";

#[derive(Args, Debug, Default)]
pub struct InitArgs {
    /// Salesforce instance URL (e.g., login.salesforce.com)
    #[arg(long)]
    pub instance_url: Option<String>,

    /// Connected App consumer key
    #[arg(long)]
    pub client_id: Option<String>,

    /// Skip connectivity verification after setup
    #[arg(long)]
    pub no_verify: bool,

    /// Don't open the browser, just print the URL
    #[arg(long)]
    pub no_browser: bool,
}

pub async fn run(args: InitArgs, paths: &ConfigPaths, store: Arc<dyn CredentialStore>) -> Result<()> {
    println!("Checking existing configuration...");
    let current = Config::load(paths).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable configuration");
        Config::default()
    });

    let has_token = store.has_stored_token().await.unwrap_or_else(|e| {
        tracing::debug!(error = %e, "could not check for a stored token");
        false
    });

    if has_token {
        println!("Instance URL: {}", display_or(&current.instance_url, "Not configured"));
        let backend = store.active_backend().await;
        println!("Token:        Found (stored in {})", backend);

        if !args.no_verify {
            if verify_connectivity(&current, store.clone()).await.is_ok() {
                println!();
                println!("Already configured and working.");
                println!("Use 'sfauth config clear' to reset.");
                return Ok(());
            }

            println!();
            println!("Your OAuth token appears to be expired or revoked.");
            if !prompt::confirm("Would you like to re-authenticate?")? {
                println!("You can manually clear the token with: sfauth config clear");
                return Ok(());
            }

            println!("Clearing old token...");
            store.delete().await.context("failed to clear token")?;
        }
    } else {
        println!("Instance URL: Not configured");
        println!("Token:        Not found");
    }
    println!();

    let config = collect_settings(&args, paths, prompt::input)?;
    let oauth = config.oauth_config()?;
    let request = authorization_url(&oauth)?;

    println!();
    if args.no_browser {
        println!("Open this URL in your browser:");
    } else {
        println!("Opening browser for Salesforce login...");
        println!();
        println!("If browser doesn't open, visit:");
    }
    println!();
    println!("{}", request.url);
    println!();

    let deadline = auth_deadline(config.auth_timeout());
    let pending = CallbackListener::new(config.callback_port())
        .with_expected_state(request.state.clone())
        .start()
        .await?;

    if !args.no_browser && !open_browser(&request.url) {
        println!("Could not open browser.");
    }

    println!("Waiting for authorization...");
    println!("(Or paste the authorization code or full redirect URL below)");
    println!();
    print!("> ");
    io::stdout().flush()?;

    pending.spawn_manual_input(BufReader::new(io::stdin()));
    let code = pending.wait(deadline).await?.into_code()?;

    println!();
    println!("Exchanging authorization code for tokens...");
    let record = exchange_code(&oauth, &code)
        .await
        .context("failed to exchange authorization code")?;

    store.set(&record).await.context("failed to save token")?;
    let backend = store.active_backend().await;
    println!("Token saved to: {}", backend);

    if !args.no_verify {
        println!();
        verify_connectivity(&config, store).await?;
    }

    println!();
    println!("Setup complete! Run 'sfauth config test' at any time to check the connection.");
    Ok(())
}

/// Fill in the instance URL and client ID (flag, then saved value, then
/// `ask`) and save them.
///
/// Defaults come from the file alone, so environment overrides are never
/// written back.
fn collect_settings<F>(args: &InitArgs, paths: &ConfigPaths, mut ask: F) -> Result<Config>
where
    F: FnMut(&str, &str, &str) -> Result<String>,
{
    let mut config = Config::read_file(paths).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "ignoring unreadable configuration file");
        Config::default()
    });

    let instance_url = match &args.instance_url {
        Some(url) => url.clone(),
        None => ask(
            "Instance URL",
            "Production: login.salesforce.com | Sandbox: test.salesforce.com",
            display_or(&config.instance_url, DEFAULT_INSTANCE),
        )?,
    };

    let client_id = match &args.client_id {
        Some(id) => id.clone(),
        None => ask(
            "Client ID",
            "Connected App consumer key from Setup > App Manager",
            &config.client_id,
        )?,
    };
    if client_id.trim().is_empty() {
        bail!("client ID is required");
    }

    config.instance_url = instance_url.trim().to_string();
    config.client_id = client_id.trim().to_string();
    config.save(paths).context("failed to save configuration")?;

    Ok(config)
}

/// Deadline for the authorization race, falling back to the default
/// timeout when the configured one does not fit.
fn auth_deadline(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + Duration::from_secs(DEFAULT_AUTH_TIMEOUT_SECS))
}

/// Check the stored token against the REST API, reporting each step.
pub async fn verify_connectivity(config: &Config, store: Arc<dyn CredentialStore>) -> Result<()> {
    println!("Verifying Salesforce API connection...");

    let session = match Session::load(config, store).await {
        Ok(session) => {
            println!("  OAuth token: OK");
            session
        }
        Err(e) => {
            println!("  OAuth token: FAILED");
            return Err(e).context("failed to create client");
        }
    };

    match session.verify().await {
        Ok(()) => {
            println!("  API access:  OK");
            Ok(())
        }
        Err(e) => {
            println!("  API access:  FAILED");
            Err(e).context("failed to access Salesforce API")
        }
    }
}

fn display_or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.is_empty() { fallback } else { value }
}

/// Best-effort launch of the system browser.
fn open_browser(url: &str) -> bool {
    let mut command = if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut cmd = std::process::Command::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    } else {
        std::process::Command::new("xdg-open")
    };

    match command.arg(url).spawn() {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(error = %e, "failed to launch browser");
            false
        }
    }
}
