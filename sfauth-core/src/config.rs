//! Configuration file and directory handling.
//!
//! Everything lives in one per-user directory:
//!
//! | File          | Contents |
//! |---------------|----------|
//! | `config.toml` | instance URL, client ID, callback port, auth timeout |
//! | `token.json`  | file-fallback token store, also the legacy plaintext token |
//!
//! The directory is `$XDG_CONFIG_HOME/salesforce-cli` when `XDG_CONFIG_HOME`
//! is set and `~/.config/salesforce-cli` otherwise. Paths are resolved once
//! into a [`ConfigPaths`] value and passed down explicitly.

use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::model::{DEFAULT_CALLBACK_PORT, OAuthConfig, normalize_instance_url, redirect_url_for_port};
use crate::store::{create_private_dir, write_private_file};

/// Name of the configuration directory.
pub const DIR_NAME: &str = "salesforce-cli";

/// Name of the configuration file.
pub const CONFIG_FILE: &str = "config.toml";

/// Name of the token file.
pub const TOKEN_FILE: &str = "token.json";

/// Permission bits for the configuration directory.
pub const DIR_MODE: u32 = 0o700;

/// Permission bits for files in the configuration directory.
pub const FILE_MODE: u32 = 0o600;

/// Default deadline for the interactive authorization flow.
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 300;

/// Error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Neither `XDG_CONFIG_HOME` nor a home directory could be found.
    #[error("could not determine the configuration directory: no home directory found")]
    NoHomeDir,

    /// Reading or writing a configuration file failed.
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The configuration could not be serialized.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A required setting is missing.
    #[error("{0} is not configured; run `sfauth init` or set {1}")]
    Missing(&'static str, &'static str),
}

/// Resolved locations of the configuration directory and its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    dir: PathBuf,
    home: Option<PathBuf>,
}

impl ConfigPaths {
    /// Resolve the configuration directory from the process environment.
    pub fn discover() -> Result<Self, ConfigError> {
        let home = BaseDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        Self::discover_with(|key| std::env::var(key).ok(), home)
    }

    /// Resolve the configuration directory from an environment lookup and
    /// a home directory.
    pub fn discover_with(
        env: impl Fn(&str) -> Option<String>,
        home: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let config_home = match env("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
            Some(xdg) => PathBuf::from(xdg),
            None => home.as_ref().ok_or(ConfigError::NoHomeDir)?.join(".config"),
        };

        Ok(Self {
            dir: config_home.join(DIR_NAME),
            home,
        })
    }

    /// Use `dir` directly as the configuration directory.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            home: None,
        }
    }

    /// The configuration directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of `config.toml`.
    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    /// Path of `token.json`.
    pub fn token_path(&self) -> PathBuf {
        self.dir.join(TOKEN_FILE)
    }

    /// Create the configuration directory (owner access only) if missing.
    pub fn ensure_dir(&self) -> Result<(), ConfigError> {
        create_private_dir(&self.dir).map_err(|source| ConfigError::Io {
            path: self.dir.clone(),
            source,
        })
    }

    /// Replace the home directory prefix of `path` with `~` for display.
    pub fn shorten(&self, path: &Path) -> String {
        if let Some(home) = &self.home {
            if let Ok(rest) = path.strip_prefix(home) {
                if rest.as_os_str().is_empty() {
                    return "~".to_string();
                }
                return format!("~/{}", rest.display());
            }
        }
        path.display().to_string()
    }
}

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Salesforce instance URL (e.g. `https://mycompany.my.salesforce.com`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub instance_url: String,

    /// OAuth client ID (the Connected App consumer key).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub client_id: String,

    /// Local callback port; must match the registered redirect URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_port: Option<u16>,

    /// Deadline for the interactive authorization flow, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_timeout_secs: Option<u64>,
}

impl Config {
    /// Load the configuration file with environment overrides applied.
    ///
    /// `SFDC_*` variables take precedence over `SALESFORCE_*`, which take
    /// precedence over the file. A missing file yields an empty config.
    pub fn load(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        Self::load_with_env(paths, |key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with an injectable environment lookup.
    pub fn load_with_env(
        paths: &ConfigPaths,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(paths)?;

        let lookup = |primary: &str, fallback: &str| {
            env(primary)
                .filter(|v| !v.is_empty())
                .or_else(|| env(fallback).filter(|v| !v.is_empty()))
        };

        if let Some(url) = lookup("SFDC_INSTANCE_URL", "SALESFORCE_INSTANCE_URL") {
            config.instance_url = url;
        }
        if let Some(id) = lookup("SFDC_CLIENT_ID", "SALESFORCE_CLIENT_ID") {
            config.client_id = id;
        }

        Ok(config)
    }

    /// Read the configuration file only, without environment overrides.
    pub fn read_file(paths: &ConfigPaths) -> Result<Self, ConfigError> {
        let path = paths.config_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => return Err(ConfigError::Io { path, source }),
        };

        toml::from_str(&contents).map_err(|source| ConfigError::Parse { path, source })
    }

    /// Write the configuration file (owner read/write only).
    pub fn save(&self, paths: &ConfigPaths) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        let path = paths.config_path();

        write_private_file(&path, contents.as_bytes())
            .map_err(|source| ConfigError::Io { path, source })
    }

    /// Remove the configuration file. Succeeds if it does not exist.
    pub fn clear(paths: &ConfigPaths) -> Result<(), ConfigError> {
        let path = paths.config_path();
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }

    /// Whether both the instance URL and client ID are set.
    pub fn is_configured(&self) -> bool {
        !self.instance_url.is_empty() && !self.client_id.is_empty()
    }

    /// The normalized instance URL.
    pub fn instance_url(&self) -> String {
        normalize_instance_url(&self.instance_url)
    }

    /// The callback port, defaulting to 8080.
    pub fn callback_port(&self) -> u16 {
        self.callback_port.unwrap_or(DEFAULT_CALLBACK_PORT)
    }

    /// The authorization deadline, defaulting to five minutes.
    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs.unwrap_or(DEFAULT_AUTH_TIMEOUT_SECS))
    }

    /// OAuth configuration for the configured instance and client.
    pub fn oauth_config(&self) -> Result<OAuthConfig, ConfigError> {
        if self.instance_url.trim().is_empty() {
            return Err(ConfigError::Missing("instance URL", "SFDC_INSTANCE_URL"));
        }
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Missing("client ID", "SFDC_CLIENT_ID"));
        }

        Ok(OAuthConfig::salesforce(&self.instance_url, self.client_id.trim())
            .with_redirect_url(redirect_url_for_port(self.callback_port())))
    }
}
