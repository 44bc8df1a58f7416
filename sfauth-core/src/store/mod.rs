//! Credential storage abstraction.
//!
//! This module provides:
//! - [`Secret`] - A wrapper for sensitive values that prevents accidental logging
//! - [`CredentialStore`] - Trait for token storage backends
//! - [`Backend`] - The fixed set of backend identifiers shown to users
//! - [`FallbackStore`] - Ordered chain of backends with automatic fallback
//! - [`KeychainStore`], [`SecretToolStore`], [`FileStore`], [`MemoryStore`] - Backends
//!
//! # Backend Order
//!
//! | Platform | Order |
//! |----------|-------|
//! | macOS    | Keychain (`security`), config file |
//! | Linux    | secret-tool (libsecret), config file |
//! | other    | config file |
//!
//! With the `native-keyring` feature the platform tool is replaced by the
//! `keyring` crate; the identifiers stay the same.
//!
//! # Example
//!
//! ```rust,ignore
//! use sfauth_core::store::{CredentialStore, FallbackStore};
//!
//! let store = FallbackStore::platform_default(&paths);
//! store.set(&record).await?;
//! println!("Token saved to: {}", store.active_backend().await);
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::config::ConfigPaths;
use crate::model::mask;
use crate::token::TokenRecord;

mod file;
mod keychain;
mod memory;
mod process;
mod secret_tool;
#[cfg(feature = "native-keyring")]
mod keyring;

pub use file::FileStore;
pub(crate) use file::{create_private_dir, write_private_file};
pub use keychain::KeychainStore;
pub use memory::MemoryStore;
pub use secret_tool::SecretToolStore;
#[cfg(feature = "native-keyring")]
pub use keyring::KeyringStore;

/// Service name under which the token is filed in platform secret managers.
pub const SERVICE_NAME: &str = "salesforce-cli";

/// Account name under which the token is filed in platform secret managers.
pub const TOKEN_KEY: &str = "oauth_token";

/// A secret value that prevents accidental exposure in logs.
///
/// The inner value is only accessible via [`expose()`](Secret::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed when dropped.
#[derive(Clone, Default, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    /// Create a new secret from a string value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the secret value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret holds no value.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Masked form safe for user-facing output (first and last 4 characters).
    pub fn masked(&self) -> String {
        mask(&self.0)
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED])")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Secret {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Secret {}

/// Identifier of a storage backend, as surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// macOS Keychain (or the native keyring on non-Linux platforms).
    Keychain,
    /// Linux Secret Service via libsecret's `secret-tool`.
    SecretTool,
    /// Restricted-permission JSON file in the config directory.
    File,
}

impl Backend {
    /// The fixed user-facing name of this backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Keychain => "Keychain",
            Backend::SecretTool => "secret-tool",
            Backend::File => "config file",
        }
    }

    /// Whether this backend is an encrypted platform store rather than a plain file.
    pub fn is_secure(&self) -> bool {
        matches!(self, Backend::Keychain | Backend::SecretTool)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for credential store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend cannot be used on this system (tool missing, daemon not running).
    #[error("{backend} not available: {message}")]
    Unavailable { backend: Backend, message: String },

    /// The backend was reachable but the operation failed.
    #[error("{backend} error: {message}")]
    Backend { backend: Backend, message: String },

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store has no backends configured.
    #[error("no storage backend configured")]
    NoBackend,
}

impl StoreError {
    /// Whether this error means the backend is absent rather than broken.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }
}

/// Storage for the single OAuth token of this CLI.
///
/// `get` returns `Ok(None)` when no token is stored; that is the
/// not-found sentinel, distinct from an operational error.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Retrieve the stored token, if any.
    async fn get(&self) -> Result<Option<TokenRecord>, StoreError>;

    /// Store a token, replacing any existing one.
    async fn set(&self, record: &TokenRecord) -> Result<(), StoreError>;

    /// Delete the stored token.
    ///
    /// Returns `Ok(())` even if nothing was stored.
    async fn delete(&self) -> Result<(), StoreError>;

    /// The backend this store writes to first.
    fn backend(&self) -> Backend;

    /// The backend that currently holds the token.
    async fn active_backend(&self) -> Backend {
        self.backend()
    }

    /// Check if a token exists without handing it to the caller.
    async fn has_stored_token(&self) -> Result<bool, StoreError> {
        Ok(self.get().await?.is_some())
    }
}

/// Ordered chain of backends with automatic fallback.
///
/// Backends are tried in order on every call; nothing about backend
/// health is cached, so a backend that starts failing mid-session is
/// skipped on the next call.
///
/// - Reads return the first record found. Read errors from any backend but
///   the last are logged and skipped.
/// - Writes go to the first backend that accepts them. Every other backend
///   is then cleared, so a stale copy can neither shadow the new record nor
///   linger in a lower-priority backend.
/// - Deletes go to every backend.
pub struct FallbackStore {
    backends: Vec<Arc<dyn CredentialStore>>,
}

impl FallbackStore {
    /// Create a chain from backends in preference order.
    pub fn new(backends: Vec<Arc<dyn CredentialStore>>) -> Self {
        Self { backends }
    }

    /// The platform's preference order, ending with the file fallback.
    pub fn platform_default(paths: &ConfigPaths) -> Self {
        let mut backends: Vec<Arc<dyn CredentialStore>> = Vec::new();

        #[cfg(feature = "native-keyring")]
        backends.push(Arc::new(KeyringStore::new(SERVICE_NAME, TOKEN_KEY)));

        #[cfg(not(feature = "native-keyring"))]
        if cfg!(target_os = "macos") {
            backends.push(Arc::new(KeychainStore::new(SERVICE_NAME, TOKEN_KEY)));
        } else if cfg!(target_os = "linux") {
            backends.push(Arc::new(SecretToolStore::new(SERVICE_NAME, TOKEN_KEY)));
        }

        backends.push(Arc::new(FileStore::new(paths.token_path())));
        Self::new(backends)
    }

    /// A chain holding only the encrypted platform backends.
    ///
    /// Used when promoting a plaintext token, so the write can never land
    /// back in the file it is migrating away from.
    pub fn secure_only(&self) -> Self {
        Self::new(
            self.backends
                .iter()
                .filter(|b| b.backend().is_secure())
                .cloned()
                .collect(),
        )
    }

    /// Whether the chain has no backends.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Whether the token currently lives in an encrypted backend.
    pub async fn is_secure(&self) -> bool {
        self.active_backend().await.is_secure()
    }
}

impl fmt::Debug for FallbackStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.backends.iter().map(|b| b.backend().as_str()).collect();
        f.debug_struct("FallbackStore")
            .field("backends", &names)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for FallbackStore {
    async fn get(&self) -> Result<Option<TokenRecord>, StoreError> {
        let last = self.backends.len().saturating_sub(1);

        for (idx, store) in self.backends.iter().enumerate() {
            match store.get().await {
                Ok(Some(record)) => {
                    tracing::debug!(backend = %store.backend(), "token found");
                    return Ok(Some(record));
                }
                Ok(None) => continue,
                Err(e) if idx == last => return Err(e),
                Err(e) if e.is_unavailable() => {
                    tracing::debug!(backend = %store.backend(), error = %e, "skipping backend");
                }
                Err(e) => {
                    tracing::warn!(backend = %store.backend(), error = %e, "failed to read token, trying next backend");
                }
            }
        }

        Ok(None)
    }

    async fn set(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let mut last_error = None;

        for (idx, store) in self.backends.iter().enumerate() {
            match store.set(record).await {
                Ok(()) => {
                    let others = self.backends[..idx].iter().chain(&self.backends[idx + 1..]);
                    for stale in others {
                        if let Err(e) = stale.delete().await {
                            tracing::warn!(backend = %stale.backend(), error = %e, "could not clear stale token");
                        }
                    }
                    tracing::debug!(backend = %store.backend(), "token stored");
                    return Ok(());
                }
                Err(e) if e.is_unavailable() => {
                    tracing::debug!(backend = %store.backend(), error = %e, "skipping backend");
                    last_error = Some(e);
                }
                Err(e) => {
                    tracing::warn!(backend = %store.backend(), error = %e, "failed to store token, falling back to next backend");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(StoreError::NoBackend))
    }

    async fn delete(&self) -> Result<(), StoreError> {
        let mut first_error = None;
        let mut any_succeeded = false;

        for store in &self.backends {
            match store.delete().await {
                Ok(()) => any_succeeded = true,
                Err(e) => {
                    tracing::debug!(backend = %store.backend(), error = %e, "failed to delete token");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) if !any_succeeded => Err(e),
            _ => Ok(()),
        }
    }

    fn backend(&self) -> Backend {
        self.backends
            .first()
            .map(|b| b.backend())
            .unwrap_or(Backend::File)
    }

    async fn active_backend(&self) -> Backend {
        for store in &self.backends {
            if let Ok(Some(_)) = store.get().await {
                return store.backend();
            }
        }
        self.backend()
    }
}
