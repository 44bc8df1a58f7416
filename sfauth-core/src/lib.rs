//! # sfauth Core
//!
//! OAuth2 credential acquisition and token lifecycle for the Salesforce CLI.
//!
//! This crate provides:
//! - Authorization URL building and code exchange for the Authorization Code grant
//! - A local callback listener that races manual code entry under a deadline
//! - Credential storage with platform backends and a restricted-file fallback
//! - Token sources that refresh tokens and persist every refreshed token
//! - One-shot migration of a legacy plaintext token file, with secure erasure
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sfauth_core::{Config, ConfigPaths, FallbackStore, Session};
//!
//! async fn api_versions() -> Result<(), sfauth_core::SfauthError> {
//!     let paths = ConfigPaths::discover()?;
//!     let config = Config::load(&paths)?;
//!     let store = Arc::new(FallbackStore::platform_default(&paths));
//!
//!     let session = Session::load(&config, store).await?;
//!     session.verify().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod erase;
pub mod error;
pub mod migrate;
pub mod model;
pub mod oauth;
pub mod session;
pub mod store;
pub mod token;
pub mod token_source;

// Re-export commonly used types at crate root
pub use config::{
    Config,
    ConfigError,
    ConfigPaths,
};

pub use erase::secure_erase;

pub use error::SfauthError;

pub use migrate::{
    MigrationOutcome,
    migrate_legacy_token,
};

pub use model::{
    OAuthConfig,
    is_production_url,
    is_sandbox_url,
    mask,
    normalize_instance_url,
};

pub use oauth::{
    AuthorizationRequest,
    CallbackError,
    CallbackListener,
    CallbackResult,
    authorization_url,
    exchange_code,
    extract_auth_code,
};

pub use session::Session;

pub use store::{
    Backend,
    CredentialStore,
    FallbackStore,
    FileStore,
    MemoryStore,
    Secret,
    StoreError,
};

#[cfg(feature = "native-keyring")]
pub use store::KeyringStore;

pub use token::{
    TokenError,
    TokenRecord,
    TokenSource,
};

pub use token_source::{
    PersistentTokenSource,
    RefreshingTokenSource,
};
