//! Top-level error types for sfauth.

use thiserror::Error;

use crate::config::ConfigError;
use crate::oauth::CallbackError;
use crate::store::StoreError;
use crate::token::TokenError;

/// Top-level error type encompassing all sfauth errors.
#[derive(Debug, Error)]
pub enum SfauthError {
    /// Error from credential storage operations.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error from token acquisition or refresh.
    #[error("token error: {0}")]
    Token(#[from] TokenError),

    /// Error from the authorization callback.
    #[error("{0}")]
    Callback(#[from] CallbackError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// HTTP transport error on an authenticated request.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an unexpected status.
    #[error("API returned status {status}")]
    Api { status: u16 },
}
