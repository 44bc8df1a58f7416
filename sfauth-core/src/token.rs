//! Token types for OAuth API access.
//!
//! This module provides:
//! - [`TokenRecord`] - The access/refresh token pair with type and expiry
//! - [`TokenError`] - Errors from acquiring, exchanging and refreshing tokens
//! - [`TokenSource`] - Trait for anything that can hand out a valid token

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::store::{Secret, StoreError};

/// Error type for token operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// No token is stored in any backend.
    #[error("no stored OAuth token found; run `sfauth init` to authenticate")]
    NotFound,

    /// The access token expired and there is no refresh token to renew it.
    #[error("access token expired and no refresh token is available; run `sfauth init` to re-authenticate")]
    Expired,

    /// The token endpoint answered with an OAuth error body.
    #[error("token request rejected: {}", format_rejection(.error, .description.as_deref()))]
    Rejected {
        error: String,
        description: Option<String>,
    },

    /// Transport failure talking to the token endpoint.
    #[error("network error: {0}")]
    Network(String),

    /// The token endpoint returned a body that could not be understood.
    #[error("unexpected token response: {0}")]
    Parse(String),

    /// Any other OAuth failure (invalid URLs, malformed configuration).
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// Storage error while loading or persisting a token.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),
}

fn format_rejection(error: &str, description: Option<&str>) -> String {
    match description {
        Some(desc) if !desc.is_empty() => format!("{}: {}", error, desc),
        _ => error.to_string(),
    }
}

/// An OAuth token pair.
///
/// Records are immutable values: a refresh produces a new record that
/// replaces the old one wholesale. Both token fields are [`Secret`]s so a
/// record can be debug-printed without leaking credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// The access token presented on API requests.
    pub access_token: Secret,

    /// The refresh token (empty if the provider did not issue one).
    #[serde(default)]
    pub refresh_token: Secret,

    /// Token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// When the access token expires (None if unknown or non-expiring).
    #[serde(default, deserialize_with = "deserialize_expiry")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Accepts null, an RFC 3339 timestamp, or the zero timestamp
/// `0001-01-01T00:00:00Z` written by older tools for "no expiry".
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let expiry = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(expiry.filter(|t| t.year() > 1))
}

impl TokenRecord {
    /// Create a bearer token record without an expiry.
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: Secret::new(access_token),
            refresh_token: Secret::new(refresh_token),
            token_type: default_token_type(),
            expiry: None,
        }
    }

    /// Set the expiration time.
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Set the token type.
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    /// Whether a refresh token is available.
    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.is_empty()
    }

    /// Check if this token has expired.
    ///
    /// Returns `false` if no expiration is set.
    pub fn is_expired(&self) -> bool {
        self.expiry.map(|exp| exp < Utc::now()).unwrap_or(false)
    }

    /// Check if this token will expire within the given duration.
    pub fn expires_within(&self, duration: chrono::Duration) -> bool {
        self.expiry
            .map(|exp| exp < Utc::now() + duration)
            .unwrap_or(false)
    }
}

/// Something that can produce a currently valid token.
///
/// Implementations may refresh behind the scenes; callers should ask for a
/// token before every request instead of holding on to one.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Return a valid token, refreshing it if necessary.
    async fn token(&self) -> Result<TokenRecord, TokenError>;
}
