//! Token sources that refresh and persist tokens.
//!
//! This module provides:
//! - [`RefreshingTokenSource`] - Hands out the current token, exchanging the
//!   refresh token when it is about to expire
//! - [`PersistentTokenSource`] - Decorator that writes every new token it
//!   sees back to a [`CredentialStore`]
//!
//! # Example
//!
//! ```rust,ignore
//! use sfauth_core::{PersistentTokenSource, RefreshingTokenSource, TokenSource};
//!
//! let inner = RefreshingTokenSource::new(&oauth_config, stored.clone())?;
//! let source = PersistentTokenSource::with_last(inner, store, stored);
//!
//! let token = source.token().await?;
//! // Use token.access_token.expose() for API calls
//! ```

use async_trait::async_trait;
use chrono::Duration;
use oauth2::basic::BasicClient;
use parking_lot::Mutex;
use std::sync::Arc;

use crate::model::OAuthConfig;
use crate::oauth::authorize::exchange_refresh_token;
use crate::oauth::create_oauth_client;
use crate::store::CredentialStore;
use crate::token::{TokenError, TokenRecord, TokenSource};

/// Default expiry buffer in seconds.
///
/// Tokens expiring within this window are refreshed before use.
const DEFAULT_EXPIRY_BUFFER_SECS: i64 = 10;

/// Token source backed by the refresh-token grant.
///
/// The current token is handed out until it comes within the expiry buffer
/// of its expiry, then the refresh token is exchanged for a new one.
/// Tokens without an expiry are never refreshed. Concurrent callers that
/// all see an expiring token may each refresh; the provider tolerates the
/// duplicate requests.
pub struct RefreshingTokenSource {
    client: BasicClient,
    current: Mutex<TokenRecord>,
    expiry_buffer: Duration,
}

impl RefreshingTokenSource {
    /// Create a source starting from `initial`.
    pub fn new(config: &OAuthConfig, initial: TokenRecord) -> Result<Self, TokenError> {
        Ok(Self {
            client: create_oauth_client(config)?,
            current: Mutex::new(initial),
            expiry_buffer: Duration::seconds(DEFAULT_EXPIRY_BUFFER_SECS),
        })
    }

    /// Use a custom expiry buffer.
    pub fn with_expiry_buffer(mut self, buffer: Duration) -> Self {
        self.expiry_buffer = buffer;
        self
    }

    /// The token currently held, without refreshing.
    pub fn current(&self) -> TokenRecord {
        self.current.lock().clone()
    }

    fn needs_refresh(&self, token: &TokenRecord) -> bool {
        token.expires_within(self.expiry_buffer)
    }
}

impl std::fmt::Debug for RefreshingTokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshingTokenSource")
            .field("current", &*self.current.lock())
            .field("expiry_buffer", &self.expiry_buffer)
            .finish()
    }
}

#[async_trait]
impl TokenSource for RefreshingTokenSource {
    async fn token(&self) -> Result<TokenRecord, TokenError> {
        let current = self.current();
        if !self.needs_refresh(&current) {
            return Ok(current);
        }

        if !current.has_refresh_token() {
            return Err(TokenError::Expired);
        }

        tracing::debug!(expiry = ?current.expiry, "access token expiring, refreshing");
        let refreshed = exchange_refresh_token(&self.client, &current).await?;
        *self.current.lock() = refreshed.clone();

        Ok(refreshed)
    }
}

/// Decorator that persists every new token the inner source returns.
///
/// Each call delegates to the inner source, compares the result with the
/// last token this decorator saw, and if it differs writes it to the store
/// before returning it. The compare and the write happen under one lock, so
/// concurrent callers cannot interleave and let an older token overwrite a
/// newer one. The cached copy only detects change; the store stays the
/// source of truth.
pub struct PersistentTokenSource<S> {
    inner: S,
    store: Arc<dyn CredentialStore>,
    last: tokio::sync::Mutex<Option<TokenRecord>>,
}

impl<S: TokenSource> PersistentTokenSource<S> {
    /// Wrap `inner`. The first token it returns is always persisted.
    pub fn new(inner: S, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            inner,
            store,
            last: tokio::sync::Mutex::new(None),
        }
    }

    /// Wrap `inner`, treating `last` as already persisted.
    pub fn with_last(inner: S, store: Arc<dyn CredentialStore>, last: TokenRecord) -> Self {
        Self {
            inner,
            store,
            last: tokio::sync::Mutex::new(Some(last)),
        }
    }

    /// The wrapped source.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

/// Whether `candidate` is known to be older than `last`.
fn is_older(candidate: &TokenRecord, last: &TokenRecord) -> bool {
    match (candidate.expiry, last.expiry) {
        (Some(new), Some(old)) => new < old,
        _ => false,
    }
}

#[async_trait]
impl<S: TokenSource> TokenSource for PersistentTokenSource<S> {
    async fn token(&self) -> Result<TokenRecord, TokenError> {
        let token = self.inner.token().await?;

        let mut last = self.last.lock().await;
        if last.as_ref() == Some(&token) {
            return Ok(token);
        }

        if let Some(previous) = last.as_ref() {
            if is_older(&token, previous) {
                tracing::debug!("inner source returned an older token, not persisting");
                return Ok(token);
            }
        }

        match self.store.set(&token).await {
            Ok(()) => {
                let backend = self.store.active_backend().await;
                tracing::info!(backend = %backend, "persisted refreshed token");
                *last = Some(token.clone());
            }
            Err(e) => {
                // Leave `last` alone so the next call tries again.
                tracing::warn!(error = %e, "failed to persist refreshed token");
            }
        }

        Ok(token)
    }
}
