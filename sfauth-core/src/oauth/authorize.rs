//! Authorization URL building and token endpoint exchanges.
//!
//! # Flow Overview
//!
//! 1. Build the authorization URL with a random state
//! 2. User authorizes in the browser
//! 3. Receive the authorization code via the local redirect (see [`super::callback`])
//! 4. Exchange the code for a [`TokenRecord`]
//!
//! Exchanges are never retried: authorization codes are single-use, so a
//! failed exchange is reported straight back to the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use sfauth_core::OAuthConfig;
//! use sfauth_core::oauth::{authorization_url, exchange_code};
//!
//! let config = OAuthConfig::salesforce("https://login.salesforce.com", "3MVG9...");
//! let request = authorization_url(&config)?;
//! println!("Visit: {}", request.url);
//!
//! // After the user authorizes and you receive the code...
//! let record = exchange_code(&config, "aPrx...").await?;
//! # Ok(())
//! # }
//! ```

use oauth2::{AuthorizationCode, CsrfToken, RefreshToken, Scope, reqwest::async_http_client};

use super::{classify_token_error, create_oauth_client, generate_random_string, record_from_response};
use crate::model::OAuthConfig;
use crate::token::{TokenError, TokenRecord};

const STATE_LENGTH: usize = 32;

/// An authorization URL and the state it carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// URL the user opens in a browser.
    pub url: String,
    /// Opaque `state` value included in the URL.
    pub state: String,
}

/// Build the authorization URL for the user to visit.
///
/// The URL carries `client_id`, `redirect_uri`, `response_type=code`,
/// `access_type=offline`, the configured scopes and a random `state`.
pub fn authorization_url(config: &OAuthConfig) -> Result<AuthorizationRequest, TokenError> {
    let client = create_oauth_client(config)?;
    let state = generate_random_string(STATE_LENGTH);

    let csrf = state.clone();
    let mut request = client
        .authorize_url(move || CsrfToken::new(csrf))
        .add_extra_param("access_type", "offline");

    for scope in &config.scopes {
        request = request.add_scope(Scope::new(scope.clone()));
    }

    let (url, _) = request.url();

    Ok(AuthorizationRequest {
        url: url.to_string(),
        state,
    })
}

/// Exchange an authorization code for a token record.
pub async fn exchange_code(config: &OAuthConfig, code: &str) -> Result<TokenRecord, TokenError> {
    let client = create_oauth_client(config)?;

    let response = client
        .exchange_code(AuthorizationCode::new(code.to_string()))
        .request_async(async_http_client)
        .await
        .map_err(classify_token_error)?;

    tracing::debug!("authorization code exchanged for token");
    record_from_response(&response, None)
}

/// Exchange a refresh token for a new record.
///
/// If the endpoint does not rotate the refresh token, the old one is
/// carried over into the new record.
pub(crate) async fn exchange_refresh_token(
    client: &oauth2::basic::BasicClient,
    current: &TokenRecord,
) -> Result<TokenRecord, TokenError> {
    let response = client
        .exchange_refresh_token(&RefreshToken::new(current.refresh_token.expose().to_string()))
        .request_async(async_http_client)
        .await
        .map_err(classify_token_error)?;

    tracing::debug!("access token refreshed");
    record_from_response(&response, Some(&current.refresh_token))
}
