//! OAuth 2.0 Authorization Code flow.
//!
//! This module provides:
//! - [`authorize`] - Authorization URL building, code exchange and refresh
//! - [`callback`] - Local callback listener racing manual code entry
//!
//! Both halves share [`create_oauth_client`], so the redirect URL sent in
//! the authorization request is exactly the one sent with the code.

pub mod authorize;
pub mod callback;

use oauth2::basic::{BasicClient, BasicErrorResponse, BasicTokenResponse, BasicTokenType};
use oauth2::{AuthUrl, ClientId, RedirectUrl, RequestTokenError, TokenResponse, TokenUrl};

use crate::model::OAuthConfig;
use crate::store::Secret;
use crate::token::{TokenError, TokenRecord};

pub use authorize::{AuthorizationRequest, authorization_url, exchange_code};
pub use callback::{CallbackError, CallbackListener, CallbackResult, PendingCallback, extract_auth_code};

/// Create an OAuth2 client from a configuration.
///
/// The client is public (no client secret); the client ID travels in the
/// token request body.
pub fn create_oauth_client(config: &OAuthConfig) -> Result<BasicClient, TokenError> {
    let auth_url = AuthUrl::new(config.auth_url.clone())
        .map_err(|e| TokenError::OAuth(format!("invalid auth URL: {}", e)))?;

    let token_url = TokenUrl::new(config.token_url.clone())
        .map_err(|e| TokenError::OAuth(format!("invalid token URL: {}", e)))?;

    let redirect_url = RedirectUrl::new(config.redirect_url.clone())
        .map_err(|e| TokenError::OAuth(format!("invalid redirect URL: {}", e)))?;

    Ok(BasicClient::new(
        ClientId::new(config.client_id.clone()),
        None,
        auth_url,
        Some(token_url),
    )
    .set_redirect_uri(redirect_url))
}

/// Generate a random alphanumeric string of the specified length.
///
/// Used for the `state` parameter of authorization requests.
pub fn generate_random_string(length: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
    let mut rng = rand::thread_rng();

    (0..length)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Convert a token endpoint response into a record.
///
/// `previous_refresh` is kept when the response carries no new refresh
/// token, which is how refresh-token grants usually answer.
pub(crate) fn record_from_response(
    response: &BasicTokenResponse,
    previous_refresh: Option<&Secret>,
) -> Result<TokenRecord, TokenError> {
    let token_type = match response.token_type() {
        BasicTokenType::Bearer => "Bearer".to_string(),
        BasicTokenType::Mac => "mac".to_string(),
        BasicTokenType::Extension(other) => other.clone(),
    };

    let refresh_token = match response.refresh_token() {
        Some(token) => Secret::new(token.secret().as_str()),
        None => previous_refresh.cloned().unwrap_or_default(),
    };

    let mut record = TokenRecord {
        access_token: Secret::new(response.access_token().secret().as_str()),
        refresh_token,
        token_type,
        expiry: None,
    };

    if let Some(duration) = response.expires_in() {
        let expires_in = chrono::Duration::from_std(duration)
            .map_err(|e| TokenError::Parse(format!("invalid expiration duration: {}", e)))?;
        record.expiry = Some(chrono::Utc::now() + expires_in);
    }

    Ok(record)
}

/// Classify a failed token request.
pub(crate) fn classify_token_error<RE>(error: RequestTokenError<RE, BasicErrorResponse>) -> TokenError
where
    RE: std::error::Error + 'static,
{
    match error {
        RequestTokenError::ServerResponse(response) => TokenError::Rejected {
            error: response.error().as_ref().to_string(),
            description: response.error_description().cloned(),
        },
        RequestTokenError::Request(e) => TokenError::Network(e.to_string()),
        // The body may hold a usable token, so only the failing field is reported.
        RequestTokenError::Parse(e, body) => TokenError::Parse(format!(
            "malformed token response at `{}` ({} bytes)",
            e.path(),
            body.len()
        )),
        RequestTokenError::Other(message) => TokenError::OAuth(message),
    }
}
