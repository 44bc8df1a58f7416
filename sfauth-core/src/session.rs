//! Authenticated HTTP access built from stored credentials.

use reqwest::StatusCode;
use std::sync::Arc;

use crate::config::Config;
use crate::error::SfauthError;
use crate::model::{OAuthConfig, normalize_instance_url};
use crate::store::CredentialStore;
use crate::token::{TokenError, TokenRecord, TokenSource};
use crate::token_source::{PersistentTokenSource, RefreshingTokenSource};

/// Path listing the available REST API versions; any valid token may read it.
const API_VERSIONS_PATH: &str = "/services/data/";

/// An HTTP client that attaches a valid bearer token to each request.
///
/// Tokens are refreshed on demand and every refreshed token is written
/// back to the credential store.
pub struct Session {
    http: reqwest::Client,
    instance_url: String,
    source: PersistentTokenSource<RefreshingTokenSource>,
}

impl Session {
    /// Build a session from the configuration and the stored token.
    ///
    /// Fails with [`TokenError::NotFound`] when no token is stored.
    pub async fn load(config: &Config, store: Arc<dyn CredentialStore>) -> Result<Self, SfauthError> {
        let oauth = config.oauth_config()?;
        let record = store.get().await?.ok_or(TokenError::NotFound)?;

        Ok(Self::new(&oauth, &config.instance_url, record, store)?)
    }

    /// Build a session from explicit parts.
    pub fn new(
        oauth: &OAuthConfig,
        instance_url: &str,
        record: TokenRecord,
        store: Arc<dyn CredentialStore>,
    ) -> Result<Self, TokenError> {
        let inner = RefreshingTokenSource::new(oauth, record.clone())?;

        Ok(Self {
            http: reqwest::Client::new(),
            instance_url: normalize_instance_url(instance_url),
            source: PersistentTokenSource::with_last(inner, store, record),
        })
    }

    /// The normalized instance URL.
    pub fn instance_url(&self) -> &str {
        &self.instance_url
    }

    /// A currently valid token, refreshed and persisted if needed.
    pub async fn token(&self) -> Result<TokenRecord, TokenError> {
        self.source.token().await
    }

    /// Send an authenticated GET request.
    pub async fn get(&self, url: &str) -> Result<reqwest::Response, SfauthError> {
        let token = self.token().await?;

        let response = self
            .http
            .get(url)
            .bearer_auth(token.access_token.expose())
            .send()
            .await?;

        Ok(response)
    }

    /// Check that the token is accepted by the instance's REST API.
    pub async fn verify(&self) -> Result<(), SfauthError> {
        let url = format!("{}{}", self.instance_url.trim_end_matches('/'), API_VERSIONS_PATH);
        let response = self.get(&url).await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(SfauthError::Api {
                status: status.as_u16(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Backend, MemoryStore};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config_for(uri: &str) -> Config {
        Config {
            instance_url: uri.to_string(),
            client_id: "client".to_string(),
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn test_load_without_token() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::new(Backend::File));
        let result = Session::load(&config_for("https://login.salesforce.com"), store).await;

        assert!(matches!(result, Err(SfauthError::Token(TokenError::NotFound))));
    }

    #[tokio::test]
    async fn test_load_without_config() {
        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::with_record(
            Backend::File,
            TokenRecord::new("a", "r"),
        ));
        let result = Session::load(&Config::default(), store).await;

        assert!(matches!(result, Err(SfauthError::Config(_))));
    }

    #[tokio::test]
    async fn test_verify_sends_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/data/"))
            .and(header("authorization", "Bearer 00Dxx!valid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"label": "Winter '25", "url": "/services/data/v62.0", "version": "62.0"}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::with_record(
            Backend::Keychain,
            TokenRecord::new("00Dxx!valid", "refresh"),
        ));
        let session = Session::load(&config_for(&server.uri()), store).await.unwrap();

        session.verify().await.unwrap();
    }

    #[tokio::test]
    async fn test_verify_rejected_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services/data/"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!([
                {"message": "Session expired or invalid", "errorCode": "INVALID_SESSION_ID"}
            ])))
            .mount(&server)
            .await;

        let store: Arc<dyn CredentialStore> = Arc::new(MemoryStore::with_record(
            Backend::Keychain,
            TokenRecord::new("revoked", "refresh"),
        ));
        let session = Session::load(&config_for(&server.uri()), store).await.unwrap();

        assert!(matches!(
            session.verify().await,
            Err(SfauthError::Api { status: 401 })
        ));
    }
}
