//! Domain model types for sfauth.
//!
//! This module defines:
//! - [`OAuthConfig`] - Endpoints, client identifier, redirect URL and scopes
//! - Salesforce endpoint helpers ([`normalize_instance_url`], [`is_production_url`], [`is_sandbox_url`])
//! - [`mask`] - Masking for identifiers and tokens shown to the user

use serde::{Deserialize, Serialize};

/// Production login host.
pub const PRODUCTION_URL: &str = "https://login.salesforce.com";

/// Sandbox login host.
pub const SANDBOX_URL: &str = "https://test.salesforce.com";

/// Port of the pre-registered local callback.
pub const DEFAULT_CALLBACK_PORT: u16 = 8080;

/// Path of the local callback.
pub const CALLBACK_PATH: &str = "/callback";

/// Scopes requested during authorization.
pub const DEFAULT_SCOPES: &[&str] = &["api", "refresh_token", "offline_access"];

const AUTHORIZE_PATH: &str = "/services/oauth2/authorize";
const TOKEN_PATH: &str = "/services/oauth2/token";

/// OAuth client configuration for the Authorization Code grant.
///
/// The redirect URL must match the one registered for the client (a
/// Salesforce Connected App); a mismatch is rejected by the identity
/// provider during authorization, never locally.
///
/// # Example
///
/// ```
/// use sfauth_core::OAuthConfig;
///
/// let config = OAuthConfig::salesforce("mycompany.my.salesforce.com/", "3MVG9...");
/// assert_eq!(
///     config.token_url,
///     "https://mycompany.my.salesforce.com/services/oauth2/token"
/// );
/// assert_eq!(config.redirect_url, "http://localhost:8080/callback");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OAuthConfig {
    /// OAuth client identifier (the Connected App consumer key).
    pub client_id: String,

    /// OAuth authorization endpoint URL.
    pub auth_url: String,

    /// OAuth token endpoint URL.
    pub token_url: String,

    /// Pre-registered redirect URL served by the local callback listener.
    pub redirect_url: String,

    /// Scopes to request.
    pub scopes: Vec<String>,
}

impl OAuthConfig {
    /// Create a configuration with explicit endpoints and the default
    /// redirect URL and scopes.
    pub fn new(
        client_id: impl Into<String>,
        auth_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            auth_url: auth_url.into(),
            token_url: token_url.into(),
            redirect_url: redirect_url_for_port(DEFAULT_CALLBACK_PORT),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Configuration for a Salesforce instance.
    ///
    /// The instance URL is normalized first, see [`normalize_instance_url`].
    pub fn salesforce(instance_url: &str, client_id: impl Into<String>) -> Self {
        let instance = normalize_instance_url(instance_url);
        Self::new(
            client_id,
            format!("{}{}", instance, AUTHORIZE_PATH),
            format!("{}{}", instance, TOKEN_PATH),
        )
    }

    /// Set the redirect URL.
    pub fn with_redirect_url(mut self, url: impl Into<String>) -> Self {
        self.redirect_url = url.into();
        self
    }

    /// Set the scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }
}

/// The local redirect URL for a callback port.
pub fn redirect_url_for_port(port: u16) -> String {
    format!("http://localhost:{}{}", port, CALLBACK_PATH)
}

/// Normalize a Salesforce instance URL.
///
/// Surrounding whitespace is trimmed, `https://` is added when no scheme is
/// given, and a trailing slash is removed. Empty input stays empty.
pub fn normalize_instance_url(url: &str) -> String {
    let url = url.trim();
    if url.is_empty() {
        return String::new();
    }

    let url = if url.starts_with("http://") || url.starts_with("https://") {
        url.to_string()
    } else {
        format!("https://{}", url)
    };

    url.trim_end_matches('/').to_string()
}

/// Whether the URL is the production login host.
pub fn is_production_url(url: &str) -> bool {
    normalize_instance_url(url) == PRODUCTION_URL
}

/// Whether the URL is the sandbox login host.
pub fn is_sandbox_url(url: &str) -> bool {
    normalize_instance_url(url) == SANDBOX_URL
}

/// Mask a sensitive value for display.
///
/// Values longer than 8 characters keep their first and last 4 characters;
/// anything shorter is replaced entirely.
pub fn mask(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "********".to_string();
    }

    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}********{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_instance_url() {
        assert_eq!(
            normalize_instance_url("mycompany.my.salesforce.com"),
            "https://mycompany.my.salesforce.com"
        );
        assert_eq!(
            normalize_instance_url("  https://mycompany.my.salesforce.com/  "),
            "https://mycompany.my.salesforce.com"
        );
        assert_eq!(
            normalize_instance_url("http://localhost:6109/"),
            "http://localhost:6109"
        );
        assert_eq!(normalize_instance_url("   "), "");
    }

    #[test]
    fn test_salesforce_endpoints() {
        let config = OAuthConfig::salesforce("https://login.salesforce.com/", "client");

        assert_eq!(config.client_id, "client");
        assert_eq!(config.auth_url, "https://login.salesforce.com/services/oauth2/authorize");
        assert_eq!(config.token_url, "https://login.salesforce.com/services/oauth2/token");
        assert_eq!(config.redirect_url, "http://localhost:8080/callback");
        assert_eq!(config.scopes, vec!["api", "refresh_token", "offline_access"]);
    }

    #[test]
    fn test_with_redirect_url() {
        let config = OAuthConfig::salesforce("test.salesforce.com", "client")
            .with_redirect_url(redirect_url_for_port(1717));
        assert_eq!(config.redirect_url, "http://localhost:1717/callback");
    }

    #[test]
    fn test_production_and_sandbox_detection() {
        assert!(is_production_url("login.salesforce.com"));
        assert!(is_production_url("https://login.salesforce.com/"));
        assert!(!is_production_url("https://test.salesforce.com"));

        assert!(is_sandbox_url("https://test.salesforce.com"));
        assert!(!is_sandbox_url("https://mycompany--dev.sandbox.my.salesforce.com"));
    }

    #[test]
    fn test_mask() {
        assert_eq!(mask("3MVG9abcdefghijklmnop"), "3MVG********mnop");
        assert_eq!(mask("123456789"), "1234********6789");
        assert_eq!(mask("12345678"), "********");
        assert_eq!(mask(""), "********");
    }
}
