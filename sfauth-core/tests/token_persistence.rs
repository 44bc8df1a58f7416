//! Integration tests for refreshing and persisting tokens.
//!
//! These tests verify that:
//! - Expired tokens are refreshed against the token endpoint
//! - Every refreshed token is written back to the credential store
//! - Unchanged tokens are never rewritten, even under concurrent use
//! - Refresh failures surface as classified errors

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sfauth_core::{
    Backend, CredentialStore, FallbackStore, FileStore, MemoryStore, OAuthConfig,
    PersistentTokenSource, RefreshingTokenSource, StoreError, TokenError, TokenRecord,
    TokenSource,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

/// Counts writes on top of another store.
struct CountingStore<S> {
    inner: S,
    sets: AtomicUsize,
}

impl<S> CountingStore<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            sets: AtomicUsize::new(0),
        }
    }

    fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<S: CredentialStore> CredentialStore for CountingStore<S> {
    async fn get(&self) -> Result<Option<TokenRecord>, StoreError> {
        self.inner.get().await
    }

    async fn set(&self, record: &TokenRecord) -> Result<(), StoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(record).await
    }

    async fn delete(&self) -> Result<(), StoreError> {
        self.inner.delete().await
    }

    fn backend(&self) -> Backend {
        self.inner.backend()
    }
}

/// Keeps every record written, in write order.
struct RecordingStore {
    inner: MemoryStore,
    writes: parking_lot::Mutex<Vec<TokenRecord>>,
}

#[async_trait]
impl CredentialStore for RecordingStore {
    async fn get(&self) -> Result<Option<TokenRecord>, StoreError> {
        self.inner.get().await
    }

    async fn set(&self, record: &TokenRecord) -> Result<(), StoreError> {
        self.writes.lock().push(record.clone());
        self.inner.set(record).await
    }

    async fn delete(&self) -> Result<(), StoreError> {
        self.inner.delete().await
    }

    fn backend(&self) -> Backend {
        self.inner.backend()
    }
}

fn oauth_config(server: &MockServer) -> OAuthConfig {
    OAuthConfig::salesforce(&server.uri(), "test-client-id")
}

async fn mount_refresh(server: &MockServer, access_token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old-refresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 7200,
            "instance_url": "https://mycompany.my.salesforce.com",
        })))
        .expect(expected_calls)
        .mount(server)
        .await;
}

fn expired_record() -> TokenRecord {
    TokenRecord::new("expired-access-token", "old-refresh-token")
        .with_expiry(Utc::now() - Duration::hours(1))
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_persisted_to_file() {
    let server = MockServer::start().await;
    mount_refresh(&server, "new-access-token", 1).await;

    let temp = TempDir::new().unwrap();
    let file = FileStore::new(temp.path().join("salesforce-cli").join("token.json"));
    let store = Arc::new(CountingStore::new(file));
    let stored = expired_record();
    store.inner.set(&stored).await.unwrap();

    let inner = RefreshingTokenSource::new(&oauth_config(&server), stored.clone()).unwrap();
    let source = PersistentTokenSource::with_last(inner, store.clone(), stored);

    let token = source.token().await.unwrap();

    assert_eq!(token.access_token.expose(), "new-access-token");
    // The endpoint did not rotate the refresh token, so the old one is kept.
    assert_eq!(token.refresh_token.expose(), "old-refresh-token");
    assert!(!token.is_expired());

    assert_eq!(store.sets(), 1);
    let reloaded = FileStore::new(temp.path().join("salesforce-cli").join("token.json"))
        .get()
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded, token);
}

#[tokio::test]
async fn test_refreshed_token_is_reused() {
    let server = MockServer::start().await;
    mount_refresh(&server, "new-access-token", 1).await;

    let store = Arc::new(CountingStore::new(MemoryStore::new(Backend::Keychain)));
    let stored = expired_record();

    let inner = RefreshingTokenSource::new(&oauth_config(&server), stored.clone()).unwrap();
    let source = PersistentTokenSource::with_last(inner, store.clone(), stored);

    let first = source.token().await.unwrap();
    let second = source.token().await.unwrap();
    let third = source.token().await.unwrap();

    assert_eq!(first, second);
    assert_eq!(second, third);
    assert_eq!(store.sets(), 1);
}

#[tokio::test]
async fn test_concurrent_calls_on_valid_token_do_not_persist() {
    let server = MockServer::start().await;
    mount_refresh(&server, "never-used", 0).await;

    let store = Arc::new(CountingStore::new(MemoryStore::new(Backend::SecretTool)));
    let valid = TokenRecord::new("valid-access-token", "old-refresh-token")
        .with_expiry(Utc::now() + Duration::hours(1));

    let inner = RefreshingTokenSource::new(&oauth_config(&server), valid.clone()).unwrap();
    let source = Arc::new(PersistentTokenSource::with_last(inner, store.clone(), valid.clone()));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let source = source.clone();
        handles.push(tokio::spawn(async move { source.token().await }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), valid);
    }

    assert_eq!(store.sets(), 0);
}

#[tokio::test]
async fn test_rotated_refresh_token_is_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "rotated-access-token",
            "refresh_token": "rotated-refresh-token",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(FallbackStore::new(vec![Arc::new(MemoryStore::new(Backend::Keychain))]));
    let stored = expired_record();
    let inner = RefreshingTokenSource::new(&oauth_config(&server), stored.clone()).unwrap();
    let source = PersistentTokenSource::with_last(inner, store.clone(), stored);

    source.token().await.unwrap();

    let persisted = store.get().await.unwrap().unwrap();
    assert_eq!(persisted.access_token.expose(), "rotated-access-token");
    assert_eq!(persisted.refresh_token.expose(), "rotated-refresh-token");
}

#[tokio::test]
async fn test_refresh_rejected_by_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": "invalid_grant",
            "error_description": "expired access/refresh token",
        })))
        .mount(&server)
        .await;

    let store = Arc::new(CountingStore::new(MemoryStore::new(Backend::Keychain)));
    let stored = expired_record();
    let inner = RefreshingTokenSource::new(&oauth_config(&server), stored.clone()).unwrap();
    let source = PersistentTokenSource::with_last(inner, store.clone(), stored);

    let err = source.token().await.unwrap_err();

    match err {
        TokenError::Rejected { error, description } => {
            assert_eq!(error, "invalid_grant");
            assert_eq!(description.as_deref(), Some("expired access/refresh token"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(store.sets(), 0);
}

#[tokio::test]
async fn test_concurrent_calls_on_expired_token() {
    const CALLERS: u64 = 16;

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/services/oauth2/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "access_token": "new-access-token",
                    "token_type": "Bearer",
                    "expires_in": 7200,
                }))
                .set_delay(std::time::Duration::from_millis(20)),
        )
        .expect(1..=CALLERS)
        .mount(&server)
        .await;

    let store = Arc::new(RecordingStore {
        inner: MemoryStore::new(Backend::Keychain),
        writes: parking_lot::Mutex::new(Vec::new()),
    });
    let stored = expired_record();
    store.inner.set(&stored).await.unwrap();

    let inner = RefreshingTokenSource::new(&oauth_config(&server), stored.clone()).unwrap();
    let source = Arc::new(PersistentTokenSource::with_last(inner, store.clone(), stored));

    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let source = source.clone();
        handles.push(tokio::spawn(async move { source.token().await }));
    }
    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token.access_token.expose(), "new-access-token");
        assert!(!token.is_expired());
    }

    let writes = store.writes.lock().clone();
    assert!(!writes.is_empty());
    assert!(writes.len() as u64 <= CALLERS);
    for pair in writes.windows(2) {
        assert!(pair[1].expiry >= pair[0].expiry, "an older token overwrote a newer one");
    }

    let persisted = store.get().await.unwrap().unwrap();
    assert_eq!(persisted.access_token.expose(), "new-access-token");
    assert_eq!(persisted.refresh_token.expose(), "old-refresh-token");
    assert_eq!(Some(&persisted), writes.last());
    assert!(!persisted.is_expired());
}
