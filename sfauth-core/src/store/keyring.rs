//! OS keyring-backed credential storage implementation.

use async_trait::async_trait;
use keyring::Entry;

use super::{Backend, CredentialStore, StoreError};
use crate::token::TokenRecord;

/// OS keyring-backed credential store.
///
/// This store uses the platform's native keyring service through the
/// `keyring` crate instead of shelling out:
/// - macOS: Keychain
/// - Linux: Secret Service API (via libsecret)
/// - Windows: Credential Manager
///
/// The token is stored as JSON under `service`/`account`, the same
/// coordinates the command-line backends use.
pub struct KeyringStore {
    service: String,
    account: String,
}

impl KeyringStore {
    /// Create a store for the given service and account.
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry, StoreError> {
        Entry::new(&self.service, &self.account).map_err(|e| StoreError::Unavailable {
            backend: self.backend(),
            message: format!("keyring backend not available: {}", e),
        })
    }

    fn failure(&self, action: &str, error: keyring::Error) -> StoreError {
        match error {
            keyring::Error::NoStorageAccess(e) => StoreError::Unavailable {
                backend: self.backend(),
                message: format!("no access to keyring: {}", e),
            },
            keyring::Error::PlatformFailure(e) => StoreError::Backend {
                backend: self.backend(),
                message: format!("platform keyring failure while trying to {}: {}", action, e),
            },
            e => StoreError::Backend {
                backend: self.backend(),
                message: format!("failed to {} keyring entry: {}", action, e),
            },
        }
    }
}

impl std::fmt::Debug for KeyringStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringStore")
            .field("service", &self.service)
            .field("account", &self.account)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for KeyringStore {
    async fn get(&self) -> Result<Option<TokenRecord>, StoreError> {
        let entry = self.entry()?;

        match entry.get_password() {
            Ok(password) => {
                let password = zeroize::Zeroizing::new(password);
                Ok(Some(serde_json::from_str(&password)?))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(self.failure("read", e)),
        }
    }

    async fn set(&self, record: &TokenRecord) -> Result<(), StoreError> {
        let data = zeroize::Zeroizing::new(serde_json::to_string(record)?);

        self.entry()?
            .set_password(&data)
            .map_err(|e| self.failure("store", e))?;

        // Read back through a fresh entry: a credential builder without
        // persistence accepts the write and then forgets it.
        match self.entry()?.get_password().map(zeroize::Zeroizing::new) {
            Ok(stored) if *stored == *data => Ok(()),
            Ok(_) | Err(keyring::Error::NoEntry) => Err(StoreError::Unavailable {
                backend: self.backend(),
                message: "keyring accepted the token but did not persist it".to_string(),
            }),
            Err(e) => Err(self.failure("verify", e)),
        }
    }

    async fn delete(&self) -> Result<(), StoreError> {
        let entry = self.entry()?;

        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(self.failure("delete", e)),
        }
    }

    fn backend(&self) -> Backend {
        if cfg!(target_os = "linux") {
            Backend::SecretTool
        } else {
            Backend::Keychain
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyring_backend_identifier() {
        let store = KeyringStore::new("sfauth-test", "oauth_token");
        assert!(store.backend().is_secure());
    }

    #[tokio::test]
    async fn test_keyring_store_operations() {
        let store = KeyringStore::new("sfauth-test-ops", format!("token-{}", std::process::id()));
        let record = TokenRecord::new("keyring-access", "keyring-refresh");

        // Headless systems without a keyring daemon refuse the write.
        if let Err(e) = store.set(&record).await {
            eprintln!("Keyring set failed ({}), skipping test", e);
            return;
        }

        assert_eq!(store.get().await.unwrap(), Some(record));
        store.delete().await.unwrap();
        assert!(store.get().await.unwrap().is_none());

        // Idempotent
        store.delete().await.unwrap();
    }

    #[tokio::test]
    async fn test_non_persisting_keyring_is_unavailable() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());

        let store = KeyringStore::new("sfauth-test-mock", "oauth_token");
        let result = store.set(&TokenRecord::new("lost-access", "lost-refresh")).await;

        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
    }
}
