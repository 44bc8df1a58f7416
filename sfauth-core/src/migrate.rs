//! One-shot promotion of a legacy plaintext token file into secure storage.

use std::path::Path;

use crate::erase::secure_erase;
use crate::store::{CredentialStore, FileStore, StoreError};

/// What [`migrate_legacy_token`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// There is no legacy token file.
    NoLegacyFile,
    /// Secure storage already holds a token; nothing was imported.
    AlreadyMigrated,
    /// No secure backend could take the token; the file stays where it is.
    SecureBackendUnavailable,
    /// The token was imported. `erased` is false if the legacy file could
    /// not be removed afterwards.
    Migrated { erased: bool },
}

/// Move the token in `legacy_path` into `secure`, then erase the file.
///
/// `secure` must only contain encrypted backends (see
/// [`FallbackStore::secure_only`](crate::store::FallbackStore::secure_only)),
/// otherwise the token could be written straight back to the file being
/// retired. Running this again after a successful migration is a no-op.
pub async fn migrate_legacy_token(
    legacy_path: &Path,
    secure: &dyn CredentialStore,
) -> Result<MigrationOutcome, StoreError> {
    if !legacy_path.exists() {
        return Ok(MigrationOutcome::NoLegacyFile);
    }

    match secure.get().await {
        Ok(Some(_)) => {
            tracing::debug!(backend = %secure.backend(), "token already in secure storage, skipping migration");
            return Ok(MigrationOutcome::AlreadyMigrated);
        }
        Ok(None) => {}
        Err(e) if e.is_unavailable() => {
            tracing::debug!(error = %e, "secure storage unavailable, keeping legacy token file");
            return Ok(MigrationOutcome::SecureBackendUnavailable);
        }
        Err(e) => return Err(e),
    }

    let Some(record) = FileStore::read_record(legacy_path)? else {
        return Ok(MigrationOutcome::NoLegacyFile);
    };

    match secure.set(&record).await {
        Ok(()) => {}
        Err(e) if e.is_unavailable() || matches!(e, StoreError::NoBackend) => {
            tracing::debug!(error = %e, "secure storage unavailable, keeping legacy token file");
            return Ok(MigrationOutcome::SecureBackendUnavailable);
        }
        Err(e) => return Err(e),
    }

    let erased = match secure_erase(legacy_path) {
        Ok(_) => {
            tracing::info!(backend = %secure.backend(), "migrated token to secure storage, old token file securely deleted");
            true
        }
        Err(e) => {
            tracing::warn!(path = %legacy_path.display(), error = %e, "token migrated but the old token file could not be deleted");
            false
        }
    };

    Ok(MigrationOutcome::Migrated { erased })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Backend, FallbackStore, MemoryStore};
    use crate::token::TokenRecord;
    use std::sync::Arc;
    use tempfile::TempDir;

    const LEGACY: &str = r#"{"access_token":"legacy-access","token_type":"Bearer","refresh_token":"legacy-refresh","expiry":"0001-01-01T00:00:00Z"}"#;

    #[tokio::test]
    async fn test_no_legacy_file() {
        let temp = TempDir::new().unwrap();
        let secure = MemoryStore::new(Backend::Keychain);

        let outcome = migrate_legacy_token(&temp.path().join("token.json"), &secure)
            .await
            .unwrap();

        assert_eq!(outcome, MigrationOutcome::NoLegacyFile);
        assert!(secure.get().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_migrates_and_erases() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        std::fs::write(&path, LEGACY).unwrap();
        let secure = MemoryStore::new(Backend::SecretTool);

        let outcome = migrate_legacy_token(&path, &secure).await.unwrap();

        assert_eq!(outcome, MigrationOutcome::Migrated { erased: true });
        assert!(!path.exists());
        assert_eq!(
            secure.get().await.unwrap(),
            Some(TokenRecord::new("legacy-access", "legacy-refresh"))
        );
    }

    #[tokio::test]
    async fn test_skips_when_secure_store_has_token() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        std::fs::write(&path, LEGACY).unwrap();
        let existing = TokenRecord::new("current-access", "current-refresh");
        let secure = MemoryStore::with_record(Backend::Keychain, existing.clone());

        let outcome = migrate_legacy_token(&path, &secure).await.unwrap();

        assert_eq!(outcome, MigrationOutcome::AlreadyMigrated);
        assert!(path.exists());
        assert_eq!(secure.get().await.unwrap(), Some(existing));
    }

    #[tokio::test]
    async fn test_no_secure_backend_keeps_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        std::fs::write(&path, LEGACY).unwrap();

        let file_only = FallbackStore::new(vec![Arc::new(FileStore::new(&path))]);
        let secure = file_only.secure_only();

        let outcome = migrate_legacy_token(&path, &secure).await.unwrap();

        assert_eq!(outcome, MigrationOutcome::SecureBackendUnavailable);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), LEGACY);
    }

    #[tokio::test]
    async fn test_corrupt_legacy_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        std::fs::write(&path, "{").unwrap();
        let secure = MemoryStore::new(Backend::Keychain);

        let result = migrate_legacy_token(&path, &secure).await;

        assert!(matches!(result, Err(StoreError::Serialization(_))));
        assert!(path.exists());
    }
}
