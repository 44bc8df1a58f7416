//! In-memory credential storage implementation.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{Backend, CredentialStore, StoreError};
use crate::token::TokenRecord;

/// In-memory credential store for testing and embedding.
///
/// This store is not persistent; data is lost when the process exits.
/// It reports whichever [`Backend`] it was created as, which lets tests
/// stand it in for a platform backend inside a [`FallbackStore`](super::FallbackStore).
pub struct MemoryStore {
    backend: Backend,
    record: RwLock<Option<TokenRecord>>,
}

impl MemoryStore {
    /// Create a new empty memory store reporting the given backend.
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            record: RwLock::new(None),
        }
    }

    /// Create a memory store holding a record.
    pub fn with_record(backend: Backend, record: TokenRecord) -> Self {
        Self {
            backend,
            record: RwLock::new(Some(record)),
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("backend", &self.backend)
            .field("has_record", &self.record.read().is_some())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get(&self) -> Result<Option<TokenRecord>, StoreError> {
        Ok(self.record.read().clone())
    }

    async fn set(&self, record: &TokenRecord) -> Result<(), StoreError> {
        *self.record.write() = Some(record.clone());
        Ok(())
    }

    async fn delete(&self) -> Result<(), StoreError> {
        *self.record.write() = None;
        Ok(())
    }

    fn backend(&self) -> Backend {
        self.backend
    }
}
