//! # Document Repository
//!
//! Persistence port for the live document records. Every stored document
//! carries a version; an update only succeeds against the version it was
//! computed from, which serializes concurrent transitions on one document.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use td_core::{Bsd, BsdId};

use crate::error::RepositoryError;

/// A document with its optimistic-concurrency version.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument<T> {
    pub document: T,
    pub version: i64,
}

#[async_trait]
pub trait DocumentRepository<T: Bsd>: Send + Sync + 'static {
    async fn find(&self, id: &BsdId) -> Result<Option<StoredDocument<T>>, RepositoryError>;

    async fn create(&self, document: T) -> Result<StoredDocument<T>, RepositoryError>;

    /// Replace the document if its stored version is still `expected_version`.
    async fn update(
        &self,
        expected_version: i64,
        document: T,
    ) -> Result<StoredDocument<T>, RepositoryError>;
}

/// Thread-safe in-memory repository.
///
/// The lock is never held across an `.await`, so a `parking_lot` lock is
/// enough.
#[derive(Debug)]
pub struct InMemoryDocumentRepository<T> {
    documents: Arc<RwLock<HashMap<BsdId, StoredDocument<T>>>>,
}

impl<T> Clone for InMemoryDocumentRepository<T> {
    fn clone(&self) -> Self {
        Self {
            documents: Arc::clone(&self.documents),
        }
    }
}

impl<T> Default for InMemoryDocumentRepository<T> {
    fn default() -> Self {
        Self {
            documents: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<T: Bsd> InMemoryDocumentRepository<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

#[async_trait]
impl<T: Bsd> DocumentRepository<T> for InMemoryDocumentRepository<T> {
    async fn find(&self, id: &BsdId) -> Result<Option<StoredDocument<T>>, RepositoryError> {
        Ok(self.documents.read().get(id).cloned())
    }

    async fn create(&self, document: T) -> Result<StoredDocument<T>, RepositoryError> {
        let mut guard = self.documents.write();
        let id = document.id().clone();
        if guard.contains_key(&id) {
            return Err(RepositoryError::AlreadyExists { id: id.to_string() });
        }
        let stored = StoredDocument {
            document,
            version: 1,
        };
        guard.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        expected_version: i64,
        document: T,
    ) -> Result<StoredDocument<T>, RepositoryError> {
        let mut guard = self.documents.write();
        let id = document.id().clone();
        let entry = guard
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound { id: id.to_string() })?;
        if entry.version != expected_version {
            return Err(RepositoryError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
            });
        }
        entry.document = document;
        entry.version += 1;
        Ok(entry.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsda::Bsda;

    #[tokio::test]
    async fn test_create_then_find() {
        let repo = InMemoryDocumentRepository::<Bsda>::new();
        let stored = repo.create(Bsda::new(BsdId::from("BSDA-1"))).await.unwrap();
        assert_eq!(stored.version, 1);
        let found = repo.find(&BsdId::from("BSDA-1")).await.unwrap().unwrap();
        assert_eq!(found, stored);
        assert!(repo.find(&BsdId::from("BSDA-2")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_create_fails() {
        let repo = InMemoryDocumentRepository::<Bsda>::new();
        repo.create(Bsda::new(BsdId::from("BSDA-1"))).await.unwrap();
        let err = repo.create(Bsda::new(BsdId::from("BSDA-1"))).await.unwrap_err();
        assert!(matches!(err, RepositoryError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_stale_version_is_refused() {
        let repo = InMemoryDocumentRepository::<Bsda>::new();
        let stored = repo.create(Bsda::new(BsdId::from("BSDA-1"))).await.unwrap();
        let first = repo.update(stored.version, stored.document.clone()).await.unwrap();
        assert_eq!(first.version, 2);
        let err = repo.update(stored.version, stored.document).await.unwrap_err();
        assert!(matches!(err, RepositoryError::VersionConflict { expected: 1, .. }));
    }
}
