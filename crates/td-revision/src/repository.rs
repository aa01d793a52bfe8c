//! # Revision Request Repository
//!
//! Revision requests are versioned like documents: recording an approval
//! rewrites the whole request against the version it was read at, so two
//! approvers answering at once cannot both see themselves as the last one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::PgPool;

use td_core::{BsdId, RevisionRequestId};

use crate::error::RevisionStoreError;
use crate::model::RevisionRequest;

#[derive(Debug, Clone, PartialEq)]
pub struct StoredRevision {
    pub request: RevisionRequest,
    pub version: i64,
}

#[async_trait]
pub trait RevisionRepository: Send + Sync + 'static {
    async fn insert(&self, request: RevisionRequest) -> Result<StoredRevision, RevisionStoreError>;

    async fn find(&self, id: &RevisionRequestId) -> Result<Option<StoredRevision>, RevisionStoreError>;

    /// Every request on a document, oldest first.
    async fn find_for_document(&self, bsd_id: &BsdId) -> Result<Vec<RevisionRequest>, RevisionStoreError>;

    /// Replace the request if its stored version is still `expected_version`.
    async fn save(
        &self,
        request: RevisionRequest,
        expected_version: i64,
    ) -> Result<StoredRevision, RevisionStoreError>;
}

// ─── In-memory ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct InMemoryRevisionRepository {
    requests: Arc<RwLock<HashMap<RevisionRequestId, StoredRevision>>>,
}

impl InMemoryRevisionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevisionRepository for InMemoryRevisionRepository {
    async fn insert(&self, request: RevisionRequest) -> Result<StoredRevision, RevisionStoreError> {
        let mut guard = self.requests.write();
        if guard.contains_key(&request.id) {
            return Err(RevisionStoreError::AlreadyExists {
                id: request.id.to_string(),
            });
        }
        let stored = StoredRevision { request, version: 1 };
        guard.insert(stored.request.id, stored.clone());
        Ok(stored)
    }

    async fn find(&self, id: &RevisionRequestId) -> Result<Option<StoredRevision>, RevisionStoreError> {
        Ok(self.requests.read().get(id).cloned())
    }

    async fn find_for_document(&self, bsd_id: &BsdId) -> Result<Vec<RevisionRequest>, RevisionStoreError> {
        let mut found: Vec<RevisionRequest> = self
            .requests
            .read()
            .values()
            .filter(|s| &s.request.bsd_id == bsd_id)
            .map(|s| s.request.clone())
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn save(
        &self,
        request: RevisionRequest,
        expected_version: i64,
    ) -> Result<StoredRevision, RevisionStoreError> {
        let mut guard = self.requests.write();
        let id = request.id;
        let entry = guard
            .get_mut(&id)
            .ok_or_else(|| RevisionStoreError::NotFound { id: id.to_string() })?;
        if entry.version != expected_version {
            return Err(RevisionStoreError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
            });
        }
        entry.request = request;
        entry.version += 1;
        Ok(entry.clone())
    }
}

// ─── PostgreSQL ─────────────────────────────────────────────────────────

/// Requests live in `revision_requests`, the full request as JSONB.
#[derive(Debug, Clone)]
pub struct PgRevisionRepository {
    pool: PgPool,
}

impl PgRevisionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn encode(request: &RevisionRequest) -> Result<serde_json::Value, RevisionStoreError> {
        serde_json::to_value(request).map_err(RevisionStoreError::Encode)
    }
}

#[async_trait]
impl RevisionRepository for PgRevisionRepository {
    async fn insert(&self, request: RevisionRequest) -> Result<StoredRevision, RevisionStoreError> {
        let json = Self::encode(&request)?;
        let result = sqlx::query(
            "INSERT INTO revision_requests (id, bsd_id, bsd_type, status, version, request, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 1, $5, $6, NOW())
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(request.id.as_uuid())
        .bind(request.bsd_id.as_str())
        .bind(request.bsd_type.to_string())
        .bind(request.status.to_string())
        .bind(&json)
        .bind(request.created_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RevisionStoreError::AlreadyExists {
                id: request.id.to_string(),
            });
        }
        Ok(StoredRevision { request, version: 1 })
    }

    async fn find(&self, id: &RevisionRequestId) -> Result<Option<StoredRevision>, RevisionStoreError> {
        let row = sqlx::query_as::<_, RevisionRow>(
            "SELECT id, request, version FROM revision_requests WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(RevisionRow::into_stored).transpose()
    }

    async fn find_for_document(&self, bsd_id: &BsdId) -> Result<Vec<RevisionRequest>, RevisionStoreError> {
        let rows = sqlx::query_as::<_, RevisionRow>(
            "SELECT id, request, version FROM revision_requests
             WHERE bsd_id = $1
             ORDER BY created_at, id",
        )
        .bind(bsd_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| row.into_stored().map(|s| s.request))
            .collect()
    }

    async fn save(
        &self,
        request: RevisionRequest,
        expected_version: i64,
    ) -> Result<StoredRevision, RevisionStoreError> {
        let json = Self::encode(&request)?;
        let version: Option<i64> = sqlx::query_scalar(
            "UPDATE revision_requests
             SET request = $1, status = $2, version = version + 1, updated_at = NOW()
             WHERE id = $3 AND version = $4
             RETURNING version",
        )
        .bind(&json)
        .bind(request.status.to_string())
        .bind(request.id.as_uuid())
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(version) = version {
            return Ok(StoredRevision { request, version });
        }

        let exists: Option<i64> = sqlx::query_scalar("SELECT version FROM revision_requests WHERE id = $1")
            .bind(request.id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        let id = request.id.to_string();
        Err(match exists {
            Some(_) => RevisionStoreError::VersionConflict {
                id,
                expected: expected_version,
            },
            None => RevisionStoreError::NotFound { id },
        })
    }
}

#[derive(sqlx::FromRow)]
struct RevisionRow {
    id: uuid::Uuid,
    request: serde_json::Value,
    version: i64,
}

impl RevisionRow {
    fn into_stored(self) -> Result<StoredRevision, RevisionStoreError> {
        let request = serde_json::from_value(self.request).map_err(|source| RevisionStoreError::Decode {
            id: self.id.to_string(),
            source,
        })?;
        Ok(StoredRevision {
            request,
            version: self.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use td_core::{BsdType, Delta, Siret};

    fn request(bsd: &str) -> RevisionRequest {
        RevisionRequest::new(
            BsdType::Bsda,
            BsdId::from(bsd),
            Siret::parse("11111111111111").unwrap(),
            Delta::new(),
            true,
            None,
            vec![],
        )
    }

    #[tokio::test]
    async fn test_insert_find_and_list() {
        let repo = InMemoryRevisionRepository::new();
        let first = repo.insert(request("BSDA-1")).await.unwrap();
        repo.insert(request("BSDA-1")).await.unwrap();
        repo.insert(request("BSDA-2")).await.unwrap();

        let found = repo.find(&first.request.id).await.unwrap().unwrap();
        assert_eq!(found.version, 1);
        let listed = repo.find_for_document(&BsdId::from("BSDA-1")).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, first.request.id);
    }

    #[tokio::test]
    async fn test_save_requires_current_version() {
        let repo = InMemoryRevisionRepository::new();
        let stored = repo.insert(request("BSDA-1")).await.unwrap();
        let saved = repo.save(stored.request.clone(), 1).await.unwrap();
        assert_eq!(saved.version, 2);
        let err = repo.save(stored.request, 1).await.unwrap_err();
        assert!(matches!(err, RevisionStoreError::VersionConflict { expected: 1, .. }));
    }
}
