//! PostgreSQL document repository.
//!
//! All document types share the `bsds` table. The full record is stored as
//! JSONB; `status` and `is_deleted` are copied into columns for querying.

use std::marker::PhantomData;

use async_trait::async_trait;
use sqlx::PgPool;

use td_core::{Bsd, BsdId};

use crate::error::RepositoryError;
use crate::repository::{DocumentRepository, StoredDocument};

#[derive(Debug)]
pub struct PgDocumentRepository<T> {
    pool: PgPool,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for PgDocumentRepository<T> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: Bsd> PgDocumentRepository<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }

    fn encode(document: &T) -> Result<serde_json::Value, RepositoryError> {
        serde_json::to_value(document).map_err(RepositoryError::Encode)
    }
}

#[async_trait]
impl<T: Bsd> DocumentRepository<T> for PgDocumentRepository<T> {
    async fn find(&self, id: &BsdId) -> Result<Option<StoredDocument<T>>, RepositoryError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            "SELECT document, version FROM bsds WHERE id = $1 AND type = $2",
        )
        .bind(id.as_str())
        .bind(T::TYPE.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.into_stored(id)).transpose()
    }

    async fn create(&self, document: T) -> Result<StoredDocument<T>, RepositoryError> {
        let json = Self::encode(&document)?;
        let result = sqlx::query(
            "INSERT INTO bsds (id, type, status, is_deleted, version, document, created_at, updated_at)
             VALUES ($1, $2, $3, $4, 1, $5, NOW(), NOW())
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(document.id().as_str())
        .bind(T::TYPE.to_string())
        .bind(document.status().to_string())
        .bind(document.is_deleted())
        .bind(&json)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::AlreadyExists {
                id: document.id().to_string(),
            });
        }
        Ok(StoredDocument {
            document,
            version: 1,
        })
    }

    async fn update(
        &self,
        expected_version: i64,
        document: T,
    ) -> Result<StoredDocument<T>, RepositoryError> {
        let json = Self::encode(&document)?;
        let version: Option<i64> = sqlx::query_scalar(
            "UPDATE bsds
             SET document = $1, status = $2, is_deleted = $3, version = version + 1, updated_at = NOW()
             WHERE id = $4 AND type = $5 AND version = $6
             RETURNING version",
        )
        .bind(&json)
        .bind(document.status().to_string())
        .bind(document.is_deleted())
        .bind(document.id().as_str())
        .bind(T::TYPE.to_string())
        .bind(expected_version)
        .fetch_optional(&self.pool)
        .await?;

        match version {
            Some(version) => Ok(StoredDocument { document, version }),
            None => {
                let exists: Option<i64> =
                    sqlx::query_scalar("SELECT version FROM bsds WHERE id = $1 AND type = $2")
                        .bind(document.id().as_str())
                        .bind(T::TYPE.to_string())
                        .fetch_optional(&self.pool)
                        .await?;
                let id = document.id().to_string();
                Err(match exists {
                    Some(_) => RepositoryError::VersionConflict {
                        id,
                        expected: expected_version,
                    },
                    None => RepositoryError::NotFound { id },
                })
            }
        }
    }
}

#[derive(sqlx::FromRow)]
struct DocumentRow {
    document: serde_json::Value,
    version: i64,
}

impl DocumentRow {
    fn into_stored<T: Bsd>(self, id: &BsdId) -> Result<StoredDocument<T>, RepositoryError> {
        let document = serde_json::from_value(self.document).map_err(|source| RepositoryError::Decode {
            id: id.to_string(),
            source,
        })?;
        Ok(StoredDocument {
            document,
            version: self.version,
        })
    }
}
