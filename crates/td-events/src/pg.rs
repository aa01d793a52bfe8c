//! PostgreSQL event stores.
//!
//! - `events`: the primary store, one row per event, read with a
//!   streaming cursor.
//! - `event_archive`: the archive store, one JSONB document per event.
//!
//! Both tables are created by the service migrations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use sqlx::PgPool;
use uuid::Uuid;

use td_core::EventId;

use crate::error::StoreError;
use crate::event::{Event, NewEvent};
use crate::store::{ArchiveEventStore, PrimaryEventStore, StreamQuery};

#[derive(Debug, Clone)]
pub struct PgPrimaryEventStore {
    pool: PgPool,
}

impl PgPrimaryEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PrimaryEventStore for PgPrimaryEventStore {
    async fn append(&self, event: NewEvent) -> Result<Event, StoreError> {
        let id = EventId::new();
        // clock_timestamp() rather than NOW(): two appends in one transaction
        // must not share a timestamp.
        let created_at: DateTime<Utc> = sqlx::query_scalar(
            "INSERT INTO events (id, stream_id, type, actor, data, metadata, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, clock_timestamp())
             RETURNING created_at",
        )
        .bind(id.0)
        .bind(&event.stream_id)
        .bind(&event.event_type)
        .bind(&event.actor)
        .bind(&event.data)
        .bind(&event.metadata)
        .fetch_one(&self.pool)
        .await?;

        Ok(event.into_event(id, created_at))
    }

    fn stream<'a>(&'a self, query: &'a StreamQuery) -> BoxStream<'a, Result<Event, StoreError>> {
        sqlx::query_as::<_, EventRow>(
            "SELECT id, stream_id, type AS event_type, actor, data, metadata, created_at
             FROM events
             WHERE stream_id = $1 AND ($2::timestamptz IS NULL OR created_at <= $2)
             ORDER BY created_at, id",
        )
        .bind(&query.stream_id)
        .bind(query.until)
        .fetch(&self.pool)
        .map(|row| row.map(EventRow::into_event).map_err(StoreError::from))
        .boxed()
    }
}

#[derive(Debug, Clone)]
pub struct PgArchiveEventStore {
    pool: PgPool,
}

impl PgArchiveEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArchiveEventStore for PgArchiveEventStore {
    async fn list(&self, query: &StreamQuery) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query_as::<_, ArchiveRow>(
            "SELECT id, document
             FROM event_archive
             WHERE stream_id = $1 AND ($2::timestamptz IS NULL OR created_at <= $2)
             ORDER BY created_at, id",
        )
        .bind(&query.stream_id)
        .bind(query.until)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ArchiveRow::into_event).collect()
    }

    async fn insert_many(&self, events: &[Event]) -> Result<usize, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for event in events {
            let document = serde_json::to_value(event).map_err(StoreError::Encode)?;
            let result = sqlx::query(
                "INSERT INTO event_archive (id, stream_id, created_at, document)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(event.id.0)
            .bind(&event.stream_id)
            .bind(event.created_at)
            .bind(&document)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

// ─── Row types ───────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    stream_id: String,
    event_type: String,
    actor: Option<String>,
    data: serde_json::Value,
    metadata: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl EventRow {
    fn into_event(self) -> Event {
        Event {
            id: EventId(self.id),
            stream_id: self.stream_id,
            event_type: self.event_type,
            actor: self.actor,
            data: self.data,
            metadata: self.metadata,
            created_at: self.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ArchiveRow {
    id: Uuid,
    document: serde_json::Value,
}

impl ArchiveRow {
    fn into_event(self) -> Result<Event, StoreError> {
        serde_json::from_value(self.document).map_err(|source| StoreError::Decode {
            store: "archive",
            id: self.id.to_string(),
            source,
        })
    }
}
