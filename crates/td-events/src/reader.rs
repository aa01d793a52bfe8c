//! # Dual-Store Stream Reader
//!
//! Reads one stream from both event stores concurrently and merges the
//! results into a single ordered sequence:
//!
//! ```text
//! primary ──stream──┐
//!                   ├──▶ dedup by id (primary wins) ──▶ sort ──▶ events
//! archive ──list────┘
//! ```
//!
//! Ordering is `created_at` ascending, then store precedence (primary
//! first), then event id. Event ids are time-ordered, so the last key
//! follows insertion order and the result is identical on every read.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;

use td_core::EventId;

use crate::error::StoreError;
use crate::event::Event;
use crate::store::{ArchiveEventStore, PrimaryEventStore, StreamQuery};

#[derive(Clone)]
pub struct StreamReader {
    primary: Arc<dyn PrimaryEventStore>,
    archive: Option<Arc<dyn ArchiveEventStore>>,
}

impl StreamReader {
    pub fn new(primary: Arc<dyn PrimaryEventStore>, archive: Arc<dyn ArchiveEventStore>) -> Self {
        Self {
            primary,
            archive: Some(archive),
        }
    }

    /// Reader for deployments without an archive store.
    pub fn primary_only(primary: Arc<dyn PrimaryEventStore>) -> Self {
        Self {
            primary,
            archive: None,
        }
    }

    /// All events of `stream_id` with `created_at <= until`, merged and
    /// ordered. Fails as a whole if either store fails.
    pub async fn get_stream(
        &self,
        stream_id: &str,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Event>, StoreError> {
        let query = StreamQuery::new(stream_id, until);

        let primary = self.primary.stream(&query).try_collect::<Vec<Event>>();
        let archive = async {
            match &self.archive {
                Some(archive) => archive.list(&query).await,
                None => Ok(Vec::new()),
            }
        };
        let (primary, archive) = futures::try_join!(primary, archive).map_err(|e| {
            tracing::warn!(stream_id = %query.stream_id, error = %e, "event stream read failed");
            e
        })?;

        Ok(merge_streams(&query, primary, archive))
    }
}

/// Merge events read from both stores.
pub fn merge_streams(query: &StreamQuery, primary: Vec<Event>, archive: Vec<Event>) -> Vec<Event> {
    let mut index: HashMap<EventId, usize> = HashMap::with_capacity(primary.len() + archive.len());
    let mut merged: Vec<(u8, Event)> = Vec::with_capacity(primary.len() + archive.len());

    for (rank, events) in [(0u8, primary), (1u8, archive)] {
        for event in events {
            match index.get(&event.id) {
                Some(&at) => {
                    let kept = &merged[at].1;
                    if kept != &event {
                        tracing::warn!(
                            stream_id = %event.stream_id,
                            event_id = %event.id,
                            "event stored twice with different payloads; keeping the primary copy"
                        );
                    }
                }
                None => {
                    index.insert(event.id, merged.len());
                    merged.push((rank, event));
                }
            }
        }
    }

    merged.retain(|(_, e)| query.matches(e));
    merged.sort_by(|(rank_a, a), (rank_b, b)| {
        a.created_at
            .cmp(&b.created_at)
            .then(rank_a.cmp(rank_b))
            .then(a.id.cmp(&b.id))
    });
    merged.into_iter().map(|(_, e)| e).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::NewEvent;
    use crate::memory::{InMemoryArchiveStore, InMemoryPrimaryStore};
    use chrono::Duration;
    use serde_json::json;
    use std::collections::HashSet;

    fn event_at(stream: &str, ty: &str, at: DateTime<Utc>, content: serde_json::Value) -> Event {
        NewEvent::new(stream, ty, json!({ "content": content })).into_event(EventId::new(), at)
    }

    fn reader(primary: &InMemoryPrimaryStore, archive: &InMemoryArchiveStore) -> StreamReader {
        StreamReader::new(Arc::new(primary.clone()), Arc::new(archive.clone()))
    }

    // ── Merge ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_merges_and_sorts_both_stores() {
        let t0 = Utc::now();
        let primary = InMemoryPrimaryStore::new();
        let archive = InMemoryArchiveStore::new();
        let created = event_at("S", "BsdaCreated", t0, json!({"a": 1}));
        let updated = event_at("S", "BsdaUpdated", t0 + Duration::seconds(1), json!({"a": 2}));
        let signed = event_at("S", "BsdaSigned", t0 + Duration::seconds(2), json!({"a": 3}));
        archive.insert_many(&[created.clone(), updated.clone()]).await.unwrap();
        primary.insert_raw(signed.clone());

        let events = reader(&primary, &archive).get_stream("S", None).await.unwrap();
        assert_eq!(events, vec![created, updated, signed]);
    }

    #[tokio::test]
    async fn test_event_in_both_stores_appears_once() {
        let t0 = Utc::now();
        let primary = InMemoryPrimaryStore::new();
        let archive = InMemoryArchiveStore::new();
        let shared = event_at("S", "BsdaCreated", t0, json!({"a": 1}));
        let only_archive = event_at("S", "BsdaUpdated", t0 + Duration::seconds(1), json!({"a": 2}));
        primary.insert_raw(shared.clone());
        archive.insert_many(&[shared.clone(), only_archive]).await.unwrap();

        let events = reader(&primary, &archive).get_stream("S", None).await.unwrap();
        let distinct: HashSet<EventId> = events.iter().map(|e| e.id).collect();
        assert_eq!(events.len(), 2);
        assert_eq!(distinct.len(), events.len());
    }

    #[tokio::test]
    async fn test_primary_copy_wins_on_collision() {
        let t0 = Utc::now();
        let primary = InMemoryPrimaryStore::new();
        let archive = InMemoryArchiveStore::new();
        let original = event_at("S", "BsdaCreated", t0, json!({"a": "primary"}));
        let mut stale = original.clone();
        stale.data = json!({"content": {"a": "archive"}});
        primary.insert_raw(original.clone());
        archive.insert_many(&[stale]).await.unwrap();

        let events = reader(&primary, &archive).get_stream("S", None).await.unwrap();
        assert_eq!(events, vec![original]);
    }

    #[tokio::test]
    async fn test_equal_timestamps_order_primary_first() {
        let t0 = Utc::now();
        let primary = InMemoryPrimaryStore::new();
        let archive = InMemoryArchiveStore::new();
        let from_archive = event_at("S", "BsdaUpdated", t0, json!({"a": 1}));
        let from_primary = event_at("S", "BsdaUpdated", t0, json!({"a": 2}));
        archive.insert_many(&[from_archive.clone()]).await.unwrap();
        primary.insert_raw(from_primary.clone());

        let r = reader(&primary, &archive);
        let first = r.get_stream("S", None).await.unwrap();
        let second = r.get_stream("S", None).await.unwrap();
        assert_eq!(first, vec![from_primary, from_archive]);
        assert_eq!(first, second);
    }

    // ── Cutoff ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_cutoff_is_inclusive() {
        let t0 = Utc::now();
        let primary = InMemoryPrimaryStore::new();
        let archive = InMemoryArchiveStore::new();
        let a = event_at("S", "BsdaCreated", t0, json!({}));
        let b = event_at("S", "BsdaUpdated", t0 + Duration::seconds(1), json!({}));
        primary.insert_raw(a.clone());
        primary.insert_raw(b);

        let events = reader(&primary, &archive).get_stream("S", Some(t0)).await.unwrap();
        assert_eq!(events, vec![a]);
    }

    #[tokio::test]
    async fn test_other_streams_are_ignored() {
        let primary = InMemoryPrimaryStore::new();
        let archive = InMemoryArchiveStore::new();
        primary.insert_raw(event_at("OTHER", "BsdaCreated", Utc::now(), json!({})));
        let events = reader(&primary, &archive).get_stream("S", None).await.unwrap();
        assert!(events.is_empty());
    }

    // ── Failures ────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_archive_failure_fails_whole_read() {
        let primary = InMemoryPrimaryStore::new();
        let archive = InMemoryArchiveStore::new();
        primary.insert_raw(event_at("S", "BsdaCreated", Utc::now(), json!({})));
        archive.set_unavailable(true);
        let err = reader(&primary, &archive).get_stream("S", None).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { store: "archive" }));
    }

    #[tokio::test]
    async fn test_primary_failure_fails_whole_read() {
        let primary = InMemoryPrimaryStore::new();
        let archive = InMemoryArchiveStore::new();
        primary.set_unavailable(true);
        let err = reader(&primary, &archive).get_stream("S", None).await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable { store: "primary" }));
    }

    #[tokio::test]
    async fn test_primary_only_reader() {
        let primary = InMemoryPrimaryStore::new();
        primary.insert_raw(event_at("S", "BsdaCreated", Utc::now(), json!({})));
        let reader = StreamReader::primary_only(Arc::new(primary));
        assert_eq!(reader.get_stream("S", None).await.unwrap().len(), 1);
    }
}
