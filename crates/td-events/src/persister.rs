//! # Event Persister
//!
//! Appends one event to the primary store after a document mutation has
//! been written. A failure here leaves the document ahead of its log: it is
//! logged at error level and counted so it can be alerted on and repaired
//! with a reconcile pass.

use std::sync::Arc;

use crate::error::StoreError;
use crate::event::{Event, NewEvent};
use crate::store::PrimaryEventStore;

/// Counter incremented on every failed append.
pub const PERSIST_FAILURES_METRIC: &str = "td_event_persist_failures_total";

#[derive(Clone)]
pub struct EventPersister {
    store: Arc<dyn PrimaryEventStore>,
}

impl EventPersister {
    pub fn new(store: Arc<dyn PrimaryEventStore>) -> Self {
        Self { store }
    }

    pub async fn persist_event(&self, event: NewEvent) -> Result<Event, StoreError> {
        let stream_id = event.stream_id.clone();
        let event_type = event.event_type.clone();
        match self.store.append(event).await {
            Ok(event) => {
                tracing::debug!(
                    stream_id = %event.stream_id,
                    event_type = %event.event_type,
                    event_id = %event.id,
                    "event persisted"
                );
                Ok(event)
            }
            Err(e) => {
                tracing::error!(
                    stream_id = %stream_id,
                    event_type = %event_type,
                    error = %e,
                    "failed to persist event"
                );
                metrics::counter!(PERSIST_FAILURES_METRIC, "event_type" => event_type).increment(1);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPrimaryStore;
    use serde_json::json;
    use td_core::UserId;

    #[tokio::test]
    async fn test_persist_event_appends_to_primary() {
        let store = InMemoryPrimaryStore::new();
        let persister = EventPersister::new(Arc::new(store.clone()));
        let event = persister
            .persist_event(
                NewEvent::new("BSDA-1", "BsdaCreated", json!({"content": {"id": "BSDA-1"}}))
                    .with_actor(&UserId("u1".into())),
            )
            .await
            .unwrap();
        assert_eq!(event.actor.as_deref(), Some("u1"));
        assert_eq!(store.all(), vec![event]);
    }

    #[tokio::test]
    async fn test_persist_event_surfaces_store_failure() {
        let store = InMemoryPrimaryStore::new();
        store.set_unavailable(true);
        let persister = EventPersister::new(Arc::new(store.clone()));
        let result = persister
            .persist_event(NewEvent::new("BSDA-1", "BsdaUpdated", json!({})))
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable { .. })));
        assert!(store.all().is_empty());
    }
}
