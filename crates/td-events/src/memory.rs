//! In-memory event stores for tests and development.
//!
//! Both stores can be switched to an unavailable state to exercise
//! failure paths.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::RwLock;

use td_core::EventId;

use crate::error::StoreError;
use crate::event::{Event, NewEvent};
use crate::store::{ArchiveEventStore, PrimaryEventStore, StreamQuery};

#[derive(Debug, Default)]
struct PrimaryLog {
    events: Vec<Event>,
    last_created_at: Option<DateTime<Utc>>,
}

/// Primary store backed by a vector.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPrimaryStore {
    log: Arc<RwLock<PrimaryLog>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryPrimaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully formed event, bypassing id and clock assignment.
    pub fn insert_raw(&self, event: Event) {
        let mut log = self.log.write();
        log.last_created_at = Some(match log.last_created_at {
            Some(last) if last > event.created_at => last,
            _ => event.created_at,
        });
        log.events.push(event);
    }

    /// Every stored event, in insertion order.
    pub fn all(&self) -> Vec<Event> {
        self.log.read().events.clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable { store: "primary" })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PrimaryEventStore for InMemoryPrimaryStore {
    async fn append(&self, event: NewEvent) -> Result<Event, StoreError> {
        self.check()?;
        let mut log = self.log.write();
        let now = Utc::now();
        // Strictly increasing timestamps keep appends ordered even when the
        // wall clock does not advance between two calls.
        let created_at = match log.last_created_at {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        log.last_created_at = Some(created_at);
        let event = event.into_event(EventId::new(), created_at);
        log.events.push(event.clone());
        Ok(event)
    }

    fn stream<'a>(&'a self, query: &'a StreamQuery) -> BoxStream<'a, Result<Event, StoreError>> {
        if let Err(e) = self.check() {
            return stream::once(async move { Err(e) }).boxed();
        }
        let events: Vec<Event> = self
            .log
            .read()
            .events
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        stream::iter(events.into_iter().map(Ok)).boxed()
    }
}

/// Archive store backed by a vector.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArchiveStore {
    events: Arc<RwLock<Vec<Event>>>,
    unavailable: Arc<AtomicBool>,
}

impl InMemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl ArchiveEventStore for InMemoryArchiveStore {
    async fn list(&self, query: &StreamQuery) -> Result<Vec<Event>, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable { store: "archive" });
        }
        Ok(self
            .events
            .read()
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect())
    }

    async fn insert_many(&self, events: &[Event]) -> Result<usize, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable { store: "archive" });
        }
        let mut stored = self.events.write();
        let known: HashSet<EventId> = stored.iter().map(|e| e.id).collect();
        let fresh: Vec<Event> = events
            .iter()
            .filter(|e| !known.contains(&e.id))
            .cloned()
            .collect();
        let inserted = fresh.len();
        stored.extend(fresh);
        Ok(inserted)
    }
}
