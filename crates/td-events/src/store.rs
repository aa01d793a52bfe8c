//! # Event Store Ports
//!
//! Events live in two independent backends:
//!
//! - the **primary** store (relational) receives every new event and is
//!   read as a push-style stream of rows;
//! - the **archive** store (document-oriented) holds events moved out of
//!   the primary store and is read with a list query.
//!
//! An event may be present in both while it is being archived. Only the
//! stream reader knows about the split; everything else reads merged
//! streams.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;

use crate::error::StoreError;
use crate::event::{Event, NewEvent};

/// Events of one stream, optionally bounded by an inclusive cutoff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamQuery {
    pub stream_id: String,
    pub until: Option<DateTime<Utc>>,
}

impl StreamQuery {
    pub fn new(stream_id: impl Into<String>, until: Option<DateTime<Utc>>) -> Self {
        Self {
            stream_id: stream_id.into(),
            until,
        }
    }

    pub fn matches(&self, event: &Event) -> bool {
        event.stream_id == self.stream_id && self.until.map_or(true, |t| event.created_at <= t)
    }
}

#[async_trait]
pub trait PrimaryEventStore: Send + Sync + 'static {
    /// Append an event. The store assigns the id and a `created_at` that is
    /// never earlier than any event it already holds.
    async fn append(&self, event: NewEvent) -> Result<Event, StoreError>;

    /// Stream the events matching `query`.
    fn stream<'a>(&'a self, query: &'a StreamQuery) -> BoxStream<'a, Result<Event, StoreError>>;
}

#[async_trait]
pub trait ArchiveEventStore: Send + Sync + 'static {
    async fn list(&self, query: &StreamQuery) -> Result<Vec<Event>, StoreError>;

    /// Copy events into the archive. Events already archived are skipped.
    async fn insert_many(&self, events: &[Event]) -> Result<usize, StoreError>;
}
