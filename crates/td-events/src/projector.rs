//! # State Reconstructor
//!
//! Rebuilds a document as it was at a given instant by folding its ordered
//! event stream:
//!
//! - a `Created` event replaces the accumulator with its full content;
//! - every other event shallow-merges its content over the accumulator.
//!
//! The fold is a pure function of the ordered events. With a cutoff, only
//! events at or before the cutoff take part.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;

use td_core::delta::{self, Delta};

use crate::error::{ProjectionError, StoreError};
use crate::event::{Event, EventAction};
use crate::reader::StreamReader;

/// Fold ordered events into a field map. `None` when there are no events.
pub fn fold<'a>(events: impl IntoIterator<Item = &'a Event>) -> Option<Delta> {
    let mut state: Option<Delta> = None;
    for event in events {
        let content = event.content().cloned().unwrap_or_default();
        let is_created = event.action() == Some(EventAction::Created);
        match state.as_mut() {
            Some(acc) if !is_created => {
                delta::merge(acc, &content);
                continue;
            }
            _ => {}
        }
        state = Some(content);
    }
    state
}

/// Fold ordered events and deserialize the result into a document.
pub fn fold_as<T: DeserializeOwned>(
    stream_id: &str,
    events: &[Event],
) -> Result<Option<T>, ProjectionError> {
    fold(events)
        .map(|fields| {
            serde_json::from_value(Value::Object(fields)).map_err(|source| ProjectionError::Decode {
                stream_id: stream_id.to_string(),
                source,
            })
        })
        .transpose()
}

/// Point-in-time document reads over a [`StreamReader`].
#[derive(Clone)]
pub struct StateReconstructor {
    reader: StreamReader,
}

impl StateReconstructor {
    pub fn new(reader: StreamReader) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &StreamReader {
        &self.reader
    }

    /// Field map of the document as of `at` (now when `None`).
    pub async fn fields_at(
        &self,
        id: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<Delta>, StoreError> {
        let events = self.reader.get_stream(id, at).await?;
        Ok(fold(&events))
    }

    /// The document as of `at`, rebuilt from its activity events. `None`
    /// when the stream has no event at or before `at`; the caller decides
    /// whether that is a NotFound.
    pub async fn get_document_from_activity_events<T: DeserializeOwned>(
        &self,
        id: &str,
        at: Option<DateTime<Utc>>,
    ) -> Result<Option<T>, ProjectionError> {
        let events = self.reader.get_stream(id, at).await?;
        fold_as(id, &events)
    }
}
