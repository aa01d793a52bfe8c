//! # Activity Events
//!
//! An event is an immutable fact about one document, appended whenever the
//! document is created or mutated. Its `stream_id` is the document id (or
//! the revision request id for revision lifecycle events) and its
//! `created_at` is the only ordering key within a stream.
//!
//! Event types are the document prefix followed by the action:
//!
//! ```text
//! BsdaCreated    data = { content: <full document> }
//! BsdaUpdated    data = { content: <changed fields> }
//! BsdaSigned     data = { content: <changed fields>, signatureType }
//! BsdaDeleted    data = { content: { isDeleted: true } }
//! BsdaRevisionRequestApplied
//!                data = { content: <applied changes>, revisionRequestId }
//! ```

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use td_core::{BsdType, Delta, EventId, UserId};

// ─── Actions ─────────────────────────────────────────────────────────

/// What happened, independently of the document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventAction {
    Created,
    Updated,
    Signed,
    Deleted,
    RevisionRequestCreated,
    RevisionRequestAccepted,
    RevisionRequestRefused,
    RevisionRequestCancelled,
    RevisionRequestApplied,
}

impl EventAction {
    const ALL: [EventAction; 9] = [
        Self::Created,
        Self::Updated,
        Self::Signed,
        Self::Deleted,
        Self::RevisionRequestCreated,
        Self::RevisionRequestAccepted,
        Self::RevisionRequestRefused,
        Self::RevisionRequestCancelled,
        Self::RevisionRequestApplied,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Updated => "Updated",
            Self::Signed => "Signed",
            Self::Deleted => "Deleted",
            Self::RevisionRequestCreated => "RevisionRequestCreated",
            Self::RevisionRequestAccepted => "RevisionRequestAccepted",
            Self::RevisionRequestRefused => "RevisionRequestRefused",
            Self::RevisionRequestCancelled => "RevisionRequestCancelled",
            Self::RevisionRequestApplied => "RevisionRequestApplied",
        }
    }

    /// Full event type name for a document type, e.g. `BsdasriSigned`.
    pub fn event_type(&self, bsd_type: BsdType) -> String {
        format!("{}{}", bsd_type.event_prefix(), self.suffix())
    }

    /// Parse a full event type name. Unknown names yield `None`.
    pub fn parse(event_type: &str) -> Option<(BsdType, EventAction)> {
        let (bsd_type, rest) = BsdType::split_event_type(event_type)?;
        Self::ALL
            .into_iter()
            .find(|a| a.suffix() == rest)
            .map(|a| (bsd_type, a))
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

// ─── Events ──────────────────────────────────────────────────────────

/// A persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub stream_id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub actor: Option<String>,
    pub data: Value,
    pub metadata: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    pub fn action(&self) -> Option<EventAction> {
        EventAction::parse(&self.event_type).map(|(_, action)| action)
    }

    /// Field map carried by this event: `data.content` when present,
    /// otherwise `data` itself when it is an object.
    pub fn content(&self) -> Option<&Delta> {
        match self.data.get("content") {
            Some(Value::Object(content)) => Some(content),
            _ => self.data.as_object(),
        }
    }
}

/// An event not yet persisted. Identifier and timestamp are assigned by
/// the store on append.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub stream_id: String,
    pub event_type: String,
    pub actor: Option<String>,
    pub data: Value,
    pub metadata: Option<Value>,
}

impl NewEvent {
    pub fn new(stream_id: impl Into<String>, event_type: impl Into<String>, data: Value) -> Self {
        Self {
            stream_id: stream_id.into(),
            event_type: event_type.into(),
            actor: None,
            data,
            metadata: None,
        }
    }

    /// Event of the given action on a document stream, with
    /// `data = { content }`.
    pub fn document(
        bsd_type: BsdType,
        stream_id: impl Into<String>,
        action: EventAction,
        content: Delta,
    ) -> Self {
        Self::new(
            stream_id,
            action.event_type(bsd_type),
            json!({ "content": Value::Object(content) }),
        )
    }

    pub fn with_actor(mut self, actor: &UserId) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Add a key next to `content` in the payload.
    pub fn with_data(mut self, key: &str, value: Value) -> Self {
        if let Value::Object(map) = &mut self.data {
            map.insert(key.to_string(), value);
        }
        self
    }

    /// Materialize the event with a store-assigned id and timestamp.
    pub fn into_event(self, id: EventId, created_at: DateTime<Utc>) -> Event {
        Event {
            id,
            stream_id: self.stream_id,
            event_type: self.event_type,
            actor: self.actor,
            data: self.data,
            metadata: self.metadata,
            created_at,
        }
    }
}
