use thiserror::Error;

use td_core::EventId;

/// Failure of an event store.
///
/// Reads surface any store failure as a single error for the whole read,
/// never a partial result. Callers may retry reads; appends are not retried.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored payload could not be decoded into an event.
    #[error("malformed event {id} in {store} store: {source}")]
    Decode {
        store: &'static str,
        id: String,
        source: serde_json::Error,
    },

    #[error("event payload could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("{store} event store is unavailable")]
    Unavailable { store: &'static str },

    #[error("event {id} already exists")]
    Duplicate { id: EventId },
}

/// Failure to rebuild a document from its events.
#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The folded field map does not deserialize into the document type.
    #[error("stream {stream_id} does not fold into a valid document: {source}")]
    Decode {
        stream_id: String,
        source: serde_json::Error,
    },
}
