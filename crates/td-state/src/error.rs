use thiserror::Error;

use td_core::{DeltaError, ValidationError};

/// Failure of a document repository.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("document {id} not found")]
    NotFound { id: String },

    #[error("document {id} already exists")]
    AlreadyExists { id: String },

    /// The stored version moved since the document was read.
    #[error("document {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: String, expected: i64 },

    #[error("stored document {id} is malformed: {source}")]
    Decode {
        id: String,
        source: serde_json::Error,
    },

    #[error("document could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Errors that can occur while executing a status transition.
#[derive(Error, Debug)]
pub enum TransitionError {
    #[error("document {id} not found")]
    NotFound { id: String },

    #[error("document {id} is deleted")]
    AlreadyDeleted { id: String },

    /// The machine rejected the event in the current status.
    #[error("invalid transition for {id}: {event} is not allowed in status {from}")]
    InvalidTransition {
        id: String,
        from: String,
        event: String,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("document {id} was modified concurrently (expected version {expected_version})")]
    Conflict { id: String, expected_version: i64 },

    #[error(transparent)]
    Delta(#[from] DeltaError),

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<RepositoryError> for TransitionError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { id } => Self::NotFound { id },
            RepositoryError::VersionConflict { id, expected } => Self::Conflict {
                id,
                expected_version: expected,
            },
            other => Self::Repository(other),
        }
    }
}
