use thiserror::Error;

use td_core::{DeltaError, ValidationError};
use td_state::RepositoryError;

/// Failure of the revision request repository.
#[derive(Error, Debug)]
pub enum RevisionStoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("revision request {id} already exists")]
    AlreadyExists { id: String },

    #[error("revision request {id} not found")]
    NotFound { id: String },

    #[error("revision request {id} was modified concurrently (expected version {expected})")]
    VersionConflict { id: String, expected: i64 },

    #[error("stored revision request {id} is malformed: {source}")]
    Decode {
        id: String,
        source: serde_json::Error,
    },

    #[error("revision request could not be encoded: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Errors raised by the revision request engine.
#[derive(Error, Debug)]
pub enum RevisionError {
    #[error("revision request {id} not found")]
    NotFound { id: String },

    #[error("document {id} not found")]
    DocumentNotFound { id: String },

    #[error("document {id} is deleted")]
    DocumentDeleted { id: String },

    /// The author holds no role allowing it to request a revision.
    #[error("company {siret} is not allowed to request a revision on this document")]
    NotAParty { siret: String },

    #[error("company {siret} is not an approver of revision request {id}")]
    NotApprover { id: String, siret: String },

    #[error("only the author of revision request {id} may cancel it, not {siret}")]
    NotAuthor { id: String, siret: String },

    #[error("revision request {id} is already resolved ({status})")]
    AlreadyResolved { id: String, status: String },

    #[error("company {siret} already answered revision request {id}")]
    AlreadyDecided { id: String, siret: String },

    #[error("a pending revision request on {bsd_id} already covers these fields")]
    DuplicatePending { bsd_id: String },

    #[error("document {id} cannot be revised: {reason}")]
    NotRevisable { id: String, reason: &'static str },

    #[error("document {id} cannot be canceled in status {status}")]
    NotCancellable { id: String, status: String },

    #[error("a revision request must change at least one field")]
    EmptyRevision,

    #[error("a cancellation request cannot also change fields")]
    CancelWithChanges,

    #[error(transparent)]
    InvalidFields(#[from] ValidationError),

    #[error("revision request {id} kept changing under concurrent updates")]
    Conflict { id: String },

    #[error(transparent)]
    Delta(#[from] DeltaError),

    #[error(transparent)]
    Documents(#[from] RepositoryError),

    #[error(transparent)]
    Store(#[from] RevisionStoreError),
}
