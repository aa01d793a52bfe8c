//! # Service Error
//!
//! Aggregates every crate's error and maps it to a stable,
//! machine-readable code for callers.

use thiserror::Error;

use td_core::{DeltaError, ValidationError};
use td_events::{ProjectionError, StoreError};
use td_revision::{RevisionError, RevisionStoreError};
use td_state::{RepositoryError, TransitionError};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{what} {id} not found")]
    NotFound { what: &'static str, id: String },

    /// The user is authenticated but may not act on this document.
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("document {id} is deleted")]
    AlreadyDeleted { id: String },

    /// The caller supplied a value that cannot be accepted as is.
    #[error("{0}")]
    UserInput(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Revision(#[from] RevisionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Events(#[from] StoreError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Delta(#[from] DeltaError),
}

impl ServiceError {
    pub fn not_found(what: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            what,
            id: id.to_string(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Stable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Forbidden { .. } => "FORBIDDEN",
            Self::AlreadyDeleted { .. } => "ALREADY_DELETED",
            Self::UserInput(_) => "USER_INPUT",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::Transition(e) => transition_code(e),
            Self::Revision(e) => revision_code(e),
            Self::Repository(e) => repository_code(e),
            Self::Events(_) => "STORAGE",
            Self::Projection(ProjectionError::Store(_)) => "STORAGE",
            Self::Projection(ProjectionError::Decode { .. }) => "INCONSISTENT",
            Self::Delta(_) => "USER_INPUT",
        }
    }
}

fn transition_code(error: &TransitionError) -> &'static str {
    match error {
        TransitionError::NotFound { .. } => "NOT_FOUND",
        TransitionError::AlreadyDeleted { .. } => "ALREADY_DELETED",
        TransitionError::InvalidTransition { .. } => "INVALID_TRANSITION",
        TransitionError::Validation(_) => "VALIDATION_FAILED",
        TransitionError::Conflict { .. } => "VERSION_LOCKED",
        TransitionError::Delta(_) => "USER_INPUT",
        TransitionError::Repository(e) => repository_code(e),
    }
}

fn repository_code(error: &RepositoryError) -> &'static str {
    match error {
        RepositoryError::NotFound { .. } => "NOT_FOUND",
        RepositoryError::VersionConflict { .. } => "VERSION_LOCKED",
        RepositoryError::AlreadyExists { .. } => "USER_INPUT",
        RepositoryError::Decode { .. } => "INCONSISTENT",
        RepositoryError::Database(_) => "STORAGE",
        RepositoryError::Encode(_) => "INTERNAL",
    }
}

fn revision_code(error: &RevisionError) -> &'static str {
    match error {
        RevisionError::NotFound { .. } | RevisionError::DocumentNotFound { .. } => "NOT_FOUND",
        RevisionError::DocumentDeleted { .. } => "ALREADY_DELETED",
        RevisionError::NotAParty { .. }
        | RevisionError::NotApprover { .. }
        | RevisionError::NotAuthor { .. } => "FORBIDDEN",
        RevisionError::AlreadyResolved { .. } | RevisionError::AlreadyDecided { .. } => "ALREADY_RESOLVED",
        RevisionError::DuplicatePending { .. }
        | RevisionError::NotRevisable { .. }
        | RevisionError::NotCancellable { .. }
        | RevisionError::EmptyRevision
        | RevisionError::CancelWithChanges
        | RevisionError::Delta(_) => "USER_INPUT",
        RevisionError::InvalidFields(_) => "VALIDATION_FAILED",
        RevisionError::Conflict { .. } => "VERSION_LOCKED",
        RevisionError::Documents(e) => repository_code(e),
        RevisionError::Store(RevisionStoreError::VersionConflict { .. }) => "VERSION_LOCKED",
        RevisionError::Store(RevisionStoreError::Decode { .. }) => "INCONSISTENT",
        RevisionError::Store(RevisionStoreError::Database(_)) => "STORAGE",
        RevisionError::Store(_) => "INTERNAL",
    }
}
