//! # Transition Executor
//!
//! Runs one status transition against a stored document:
//!
//! 1. merge the caller's delta into a candidate record (protected fields
//!    are refused);
//! 2. ask the machine for the next status, failing with
//!    `InvalidTransition` on rejection;
//! 3. run the optional validator on the candidate, failing with every
//!    missing field;
//! 4. persist `{status, ...delta, ...signature}` in one versioned write.
//!
//! Authorization happens before, and event emission after, in the caller.

use std::sync::Arc;

use td_core::delta::{self, Delta, DeltaError};
use td_core::{BsdId, ValidationError};

use crate::error::TransitionError;
use crate::machine::{SignatureStamp, StateMachine, Transition};
use crate::repository::DocumentRepository;
use crate::validation::{check_protected_fields, Validator};

/// Caller-supplied data for a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionInput {
    /// Fields filled in at signing time (plates, acceptation, ...).
    pub delta: Delta,
    /// Required for events that record a signature.
    pub stamp: Option<SignatureStamp>,
}

impl TransitionInput {
    pub fn signed(stamp: SignatureStamp) -> Self {
        Self {
            delta: Delta::new(),
            stamp: Some(stamp),
        }
    }

    pub fn with_delta(mut self, delta: Delta) -> Self {
        self.delta = delta;
        self
    }
}

/// A persisted transition.
#[derive(Debug, Clone)]
pub struct TransitionOutcome<T: StateMachine> {
    pub from: T::Status,
    pub to: T::Status,
    pub document: T,
    pub version: i64,
    /// Every field that changed, status included.
    pub changes: Delta,
}

pub struct TransitionExecutor<T: StateMachine> {
    repository: Arc<dyn DocumentRepository<T>>,
}

impl<T: StateMachine> Clone for TransitionExecutor<T> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
        }
    }
}

impl<T: StateMachine> TransitionExecutor<T> {
    pub fn new(repository: Arc<dyn DocumentRepository<T>>) -> Self {
        Self { repository }
    }

    pub async fn transition(
        &self,
        id: &BsdId,
        event: T::Event,
        input: TransitionInput,
        validator: Option<&dyn Validator<T>>,
    ) -> Result<TransitionOutcome<T>, TransitionError> {
        let stored = self
            .repository
            .find(id)
            .await?
            .ok_or_else(|| TransitionError::NotFound { id: id.to_string() })?;
        let current = stored.document;
        if current.is_deleted() {
            return Err(TransitionError::AlreadyDeleted { id: id.to_string() });
        }

        check_protected_fields::<T>(&input.delta)?;
        let candidate = current.apply_delta(&input.delta)?.normalized();

        let from = current.status();
        let to = match candidate.transition(event) {
            Transition::Transitioned(to) => to,
            Transition::Rejected => {
                tracing::debug!(bsd_id = %id, status = %from, event = %event, "transition rejected");
                return Err(TransitionError::InvalidTransition {
                    id: id.to_string(),
                    from: from.to_string(),
                    event: event.to_string(),
                });
            }
        };
        // A step the status does not allow is refused before its fields
        // are checked.
        if let Some(validator) = validator {
            validator.validate(&candidate)?;
        }

        let mut write = input.delta;
        if T::signature_type(event).is_some() {
            let stamp = input
                .stamp
                .as_ref()
                .ok_or_else(|| ValidationError::single("signatureAuthor", "required"))?;
            delta::merge(&mut write, &T::signature_fields(event, stamp));
        }
        write.insert(
            "status".to_string(),
            serde_json::to_value(to).map_err(DeltaError::from)?,
        );

        let next = current.apply_delta(&write)?.normalized();
        let changes = delta::changes(&current.to_fields()?, &next.to_fields()?);
        let updated = self.repository.update(stored.version, next).await?;

        tracing::info!(
            bsd_id = %id,
            bsd_type = %T::TYPE,
            from = %from,
            to = %to,
            event = %event,
            "document transitioned"
        );

        Ok(TransitionOutcome {
            from,
            to,
            document: updated.document,
            version: updated.version,
            changes,
        })
    }
}
