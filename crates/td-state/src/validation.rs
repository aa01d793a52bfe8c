//! Pre-transition validators.
//!
//! A validator runs against the candidate record (current fields with the
//! caller's delta merged) before the machine is consulted. It reports every
//! failing field at once.

use td_core::ValidationError;

use crate::machine::StateMachine;

pub trait Validator<T>: Send + Sync {
    fn validate(&self, document: &T) -> Result<(), ValidationError>;
}

impl<T, F> Validator<T> for F
where
    F: Fn(&T) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, document: &T) -> Result<(), ValidationError> {
        self(document)
    }
}

/// Fields required by a signature step, as declared by the document type.
#[derive(Debug, Clone)]
pub struct StepRequirements<T: StateMachine> {
    event: T::Event,
}

impl<T: StateMachine> StepRequirements<T> {
    pub fn new(event: T::Event) -> Self {
        Self { event }
    }
}

impl<T: StateMachine> Validator<T> for StepRequirements<T> {
    fn validate(&self, document: &T) -> Result<(), ValidationError> {
        document.missing_fields(self.event).into_result()
    }
}

/// Rejects deltas touching fields only transitions may write.
pub fn check_protected_fields<T: StateMachine>(
    delta: &td_core::Delta,
) -> Result<(), ValidationError> {
    let mut errors = ValidationError::new();
    for field in T::protected_fields() {
        if delta.contains_key(*field) {
            errors.push(*field, "cannot be set directly");
        }
    }
    errors.into_result()
}

/// Present and not blank.
pub(crate) fn filled(value: &Option<String>) -> bool {
    value.as_deref().map_or(false, |v| !v.trim().is_empty())
}

pub(crate) fn positive(value: Option<f64>) -> bool {
    value.map_or(false, |v| v > 0.0)
}
