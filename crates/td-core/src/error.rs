//! # Error Types
//!
//! Identifier parsing errors and the collect-all field validation error.
//! A validation run never stops at the first failing field: every problem
//! is reported at once so the caller can fix the document in one pass.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("invalid SIRET {0:?}: expected 14 digits")]
    InvalidSiret(String),

    #[error("invalid revision request id {0:?}")]
    InvalidRevisionRequestId(String),
}

/// One failing field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name as it appears in the document's JSON form.
    pub field: String,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Every failing field of a validation run.
#[derive(Error, Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[error("validation failed: {}", render(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

fn render(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    pub fn new() -> Self {
        Self::default()
    }

    /// A validation error with a single failing field.
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Record `field` as missing unless `present` holds.
    pub fn require(&mut self, field: &str, present: bool) {
        if !present {
            self.push(field, "required");
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn fields(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.field.as_str()).collect()
    }

    /// `Ok(())` when nothing failed, `Err(self)` otherwise.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collects_every_failing_field() {
        let mut errors = ValidationError::new();
        errors.require("emitterCompanySiret", false);
        errors.require("wasteDetailsCode", true);
        errors.require("wasteDetailsQuantity", false);
        let err = errors.into_result().unwrap_err();
        assert_eq!(err.fields(), vec!["emitterCompanySiret", "wasteDetailsQuantity"]);
        let msg = err.to_string();
        assert!(msg.contains("emitterCompanySiret: required"));
        assert!(msg.contains("wasteDetailsQuantity: required"));
    }

    #[test]
    fn test_empty_validation_is_ok() {
        assert!(ValidationError::new().into_result().is_ok());
    }
}
