//! # Signature State Machine Contract
//!
//! Every document type runs the same workflow shape:
//!
//! ```text
//! Draft ──▶ Sealed ──▶ [ReadyForTakeover] ──▶ Sent ──▶ Received ──▶ Processed
//!                │              │               │
//!                └──────────────┴───────────────┴──▶ Refused
//! ```
//!
//! A machine is a pure function of the current record and the requested
//! event. It never mutates anything: the executor persists the outcome.
//! Guards re-check signature fields whatever status path led here, so a
//! step can never be signed twice.

use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use td_core::{Bsd, Delta, PartyRole, SignatureType, ValidationError};

/// Outcome of evaluating an event against a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S> {
    Transitioned(S),
    Rejected,
}

impl<S> Transition<S> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

/// Who signed a step, and when.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureStamp {
    pub author: String,
    pub signed_at: DateTime<Utc>,
}

impl SignatureStamp {
    pub fn new(author: impl Into<String>, signed_at: DateTime<Utc>) -> Self {
        Self {
            author: author.into(),
            signed_at,
        }
    }

    pub(crate) fn author_value(&self) -> Value {
        json!(self.author)
    }

    pub(crate) fn date_value(&self) -> Value {
        json!(self.signed_at)
    }
}

/// How a transporter takes waste over without the usual emitter signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TakeoverMode {
    /// The transporter presents the emitter's security code.
    SecretCode,
    /// The emitter company allows takeover without any emitter signature.
    Direct,
}

/// A document type with a signature workflow.
pub trait StateMachine: Bsd {
    type Event: Copy + Eq + fmt::Debug + fmt::Display + Send + Sync + 'static;

    /// Evaluate `event` against this record.
    fn transition(&self, event: Self::Event) -> Transition<Self::Status>;

    /// Signature step an event records, if any.
    fn signature_type(event: Self::Event) -> Option<SignatureType>;

    /// Fields written by a successful signature.
    fn signature_fields(event: Self::Event, stamp: &SignatureStamp) -> Delta;

    /// Fields a caller may never set through a delta: status, signatures,
    /// and anything derived.
    fn protected_fields() -> &'static [&'static str];

    /// Roles allowed to perform `event`.
    fn signer_roles(event: Self::Event) -> &'static [PartyRole];

    fn takeover_mode(_event: Self::Event) -> Option<TakeoverMode> {
        None
    }

    /// Fields that must be filled before `event` may be performed.
    fn missing_fields(&self, event: Self::Event) -> ValidationError;

    fn is_terminal(status: Self::Status) -> bool;

    /// Whether the document may still be soft-deleted.
    fn is_deletable(&self) -> bool;

    /// Recompute derived fields after a change.
    fn normalized(self) -> Self {
        self
    }
}

/// Shorthand used by the per-type `signature_fields` implementations.
pub(crate) fn signature_delta(author_field: &str, date_field: &str, stamp: &SignatureStamp) -> Delta {
    let mut delta = Delta::new();
    delta.insert(author_field.to_string(), stamp.author_value());
    delta.insert(date_field.to_string(), stamp.date_value());
    delta
}
