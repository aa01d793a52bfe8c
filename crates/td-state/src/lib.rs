//! # td-state — Signature Workflow
//!
//! One record type and one signature state machine per document type:
//!
//! | Type      | Record     | Machine events                               |
//! |-----------|------------|----------------------------------------------|
//! | BSDD      | [`Form`]   | seal, emission, transport, reception, operation |
//! | BSDA      | [`Bsda`]   | emission, work, transport, operation         |
//! | BSDASRI   | [`Bsdasri`]| emission, transport, direct takeover, reception, operation |
//!
//! Machines are pure ([`machine::StateMachine::transition`]); the
//! [`TransitionExecutor`] validates, consults the machine and persists the
//! result through a [`DocumentRepository`].

pub mod bsda;
pub mod bsdasri;
pub mod bsdd;
pub mod error;
pub mod executor;
pub mod machine;
pub mod pg;
pub mod repository;
pub mod validation;

pub use bsda::{Bsda, BsdaEvent, BsdaStatus, BsdaType};
pub use bsdasri::{Bsdasri, BsdasriEvent, BsdasriStatus};
pub use bsdd::{BsddEvent, BsddStatus, Form};
pub use error::{RepositoryError, TransitionError};
pub use executor::{TransitionExecutor, TransitionInput, TransitionOutcome};
pub use machine::{SignatureStamp, StateMachine, TakeoverMode, Transition};
pub use pg::PgDocumentRepository;
pub use repository::{DocumentRepository, InMemoryDocumentRepository, StoredDocument};
pub use validation::{StepRequirements, Validator};
