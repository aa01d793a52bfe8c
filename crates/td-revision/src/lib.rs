//! # td-revision — Revision Requests
//!
//! Once a document has left its editable statuses it can only change
//! through a revision request approved by every counterpart company.
//!
//! - [`model`]: the request record, approvals and quorum rules.
//! - [`revisable`]: per-type rules (approver roles, revisable fields,
//!   blocking statuses).
//! - [`repository`]: versioned persistence, in memory and PostgreSQL.
//! - [`engine`]: creation, approval, cancellation and exactly-once
//!   application.

pub mod engine;
pub mod error;
pub mod model;
pub mod repository;
pub mod revisable;

pub use engine::{ApprovalOutcome, CreateRevision, RevisionEngine};
pub use error::{RevisionError, RevisionStoreError};
pub use model::{required_approvers, Approval, ApprovalStatus, Decision, RevisionRequest, RevisionStatus};
pub use repository::{InMemoryRevisionRepository, PgRevisionRepository, RevisionRepository, StoredRevision};
pub use revisable::Revisable;
