//! # td-core — Foundational Types for the Waste-Tracking Activity Log
//!
//! Shared vocabulary for every other crate in the workspace:
//!
//! - **Identifiers** ([`identity`]): `BsdId`, `Siret`, `UserId`, `EventId`,
//!   `RevisionRequestId`. Newtypes keep a company number from being passed
//!   where a document id is expected.
//! - **Documents** ([`document`]): the closed set of document types
//!   (`BsdType`), party roles, acceptation statuses, and the [`Bsd`] trait
//!   every document record implements.
//! - **Deltas** ([`delta`]): flat field maps used for updates, event
//!   payloads, revision change sets and replay.
//! - **Errors** ([`error`]): identifier parsing errors and collect-all field
//!   validation errors.
//!
//! ## Crate Policy
//!
//! No I/O and no async here. Everything in this crate is a pure value type
//! or a pure function over values.

pub mod delta;
pub mod document;
pub mod error;
pub mod identity;

pub use delta::{Delta, DeltaError};
pub use document::{Bsd, BsdType, Party, PartyRole, SignatureType, WasteAcceptationStatus};
pub use error::{FieldError, IdentityError, ValidationError};
pub use identity::{BsdId, EventId, RevisionRequestId, Siret, UserId};
