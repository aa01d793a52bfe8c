//! # td-events — Activity Event Log
//!
//! Every document mutation appends an immutable event to the document's
//! stream. This crate owns that log:
//!
//! - [`event`]: event model and type naming (`BsdaCreated`, ...).
//! - [`store`]: ports for the primary (relational) and archive (document)
//!   stores, with [`memory`] and [`pg`] adapters.
//! - [`reader`]: the dual-store stream reader.
//! - [`persister`]: appends events after a mutation.
//! - [`projector`]: folds a stream into a document snapshot, optionally as
//!   of a past instant.

pub mod error;
pub mod event;
pub mod memory;
pub mod persister;
pub mod pg;
pub mod projector;
pub mod reader;
pub mod store;

pub use error::{ProjectionError, StoreError};
pub use event::{Event, EventAction, NewEvent};
pub use memory::{InMemoryArchiveStore, InMemoryPrimaryStore};
pub use persister::EventPersister;
pub use pg::{PgArchiveEventStore, PgPrimaryEventStore};
pub use projector::{fold, fold_as, StateReconstructor};
pub use reader::StreamReader;
pub use store::{ArchiveEventStore, PrimaryEventStore, StreamQuery};
