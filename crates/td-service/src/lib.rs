//! # td-service — Workflow Facade
//!
//! Entry point for callers. A [`Workflow`] per document type wires the
//! transition executor, the event persister, the point-in-time
//! reconstructor and the revision engine over one [`Backend`]:
//!
//! ```text
//!                 ┌────────────────────────────────────────┐
//!   User ───────▶ │ Workflow<T>                            │
//!                 │   create / update / sign / delete      │──▶ DocumentRepository
//!                 │   revise / approve / cancel revision   │──▶ RevisionRepository
//!                 │   get_stream / document_at / reconcile │──▶ event stores
//!                 └────────────────────────────────────────┘
//! ```
//!
//! [`config`], [`telemetry`] and [`db`] hold the startup plumbing shared by
//! binaries.

pub mod auth;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod hooks;
pub mod telemetry;
pub mod workflow;

pub use auth::{Authorizer, CompanyDirectory, InMemoryCompanyDirectory, MembershipAuthorizer, User};
pub use config::{ConfigError, LogFormat, ServiceConfig};
pub use documents::ManagedDocument;
pub use error::ServiceError;
pub use hooks::{HookError, Hooks, Indexer, Mail, Mailer, NoopHooks};
pub use workflow::{Backend, ReconcileReport, SignInput, Workflow, Workflows};
