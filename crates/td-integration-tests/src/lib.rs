//! Shared fixtures for the cross-crate tests: an in-memory deployment with
//! handles on its event stores and company settings.

use std::sync::Arc;

use serde_json::Value;

use td_core::{Delta, Siret};
use td_events::{ArchiveEventStore, InMemoryArchiveStore, InMemoryPrimaryStore, StoreError};
use td_revision::InMemoryRevisionRepository;
use td_service::{
    Backend, Hooks, InMemoryCompanyDirectory, MembershipAuthorizer, User, Workflows,
};
use td_state::InMemoryDocumentRepository;

pub const EMITTER: char = '1';
pub const DESTINATION: char = '2';
pub const TRANSPORTER: char = '3';
pub const ECO_ORGANISME: char = '4';
pub const WORKER: char = '5';

pub fn siret(n: char) -> Siret {
    Siret::parse(&n.to_string().repeat(14)).expect("fixture siret is 14 digits")
}

/// A user belonging to one company, named after it.
pub fn member_of(n: char) -> User {
    User::new(format!("user-{n}"), vec![siret(n)])
}

pub fn fields(value: Value) -> Delta {
    td_core::delta::from_value(value).expect("fixture fields are an object")
}

pub struct Deployment {
    pub workflows: Workflows,
    pub primary: InMemoryPrimaryStore,
    pub archive: InMemoryArchiveStore,
    pub companies: InMemoryCompanyDirectory,
}

impl Deployment {
    pub fn new() -> Self {
        let primary = InMemoryPrimaryStore::new();
        let archive = InMemoryArchiveStore::new();
        let companies = InMemoryCompanyDirectory::new();
        let backend = Backend {
            primary: Arc::new(primary.clone()),
            archive: Some(Arc::new(archive.clone())),
            revisions: Arc::new(InMemoryRevisionRepository::new()),
            authorizer: Arc::new(MembershipAuthorizer),
            companies: Arc::new(companies.clone()),
            hooks: Hooks::default(),
        };
        let workflows = Workflows::new(
            &backend,
            Arc::new(InMemoryDocumentRepository::new()),
            Arc::new(InMemoryDocumentRepository::new()),
            Arc::new(InMemoryDocumentRepository::new()),
        );
        Self {
            workflows,
            primary,
            archive,
            companies,
        }
    }

    /// Copy every primary event to the archive, as the archival job does
    /// before the primary copies expire.
    pub async fn archive_all(&self) -> Result<usize, StoreError> {
        self.archive.insert_many(&self.primary.all()).await
    }

    /// Event types written to `stream_id`, in append order.
    pub fn event_types(&self, stream_id: &str) -> Vec<String> {
        self.primary
            .all()
            .into_iter()
            .filter(|e| e.stream_id == stream_id)
            .map(|e| e.event_type)
            .collect()
    }
}

impl Default for Deployment {
    fn default() -> Self {
        Self::new()
    }
}
