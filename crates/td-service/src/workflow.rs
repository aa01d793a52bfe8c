//! # Document Workflow
//!
//! One [`Workflow`] per document type. Every mutation follows the same
//! sequence:
//!
//! ```text
//! authorize ──▶ validate ──▶ write document ──▶ append event ──▶ hooks
//!                               (versioned)      (non-fatal)    (spawned)
//! ```
//!
//! The document write is the commit point. An event that fails to append
//! is logged and counted by the persister, and [`Workflow::reconcile`]
//! reports the resulting gap between the log and the live record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use sqlx::PgPool;

use td_core::delta::{self, Delta};
use td_core::{BsdId, PartyRole, RevisionRequestId, Siret};
use td_events::{
    fold, ArchiveEventStore, Event, EventAction, EventPersister, InMemoryArchiveStore,
    InMemoryPrimaryStore, NewEvent, PgArchiveEventStore, PgPrimaryEventStore, PrimaryEventStore,
    StateReconstructor, StreamReader,
};
use td_revision::{
    ApprovalOutcome, ApprovalStatus, CreateRevision, InMemoryRevisionRepository, PgRevisionRepository,
    RevisionEngine, RevisionRepository, RevisionRequest,
};
use td_state::validation::check_protected_fields;
use td_state::{
    Bsda, Bsdasri, DocumentRepository, Form, InMemoryDocumentRepository, PgDocumentRepository,
    SignatureStamp, StepRequirements, StoredDocument, TakeoverMode, TransitionExecutor,
    TransitionInput, TransitionOutcome, Validator,
};

use crate::auth::{
    acting_company, Authorizer, CompanyDirectory, InMemoryCompanyDirectory, MembershipAuthorizer, User,
};
use crate::config::ServiceConfig;
use crate::documents::ManagedDocument;
use crate::error::ServiceError;
use crate::hooks::{Hooks, Mail};

// ─── Backend ────────────────────────────────────────────────────────────

/// Stores and collaborators shared by every document type.
#[derive(Clone)]
pub struct Backend {
    pub primary: Arc<dyn PrimaryEventStore>,
    /// `None` when the archive is not consulted.
    pub archive: Option<Arc<dyn ArchiveEventStore>>,
    pub revisions: Arc<dyn RevisionRepository>,
    pub authorizer: Arc<dyn Authorizer>,
    pub companies: Arc<dyn CompanyDirectory>,
    pub hooks: Hooks,
}

impl Backend {
    fn reader(&self) -> StreamReader {
        match &self.archive {
            Some(archive) => StreamReader::new(Arc::clone(&self.primary), Arc::clone(archive)),
            None => StreamReader::primary_only(Arc::clone(&self.primary)),
        }
    }
}

// ─── Inputs and reports ─────────────────────────────────────────────────

/// What a signer provides.
#[derive(Debug, Clone, Default)]
pub struct SignInput {
    /// Name of the person signing.
    pub author: String,
    /// Fields filled in at signing time.
    pub delta: Delta,
    /// Emitter security code, for signatures taken over with it.
    pub security_code: Option<String>,
}

impl SignInput {
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            ..Self::default()
        }
    }

    pub fn with_delta(mut self, delta: Delta) -> Self {
        self.delta = delta;
        self
    }

    pub fn with_security_code(mut self, code: impl Into<String>) -> Self {
        self.security_code = Some(code.into());
        self
    }
}

/// Comparison of a live document with the fold of its activity stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub bsd_id: BsdId,
    pub event_count: usize,
    /// Fields whose folded value differs from the live record.
    pub divergent_fields: Vec<String>,
}

impl ReconcileReport {
    pub fn is_consistent(&self) -> bool {
        self.divergent_fields.is_empty()
    }
}

// ─── Workflow ───────────────────────────────────────────────────────────

pub struct Workflow<T: ManagedDocument> {
    documents: Arc<dyn DocumentRepository<T>>,
    executor: TransitionExecutor<T>,
    persister: EventPersister,
    reconstructor: StateReconstructor,
    revisions: RevisionEngine<T>,
    authorizer: Arc<dyn Authorizer>,
    companies: Arc<dyn CompanyDirectory>,
    hooks: Hooks,
}

impl<T: ManagedDocument> Workflow<T> {
    pub fn new(documents: Arc<dyn DocumentRepository<T>>, backend: &Backend) -> Self {
        let persister = EventPersister::new(Arc::clone(&backend.primary));
        Self {
            executor: TransitionExecutor::new(Arc::clone(&documents)),
            revisions: RevisionEngine::new(
                Arc::clone(&documents),
                Arc::clone(&backend.revisions),
                persister.clone(),
            ),
            reconstructor: StateReconstructor::new(backend.reader()),
            persister,
            documents,
            authorizer: Arc::clone(&backend.authorizer),
            companies: Arc::clone(&backend.companies),
            hooks: backend.hooks.clone(),
        }
    }

    // ─── Authoring ──────────────────────────────────────────────────────

    /// Create a document from `fields`. The user must belong to one of the
    /// companies named on it.
    pub async fn create(&self, user: &User, fields: Delta) -> Result<T, ServiceError> {
        check_protected_fields::<T>(&fields)?;
        let document = T::draft(BsdId::generate(T::TYPE))
            .apply_delta(&fields)?
            .normalized();
        self.ensure_party(user, &document)?;

        let stored = self.documents.create(document).await?;
        let id = stored.document.id().clone();
        let content = stored.document.to_fields()?;
        self.emit(NewEvent::document(T::TYPE, id.as_str(), EventAction::Created, content), user)
            .await;

        tracing::info!(bsd_id = %id, bsd_type = %T::TYPE, user = %user.id, "document created");
        self.hooks.index(T::TYPE, &id);
        Ok(stored.document)
    }

    /// Change fields of a document still open to direct edition. An update
    /// that changes nothing writes nothing.
    pub async fn update(&self, user: &User, id: &BsdId, fields: Delta) -> Result<T, ServiceError> {
        let stored = self.live(id).await?;
        self.ensure_party(user, &stored.document)?;
        if !stored.document.is_editable() {
            return Err(ServiceError::UserInput(format!(
                "document {id} is {} and can only change through a revision request",
                stored.document.status()
            )));
        }
        check_protected_fields::<T>(&fields)?;

        let next = stored.document.apply_delta(&fields)?.normalized();
        self.ensure_party(user, &next)?;
        let changes = delta::changes(&stored.document.to_fields()?, &next.to_fields()?);
        if changes.is_empty() {
            return Ok(stored.document);
        }

        let updated = self.documents.update(stored.version, next).await?;
        self.emit(NewEvent::document(T::TYPE, id.as_str(), EventAction::Updated, changes), user)
            .await;
        tracing::info!(bsd_id = %id, bsd_type = %T::TYPE, "document updated");
        self.hooks.index(T::TYPE, id);
        Ok(updated.document)
    }

    /// Run a workflow step on behalf of the company of `user` allowed to
    /// perform it.
    pub async fn sign(
        &self,
        user: &User,
        id: &BsdId,
        event: T::Event,
        input: SignInput,
    ) -> Result<TransitionOutcome<T>, ServiceError> {
        let stored = self.live(id).await?;
        let document = &stored.document;
        let signer = acting_company(self.authorizer.as_ref(), user, document, T::signer_roles(event))
            .ok_or_else(|| ServiceError::forbidden(format!("no company of the user may perform {event} on {id}")))?;

        match T::takeover_mode(event) {
            Some(TakeoverMode::SecretCode) => {
                self.check_security_code(document, input.security_code.as_deref())
                    .await?
            }
            Some(TakeoverMode::Direct) => self.check_direct_takeover(document).await?,
            None => {}
        }

        let stamp = SignatureStamp::new(input.author, Utc::now());
        let requirements = StepRequirements::<T>::new(event);
        let outcome = self
            .executor
            .transition(
                id,
                event,
                TransitionInput::signed(stamp).with_delta(input.delta),
                Some(&requirements as &dyn Validator<T>),
            )
            .await?;

        self.emit_transition(&outcome, event, user).await;
        tracing::info!(bsd_id = %id, signer = %signer, event = %event, to = %outcome.to, "step signed");

        self.hooks.index(T::TYPE, id);
        if T::is_refused(outcome.to) {
            self.hooks.mail(Mail {
                template: "waste_refused",
                bsd_id: id.clone(),
                recipients: sirets(outcome.document.parties().into_iter().map(|p| p.siret)),
            });
        }
        Ok(outcome)
    }

    /// Soft-delete a document that has not gone past its first signature.
    pub async fn delete(&self, user: &User, id: &BsdId) -> Result<T, ServiceError> {
        let stored = self.live(id).await?;
        self.ensure_party(user, &stored.document)?;
        if !stored.document.is_deletable() {
            return Err(ServiceError::UserInput(format!(
                "document {id} is {} and can no longer be deleted",
                stored.document.status()
            )));
        }

        let mut flag = Delta::new();
        flag.insert("isDeleted".to_string(), Value::Bool(true));
        let next = stored.document.apply_delta(&flag)?;
        let updated = self.documents.update(stored.version, next).await?;
        self.emit(NewEvent::document(T::TYPE, id.as_str(), EventAction::Deleted, flag), user)
            .await;
        tracing::info!(bsd_id = %id, bsd_type = %T::TYPE, "document deleted");
        self.hooks.index(T::TYPE, id);
        Ok(updated.document)
    }

    // ─── Reads ──────────────────────────────────────────────────────────

    /// The live record, deleted or not.
    pub async fn get(&self, id: &BsdId) -> Result<T, ServiceError> {
        self.documents
            .find(id)
            .await?
            .map(|stored| stored.document)
            .ok_or_else(|| ServiceError::not_found("document", id))
    }

    pub async fn get_stream(&self, id: &BsdId, until: Option<DateTime<Utc>>) -> Result<Vec<Event>, ServiceError> {
        Ok(self.reconstructor.reader().get_stream(id.as_str(), until).await?)
    }

    /// The document as it was at `at` (now when `None`), rebuilt from its
    /// activity events.
    pub async fn document_at(&self, id: &BsdId, at: Option<DateTime<Utc>>) -> Result<T, ServiceError> {
        self.reconstructor
            .get_document_from_activity_events::<T>(id.as_str(), at)
            .await?
            .ok_or_else(|| ServiceError::not_found("document", id))
    }

    pub async fn reconcile(&self, id: &BsdId) -> Result<ReconcileReport, ServiceError> {
        let live = self.get(id).await?.to_fields()?;
        let events = self.get_stream(id, None).await?;
        let folded = fold(&events).unwrap_or_default();
        let divergent_fields = delta::divergent_fields(&live, &folded);
        if !divergent_fields.is_empty() {
            tracing::warn!(
                bsd_id = %id,
                fields = ?divergent_fields,
                "activity log diverges from live document"
            );
        }
        Ok(ReconcileReport {
            bsd_id: id.clone(),
            event_count: events.len(),
            divergent_fields,
        })
    }

    // ─── Revisions ──────────────────────────────────────────────────────

    pub async fn create_revision_request(
        &self,
        user: &User,
        id: &BsdId,
        content: Delta,
        is_canceled: bool,
        comment: Option<String>,
    ) -> Result<RevisionRequest, ServiceError> {
        let stored = self.live(id).await?;
        let author = acting_company(self.authorizer.as_ref(), user, &stored.document, T::approver_roles())
            .ok_or_else(|| ServiceError::forbidden(format!("no company of the user may revise {id}")))?;

        let request = self
            .revisions
            .create_revision_request(
                CreateRevision {
                    bsd_id: id.clone(),
                    author_siret: author,
                    content,
                    is_canceled,
                    comment,
                },
                &user.id,
            )
            .await?;

        if request.applied_at.is_some() {
            self.hooks.index(T::TYPE, id);
        } else {
            self.hooks.mail(Mail {
                template: "revision_request_pending",
                bsd_id: id.clone(),
                recipients: sirets(request.approvals.iter().map(|a| a.approver_siret.clone())),
            });
        }
        Ok(request)
    }

    /// Answer a revision request for the user's company among its approvers.
    pub async fn submit_approval(
        &self,
        user: &User,
        request_id: &RevisionRequestId,
        approved: bool,
        comment: Option<String>,
    ) -> Result<ApprovalOutcome, ServiceError> {
        let request = self.revisions.get_revision_request(request_id).await?;
        let approver = request
            .approvals
            .iter()
            .filter(|a| self.authorizer.is_company_member(user, &a.approver_siret))
            .min_by_key(|a| a.status != ApprovalStatus::Pending)
            .map(|a| a.approver_siret.clone())
            .ok_or_else(|| ServiceError::forbidden(format!("no company of the user approves {request_id}")))?;

        let outcome = self
            .revisions
            .submit_approval(request_id, &approver, approved, comment, &user.id)
            .await?;

        if outcome.applied {
            self.hooks.index(T::TYPE, &outcome.request.bsd_id);
        }
        if outcome.request.status.is_resolved() {
            self.hooks.mail(Mail {
                template: "revision_request_resolved",
                bsd_id: outcome.request.bsd_id.clone(),
                recipients: vec![outcome.request.author_siret.to_string()],
            });
        }
        Ok(outcome)
    }

    pub async fn cancel_revision_request(
        &self,
        user: &User,
        request_id: &RevisionRequestId,
    ) -> Result<RevisionRequest, ServiceError> {
        let request = self.revisions.get_revision_request(request_id).await?;
        if !self.authorizer.is_company_member(user, &request.author_siret) {
            return Err(ServiceError::forbidden(format!(
                "only the author of {request_id} may cancel it"
            )));
        }
        Ok(self
            .revisions
            .cancel_revision_request(request_id, &request.author_siret, &user.id)
            .await?)
    }

    pub async fn revision_requests(&self, id: &BsdId) -> Result<Vec<RevisionRequest>, ServiceError> {
        Ok(self.revisions.revision_requests_for(id).await?)
    }

    // ─── Helpers ────────────────────────────────────────────────────────

    async fn live(&self, id: &BsdId) -> Result<StoredDocument<T>, ServiceError> {
        let stored = self
            .documents
            .find(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("document", id))?;
        if stored.document.is_deleted() {
            return Err(ServiceError::AlreadyDeleted { id: id.to_string() });
        }
        Ok(stored)
    }

    fn ensure_party(&self, user: &User, document: &T) -> Result<(), ServiceError> {
        let member = document
            .parties()
            .iter()
            .any(|p| self.authorizer.is_company_member(user, &p.siret));
        if member {
            Ok(())
        } else {
            Err(ServiceError::forbidden(format!(
                "user {} belongs to no company named on the document",
                user.id
            )))
        }
    }

    /// The code must match the current code of the emitter or its
    /// eco-organisme.
    async fn check_security_code(&self, document: &T, code: Option<&str>) -> Result<(), ServiceError> {
        let code = code
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ServiceError::UserInput("a security code is required".to_string()))?;
        for party in document.parties().into_iter().filter(|p| p.role.is_producer_side()) {
            if self.companies.security_code(&party.siret).await.as_deref() == Some(code) {
                return Ok(());
            }
        }
        Err(ServiceError::UserInput("invalid security code".to_string()))
    }

    async fn check_direct_takeover(&self, document: &T) -> Result<(), ServiceError> {
        let emitter = document
            .parties()
            .into_iter()
            .find(|p| p.role == PartyRole::Emitter)
            .ok_or_else(|| ServiceError::UserInput("the document has no emitter".to_string()))?;
        if self.companies.allows_direct_takeover(&emitter.siret).await {
            Ok(())
        } else {
            Err(ServiceError::UserInput(format!(
                "company {} does not allow direct takeover",
                emitter.siret
            )))
        }
    }

    async fn emit_transition(&self, outcome: &TransitionOutcome<T>, event: T::Event, user: &User) {
        let id = outcome.document.id().as_str();
        let Some(signature_type) = T::signature_type(event) else {
            self.emit(
                NewEvent::document(T::TYPE, id, EventAction::Updated, outcome.changes.clone()),
                user,
            )
            .await;
            return;
        };

        if !T::SPLIT_SIGNATURE_EVENTS {
            let signed = NewEvent::document(T::TYPE, id, EventAction::Signed, outcome.changes.clone())
                .with_data("signatureType", json!(signature_type));
            self.emit(signed, user).await;
            return;
        }

        let mut fields = outcome.changes.clone();
        let mut status = Delta::new();
        if let Some(value) = fields.remove("status") {
            status.insert("status".to_string(), value);
        }
        if !fields.is_empty() {
            self.emit(NewEvent::document(T::TYPE, id, EventAction::Updated, fields), user)
                .await;
        }
        let signed = NewEvent::document(T::TYPE, id, EventAction::Signed, status)
            .with_data("signatureType", json!(signature_type));
        self.emit(signed, user).await;
    }

    async fn emit(&self, event: NewEvent, user: &User) {
        // Failures are logged and counted by the persister.
        let _ = self.persister.persist_event(event.with_actor(&user.id)).await;
    }
}

fn sirets(sirets: impl Iterator<Item = Siret>) -> Vec<String> {
    let mut out: Vec<String> = sirets.map(|s| s.to_string()).collect();
    out.sort();
    out.dedup();
    out
}

// ─── Workflows ──────────────────────────────────────────────────────────

/// One workflow per document type over a shared backend.
pub struct Workflows {
    pub bsdd: Workflow<Form>,
    pub bsda: Workflow<Bsda>,
    pub bsdasri: Workflow<Bsdasri>,
}

impl Workflows {
    pub fn new(
        backend: &Backend,
        bsdd: Arc<dyn DocumentRepository<Form>>,
        bsda: Arc<dyn DocumentRepository<Bsda>>,
        bsdasri: Arc<dyn DocumentRepository<Bsdasri>>,
    ) -> Self {
        Self {
            bsdd: Workflow::new(bsdd, backend),
            bsda: Workflow::new(bsda, backend),
            bsdasri: Workflow::new(bsdasri, backend),
        }
    }

    /// Everything in memory, with membership authorization and no hooks.
    pub fn in_memory() -> Self {
        let backend = Backend {
            primary: Arc::new(InMemoryPrimaryStore::new()),
            archive: Some(Arc::new(InMemoryArchiveStore::new())),
            revisions: Arc::new(InMemoryRevisionRepository::new()),
            authorizer: Arc::new(MembershipAuthorizer),
            companies: Arc::new(InMemoryCompanyDirectory::new()),
            hooks: Hooks::default(),
        };
        Self::new(
            &backend,
            Arc::new(InMemoryDocumentRepository::new()),
            Arc::new(InMemoryDocumentRepository::new()),
            Arc::new(InMemoryDocumentRepository::new()),
        )
    }

    pub fn postgres(
        pool: PgPool,
        config: &ServiceConfig,
        authorizer: Arc<dyn Authorizer>,
        companies: Arc<dyn CompanyDirectory>,
        hooks: Hooks,
    ) -> Self {
        let archive = config
            .archive_events
            .then(|| Arc::new(PgArchiveEventStore::new(pool.clone())) as Arc<dyn ArchiveEventStore>);
        let backend = Backend {
            primary: Arc::new(PgPrimaryEventStore::new(pool.clone())),
            archive,
            revisions: Arc::new(PgRevisionRepository::new(pool.clone())),
            authorizer,
            companies,
            hooks,
        };
        Self::new(
            &backend,
            Arc::new(PgDocumentRepository::new(pool.clone())),
            Arc::new(PgDocumentRepository::new(pool.clone())),
            Arc::new(PgDocumentRepository::new(pool)),
        )
    }
}
