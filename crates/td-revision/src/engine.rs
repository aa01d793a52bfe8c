//! # Revision Engine
//!
//! Orchestrates revision requests against one document type:
//!
//! ```text
//! create ──▶ [approvers] ──▶ PENDING ──approve×N──▶ ACCEPTED ──▶ apply
//!                 │                  └──refuse────▶ REFUSED
//!                 └─(none)──────────────────────────────────────▶ apply
//! ```
//!
//! Each answer is saved with an optimistic version check. Only the caller
//! whose save moved the request from PENDING to ACCEPTED applies it, so the
//! content reaches the document once and exactly one
//! `<Type>RevisionRequestApplied` event is written on the document stream.
//! When the document write fails, the request is restored to its state
//! before the deciding answer, which can then be submitted again.
//! Lifecycle events (`Created`, `Accepted`, `Refused`, `Cancelled`) are
//! written on the request's own stream.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use td_core::delta::{self, Delta, DeltaError};
use td_core::{BsdId, RevisionRequestId, Siret, UserId, ValidationError};
use td_events::{EventAction, EventPersister, NewEvent};
use td_state::{DocumentRepository, RepositoryError};

use crate::error::{RevisionError, RevisionStoreError};
use crate::model::{required_approvers, Decision, RevisionRequest, RevisionStatus};
use crate::repository::{RevisionRepository, StoredRevision};
use crate::revisable::Revisable;

/// Attempts at a versioned write before giving up with `Conflict`.
const MAX_ATTEMPTS: usize = 3;

/// A new revision request.
#[derive(Debug, Clone)]
pub struct CreateRevision {
    pub bsd_id: BsdId,
    pub author_siret: Siret,
    pub content: Delta,
    pub is_canceled: bool,
    pub comment: Option<String>,
}

/// State of a request after one answer was recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalOutcome {
    pub request: RevisionRequest,
    /// This answer completed the quorum and the content was applied.
    pub applied: bool,
}

pub struct RevisionEngine<T: Revisable> {
    documents: Arc<dyn DocumentRepository<T>>,
    revisions: Arc<dyn RevisionRepository>,
    persister: EventPersister,
}

impl<T: Revisable> Clone for RevisionEngine<T> {
    fn clone(&self) -> Self {
        Self {
            documents: Arc::clone(&self.documents),
            revisions: Arc::clone(&self.revisions),
            persister: self.persister.clone(),
        }
    }
}

impl<T: Revisable> RevisionEngine<T> {
    pub fn new(
        documents: Arc<dyn DocumentRepository<T>>,
        revisions: Arc<dyn RevisionRepository>,
        persister: EventPersister,
    ) -> Self {
        Self {
            documents,
            revisions,
            persister,
        }
    }

    // ─── Queries ────────────────────────────────────────────────────────

    pub async fn get_revision_request(&self, id: &RevisionRequestId) -> Result<RevisionRequest, RevisionError> {
        Ok(self.find(id).await?.request)
    }

    pub async fn revision_requests_for(&self, bsd_id: &BsdId) -> Result<Vec<RevisionRequest>, RevisionError> {
        Ok(self.revisions.find_for_document(bsd_id).await?)
    }

    // ─── Creation ───────────────────────────────────────────────────────

    pub async fn create_revision_request(
        &self,
        input: CreateRevision,
        actor: &UserId,
    ) -> Result<RevisionRequest, RevisionError> {
        let content = delta::remove_empty(&input.content);
        if input.is_canceled && !content.is_empty() {
            return Err(RevisionError::CancelWithChanges);
        }
        if !input.is_canceled && content.is_empty() {
            return Err(RevisionError::EmptyRevision);
        }
        check_revisable_fields::<T>(&content)?;

        let id = &input.bsd_id;
        let document = self.live_document(id).await?;
        if let Some(reason) = document.revision_blocker() {
            return Err(RevisionError::NotRevisable {
                id: id.to_string(),
                reason,
            });
        }
        if input.is_canceled && !document.is_cancellable() {
            return Err(RevisionError::NotCancellable {
                id: id.to_string(),
                status: document.status().to_string(),
            });
        }
        // Content that cannot be applied is refused now rather than at quorum.
        if !input.is_canceled {
            document.revised(&content)?;
        }

        let approvers = required_approvers(&document, &input.author_siret, T::approver_roles())?;
        let pending = self.revisions.find_for_document(id).await?;
        if pending.iter().any(|r| {
            r.status == RevisionStatus::Pending
                && r.author_siret == input.author_siret
                && r.overlaps(&content, input.is_canceled)
        }) {
            return Err(RevisionError::DuplicatePending { bsd_id: id.to_string() });
        }

        let mut request = RevisionRequest::new(
            T::TYPE,
            id.clone(),
            input.author_siret,
            content,
            input.is_canceled,
            input.comment,
            approvers,
        );
        // Nobody has to agree: the document is revised before the request
        // is recorded, so a failed write leaves no accepted request behind.
        let applied = if request.approvals.is_empty() {
            request.status = RevisionStatus::Accepted;
            let content = self.write_document(&request).await?;
            request.applied_at = Some(Utc::now());
            Some(content)
        } else {
            None
        };

        let stored = self.revisions.insert(request).await?;
        tracing::info!(
            revision_request_id = %stored.request.id,
            bsd_id = %id,
            bsd_type = %T::TYPE,
            approvers = stored.request.approvals.len(),
            "revision request created"
        );
        self.emit_lifecycle(&stored.request, EventAction::RevisionRequestCreated, actor)
            .await;

        if let Some(content) = applied {
            self.emit_lifecycle(&stored.request, EventAction::RevisionRequestAccepted, actor)
                .await;
            self.emit_applied(&stored.request, content, actor).await;
        }
        Ok(stored.request)
    }

    // ─── Approval ───────────────────────────────────────────────────────

    /// Record `approver`'s answer. The answer that completes the quorum
    /// applies the request before returning.
    pub async fn submit_approval(
        &self,
        id: &RevisionRequestId,
        approver: &Siret,
        approved: bool,
        comment: Option<String>,
        actor: &UserId,
    ) -> Result<ApprovalOutcome, RevisionError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let stored = self.find(id).await?;
            let mut request = stored.request.clone();
            let decision = request.record_decision(approver, approved, comment.clone(), actor.as_str(), Utc::now())?;

            if decision == Decision::Quorum {
                self.check_applicable(&request).await?;
            }

            let saved = match self.revisions.save(request, stored.version).await {
                Ok(saved) => saved,
                Err(RevisionStoreError::VersionConflict { .. }) => {
                    tracing::debug!(revision_request_id = %id, attempt, "approval raced, retrying");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            tracing::info!(
                revision_request_id = %id,
                approver = %approver,
                approved,
                status = %saved.request.status,
                "revision approval recorded"
            );

            return match decision {
                Decision::Pending { .. } => Ok(ApprovalOutcome {
                    request: saved.request,
                    applied: false,
                }),
                Decision::Refused => {
                    self.emit_lifecycle(&saved.request, EventAction::RevisionRequestRefused, actor)
                        .await;
                    Ok(ApprovalOutcome {
                        request: saved.request,
                        applied: false,
                    })
                }
                Decision::Quorum => {
                    let claimed_version = saved.version;
                    match self.apply(saved, actor).await {
                        Ok(applied) => {
                            self.emit_lifecycle(&applied.request, EventAction::RevisionRequestAccepted, actor)
                                .await;
                            Ok(ApprovalOutcome {
                                request: applied.request,
                                applied: true,
                            })
                        }
                        Err(e) => {
                            self.release(stored.request, claimed_version, &e).await;
                            Err(e)
                        }
                    }
                }
            };
        }
        Err(RevisionError::Conflict { id: id.to_string() })
    }

    /// Withdraw a pending request. Only its author may.
    pub async fn cancel_revision_request(
        &self,
        id: &RevisionRequestId,
        author: &Siret,
        actor: &UserId,
    ) -> Result<RevisionRequest, RevisionError> {
        for _ in 0..MAX_ATTEMPTS {
            let stored = self.find(id).await?;
            let mut request = stored.request.clone();
            request.cancel(author)?;
            match self.revisions.save(request, stored.version).await {
                Ok(saved) => {
                    tracing::info!(revision_request_id = %id, "revision request cancelled");
                    self.emit_lifecycle(&saved.request, EventAction::RevisionRequestCancelled, actor)
                        .await;
                    return Ok(saved.request);
                }
                Err(RevisionStoreError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(RevisionError::Conflict { id: id.to_string() })
    }

    // ─── Application ────────────────────────────────────────────────────

    /// Write an accepted request onto the live document and record it.
    async fn apply(&self, stored: StoredRevision, actor: &UserId) -> Result<StoredRevision, RevisionError> {
        let content = self.write_document(&stored.request).await?;
        self.emit_applied(&stored.request, content, actor).await;

        let mut applied = stored.request.clone();
        applied.applied_at = Some(Utc::now());
        match self.revisions.save(applied, stored.version).await {
            Ok(saved) => {
                tracing::info!(
                    revision_request_id = %saved.request.id,
                    bsd_id = %saved.request.bsd_id,
                    "revision request applied"
                );
                Ok(saved)
            }
            Err(e) => {
                tracing::warn!(
                    revision_request_id = %stored.request.id,
                    error = %e,
                    "revision applied but appliedAt could not be recorded"
                );
                Ok(stored)
            }
        }
    }

    /// Put back the request as it was before the deciding answer, after
    /// its application failed.
    async fn release(&self, previous: RevisionRequest, claimed_version: i64, cause: &RevisionError) {
        let id = previous.id.clone();
        match self.revisions.save(previous, claimed_version).await {
            Ok(_) => tracing::warn!(
                revision_request_id = %id,
                error = %cause,
                "revision could not be applied; deciding answer rolled back"
            ),
            Err(e) => tracing::error!(
                revision_request_id = %id,
                error = %e,
                cause = %cause,
                "revision accepted but neither applied nor rolled back"
            ),
        }
    }

    async fn emit_applied(&self, request: &RevisionRequest, content: Delta, actor: &UserId) {
        let event = NewEvent::document(
            T::TYPE,
            request.bsd_id.as_str(),
            EventAction::RevisionRequestApplied,
            content,
        )
        .with_data("revisionRequestId", json!(request.id.to_string()))
        .with_actor(actor);
        // Logged and counted by the persister; the document write stands.
        let _ = self.persister.persist_event(event).await;
    }

    /// Revise the document and return the applied content: the requested
    /// fields plus every field the revision changed.
    async fn write_document(&self, request: &RevisionRequest) -> Result<Delta, RevisionError> {
        for _ in 0..MAX_ATTEMPTS {
            let stored = self
                .documents
                .find(&request.bsd_id)
                .await?
                .ok_or_else(|| RevisionError::DocumentNotFound {
                    id: request.bsd_id.to_string(),
                })?;
            if stored.document.is_deleted() {
                return Err(RevisionError::DocumentDeleted {
                    id: request.bsd_id.to_string(),
                });
            }
            let next = revised_document(&stored.document, request)?;
            let mut content = revision_delta::<T>(request)?;
            delta::merge(
                &mut content,
                &delta::changes(&stored.document.to_fields()?, &next.to_fields()?),
            );
            match self.documents.update(stored.version, next).await {
                Ok(_) => return Ok(content),
                Err(RepositoryError::VersionConflict { .. }) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(RevisionError::Conflict {
            id: request.id.to_string(),
        })
    }

    async fn check_applicable(&self, request: &RevisionRequest) -> Result<(), RevisionError> {
        let document = self.live_document(&request.bsd_id).await?;
        revised_document(&document, request)?;
        Ok(())
    }

    // ─── Helpers ────────────────────────────────────────────────────────

    async fn find(&self, id: &RevisionRequestId) -> Result<StoredRevision, RevisionError> {
        self.revisions
            .find(id)
            .await?
            .ok_or_else(|| RevisionError::NotFound { id: id.to_string() })
    }

    async fn live_document(&self, id: &BsdId) -> Result<T, RevisionError> {
        let stored = self
            .documents
            .find(id)
            .await?
            .ok_or_else(|| RevisionError::DocumentNotFound { id: id.to_string() })?;
        if stored.document.is_deleted() {
            return Err(RevisionError::DocumentDeleted { id: id.to_string() });
        }
        Ok(stored.document)
    }

    async fn emit_lifecycle(&self, request: &RevisionRequest, action: EventAction, actor: &UserId) {
        let mut content = Delta::new();
        content.insert("bsdId".to_string(), json!(request.bsd_id));
        content.insert("status".to_string(), json!(request.status));
        if action == EventAction::RevisionRequestCreated {
            content.insert("authorSiret".to_string(), json!(request.author_siret));
            content.insert("content".to_string(), json!(request.content));
            content.insert("isCanceled".to_string(), json!(request.is_canceled));
            content.insert("approvals".to_string(), json!(request.approvals));
        }
        let event = NewEvent::document(T::TYPE, request.id.to_string(), action, content).with_actor(actor);
        let _ = self.persister.persist_event(event).await;
    }
}

fn check_revisable_fields<T: Revisable>(content: &Delta) -> Result<(), ValidationError> {
    let mut errors = ValidationError::new();
    for key in content.keys() {
        if !T::revisable_fields().contains(&key.as_str()) {
            errors.push(key.clone(), "cannot be revised");
        }
    }
    errors.into_result()
}

/// The fields a request sets: its content, or the canceled status.
fn revision_delta<T: Revisable>(request: &RevisionRequest) -> Result<Delta, DeltaError> {
    if request.is_canceled {
        let mut cancel = Delta::new();
        cancel.insert("status".to_string(), serde_json::to_value(T::canceled_status())?);
        return Ok(cancel);
    }
    Ok(request.content.clone())
}

fn revised_document<T: Revisable>(document: &T, request: &RevisionRequest) -> Result<T, DeltaError> {
    let delta = revision_delta::<T>(request)?;
    if request.is_canceled {
        return document.apply_delta(&delta);
    }
    document.revised(&delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use td_events::InMemoryPrimaryStore;
    use td_state::{BsddStatus, Form, InMemoryDocumentRepository};

    use crate::model::ApprovalStatus;
    use crate::repository::InMemoryRevisionRepository;

    fn siret(n: char) -> Siret {
        Siret::parse(&n.to_string().repeat(14)).unwrap()
    }

    const EMITTER: char = '1';
    const RECIPIENT: char = '2';
    const ECO: char = '4';

    struct Harness {
        engine: RevisionEngine<Form>,
        documents: InMemoryDocumentRepository<Form>,
        events: InMemoryPrimaryStore,
    }

    async fn harness(form: Form) -> Harness {
        let documents = InMemoryDocumentRepository::<Form>::new();
        documents.create(form).await.unwrap();
        let events = InMemoryPrimaryStore::new();
        let engine = RevisionEngine::new(
            Arc::new(documents.clone()),
            Arc::new(InMemoryRevisionRepository::new()),
            EventPersister::new(Arc::new(events.clone())),
        );
        Harness {
            engine,
            documents,
            events,
        }
    }

    fn processed() -> Form {
        Form {
            status: BsddStatus::Processed,
            emitter_company_siret: Some(siret(EMITTER)),
            recipient_company_siret: Some(siret(RECIPIENT)),
            transporter_company_siret: Some(siret('3')),
            waste_details_code: Some("01 01 01".into()),
            waste_details_quantity: Some(1.0),
            processing_operation_done: Some("R1".into()),
            ..Form::new(BsdId::from("BSD-1"))
        }
    }

    fn revise(author: char, content: serde_json::Value) -> CreateRevision {
        CreateRevision {
            bsd_id: BsdId::from("BSD-1"),
            author_siret: siret(author),
            content: delta::from_value(content).unwrap(),
            is_canceled: false,
            comment: None,
        }
    }

    fn actor() -> UserId {
        UserId("user-1".into())
    }

    fn applied_events(events: &InMemoryPrimaryStore) -> usize {
        events
            .all()
            .iter()
            .filter(|e| e.event_type == "BsddRevisionRequestApplied")
            .count()
    }

    // ── Creation guards ─────────────────────────────────────────────

    #[tokio::test]
    async fn test_create_rejects_non_revisable_field() {
        let h = harness(processed()).await;
        let err = h
            .engine
            .create_revision_request(revise(EMITTER, json!({"transporterNumberPlate": "AB-123"})), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, RevisionError::InvalidFields(_)));
    }

    #[tokio::test]
    async fn test_create_rejects_empty_and_mixed_requests() {
        let h = harness(processed()).await;
        let err = h
            .engine
            .create_revision_request(revise(EMITTER, json!({"wasteDetailsName": null})), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, RevisionError::EmptyRevision));

        let mixed = CreateRevision {
            is_canceled: true,
            ..revise(EMITTER, json!({"wasteDetailsName": "x"}))
        };
        let err = h.engine.create_revision_request(mixed, &actor()).await.unwrap_err();
        assert!(matches!(err, RevisionError::CancelWithChanges));
    }

    #[tokio::test]
    async fn test_create_rejects_sealed_form() {
        let h = harness(Form { status: BsddStatus::Sealed, ..processed() }).await;
        let err = h
            .engine
            .create_revision_request(revise(EMITTER, json!({"wasteDetailsName": "x"})), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, RevisionError::NotRevisable { .. }));
    }

    #[tokio::test]
    async fn test_processed_form_cannot_be_canceled() {
        let h = harness(processed()).await;
        let cancel = CreateRevision {
            is_canceled: true,
            ..revise(EMITTER, json!({}))
        };
        let err = h.engine.create_revision_request(cancel, &actor()).await.unwrap_err();
        assert!(matches!(err, RevisionError::NotCancellable { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_pending_request_is_refused() {
        let h = harness(processed()).await;
        h.engine
            .create_revision_request(revise(EMITTER, json!({"wasteDetailsName": "a"})), &actor())
            .await
            .unwrap();
        let err = h
            .engine
            .create_revision_request(revise(EMITTER, json!({"wasteDetailsName": "b"})), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, RevisionError::DuplicatePending { .. }));
        h.engine
            .create_revision_request(revise(EMITTER, json!({"quantityReceived": 2.0})), &actor())
            .await
            .unwrap();
    }

    // ── Quorum and application ──────────────────────────────────────

    #[tokio::test]
    async fn test_quorum_applies_once_with_one_event() {
        let h = harness(processed()).await;
        let request = h
            .engine
            .create_revision_request(revise(EMITTER, json!({"wasteDetailsCode": "06 07 01*"})), &actor())
            .await
            .unwrap();
        assert_eq!(request.status, RevisionStatus::Pending);
        assert_eq!(request.approvals.len(), 1);

        let outcome = h
            .engine
            .submit_approval(&request.id, &siret(RECIPIENT), true, None, &actor())
            .await
            .unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.request.status, RevisionStatus::Accepted);
        assert!(outcome.request.applied_at.is_some());

        let form = h.documents.find(&BsdId::from("BSD-1")).await.unwrap().unwrap().document;
        assert_eq!(form.waste_details_code.as_deref(), Some("06 07 01*"));
        assert!(form.waste_details_is_dangerous);
        assert_eq!(applied_events(&h.events), 1);

        let err = h
            .engine
            .submit_approval(&request.id, &siret(RECIPIENT), true, None, &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, RevisionError::AlreadyResolved { .. }));
        assert_eq!(applied_events(&h.events), 1);
    }

    #[tokio::test]
    async fn test_applied_event_carries_changes_and_request_id() {
        let h = harness(processed()).await;
        let request = h
            .engine
            .create_revision_request(revise(EMITTER, json!({"processingOperationDone": "R13"})), &actor())
            .await
            .unwrap();
        h.engine
            .submit_approval(&request.id, &siret(RECIPIENT), true, None, &actor())
            .await
            .unwrap();

        let events = h.events.all();
        let applied = events
            .iter()
            .find(|e| e.stream_id == "BSD-1" && e.event_type == "BsddRevisionRequestApplied")
            .unwrap();
        assert_eq!(applied.data["revisionRequestId"], json!(request.id.to_string()));
        let content = applied.content().unwrap();
        assert_eq!(content["processingOperationDone"], json!("R13"));
        assert_eq!(content["status"], json!("AWAITING_GROUP"));
    }

    #[tokio::test]
    async fn test_applied_event_keeps_requested_fields_that_did_not_change() {
        let h = harness(processed()).await;
        let request = h
            .engine
            .create_revision_request(
                revise(EMITTER, json!({"wasteDetailsQuantity": 1.0, "wasteDetailsCode": "06 13 04*"})),
                &actor(),
            )
            .await
            .unwrap();
        h.engine
            .submit_approval(&request.id, &siret(RECIPIENT), true, None, &actor())
            .await
            .unwrap();

        let events = h.events.all();
        let applied = events
            .iter()
            .find(|e| e.event_type == "BsddRevisionRequestApplied")
            .unwrap();
        let content = applied.content().unwrap();
        assert_eq!(content["wasteDetailsQuantity"], json!(1.0));
        assert_eq!(content["wasteDetailsCode"], json!("06 13 04*"));
        assert_eq!(content["wasteDetailsIsDangerous"], json!(true));
    }

    #[tokio::test]
    async fn test_veto_leaves_document_untouched() {
        let h = harness(Form {
            eco_organisme_siret: Some(siret(ECO)),
            ..processed()
        })
        .await;
        let request = h
            .engine
            .create_revision_request(revise(RECIPIENT, json!({"wasteDetailsName": "x"})), &actor())
            .await
            .unwrap();
        assert_eq!(request.approvals.len(), 2);

        let outcome = h
            .engine
            .submit_approval(&request.id, &siret(EMITTER), false, Some("no".into()), &actor())
            .await
            .unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.request.status, RevisionStatus::Refused);

        let form = h.documents.find(&BsdId::from("BSD-1")).await.unwrap().unwrap().document;
        assert_eq!(form.waste_details_name, None);
        assert_eq!(applied_events(&h.events), 0);
        assert!(h.events.all().iter().any(|e| e.event_type == "BsddRevisionRequestRefused"));
    }

    #[tokio::test]
    async fn test_linked_producer_approval_completes_quorum() {
        let h = harness(Form {
            eco_organisme_siret: Some(siret(ECO)),
            ..processed()
        })
        .await;
        let request = h
            .engine
            .create_revision_request(revise(RECIPIENT, json!({"wasteDetailsName": "x"})), &actor())
            .await
            .unwrap();
        let outcome = h
            .engine
            .submit_approval(&request.id, &siret(ECO), true, None, &actor())
            .await
            .unwrap();
        assert!(outcome.applied);
        let emitter = outcome.request.approval(&siret(EMITTER)).unwrap();
        assert_eq!(emitter.status, ApprovalStatus::Accepted);
    }

    #[tokio::test]
    async fn test_request_without_approvers_applies_at_creation() {
        let h = harness(Form {
            recipient_company_siret: None,
            ..processed()
        })
        .await;
        let request = h
            .engine
            .create_revision_request(revise(EMITTER, json!({"wasteDetailsName": "x"})), &actor())
            .await
            .unwrap();
        assert_eq!(request.status, RevisionStatus::Accepted);
        assert!(request.applied_at.is_some());
        assert_eq!(applied_events(&h.events), 1);
    }

    #[tokio::test]
    async fn test_accepted_cancellation_cancels_document() {
        let h = harness(Form { status: BsddStatus::Sent, ..processed() }).await;
        let cancel = CreateRevision {
            is_canceled: true,
            ..revise(EMITTER, json!({}))
        };
        let request = h.engine.create_revision_request(cancel, &actor()).await.unwrap();
        h.engine
            .submit_approval(&request.id, &siret(RECIPIENT), true, None, &actor())
            .await
            .unwrap();
        let form = h.documents.find(&BsdId::from("BSD-1")).await.unwrap().unwrap().document;
        assert_eq!(form.status, BsddStatus::Canceled);
    }

    #[tokio::test]
    async fn test_author_cancels_pending_request() {
        let h = harness(processed()).await;
        let request = h
            .engine
            .create_revision_request(revise(EMITTER, json!({"wasteDetailsName": "x"})), &actor())
            .await
            .unwrap();
        let err = h
            .engine
            .cancel_revision_request(&request.id, &siret(RECIPIENT), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, RevisionError::NotAuthor { .. }));

        let canceled = h
            .engine
            .cancel_revision_request(&request.id, &siret(EMITTER), &actor())
            .await
            .unwrap();
        assert_eq!(canceled.status, RevisionStatus::Canceled);
        let err = h
            .engine
            .submit_approval(&request.id, &siret(RECIPIENT), true, None, &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, RevisionError::AlreadyResolved { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_approvals_apply_exactly_once() {
        let h = harness(Form {
            eco_organisme_siret: Some(siret(ECO)),
            ..processed()
        })
        .await;
        let request = h
            .engine
            .create_revision_request(revise(RECIPIENT, json!({"quantityReceived": 3.5})), &actor())
            .await
            .unwrap();

        let (emitter, eco, user) = (siret(EMITTER), siret(ECO), actor());
        let (a, b) = tokio::join!(
            h.engine.submit_approval(&request.id, &emitter, true, None, &user),
            h.engine.submit_approval(&request.id, &eco, true, None, &user),
        );
        let applied = [a, b].into_iter().filter(|r| matches!(r, Ok(o) if o.applied)).count();
        assert_eq!(applied, 1);
        assert_eq!(applied_events(&h.events), 1);
    }

    #[tokio::test]
    async fn test_event_store_outage_does_not_fail_application() {
        let h = harness(processed()).await;
        let request = h
            .engine
            .create_revision_request(revise(EMITTER, json!({"wasteDetailsName": "x"})), &actor())
            .await
            .unwrap();
        h.events.set_unavailable(true);
        let outcome = h
            .engine
            .submit_approval(&request.id, &siret(RECIPIENT), true, None, &actor())
            .await
            .unwrap();
        assert!(outcome.applied);
        let form = h.documents.find(&BsdId::from("BSD-1")).await.unwrap().unwrap().document;
        assert_eq!(form.waste_details_name.as_deref(), Some("x"));
    }

    // ── Failed application ──────────────────────────────────────────

    /// Document store whose next `update` calls fail with a database error.
    struct FailingUpdates {
        inner: InMemoryDocumentRepository<Form>,
        failures: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl DocumentRepository<Form> for FailingUpdates {
        async fn find(&self, id: &BsdId) -> Result<Option<td_state::StoredDocument<Form>>, RepositoryError> {
            self.inner.find(id).await
        }

        async fn create(&self, document: Form) -> Result<td_state::StoredDocument<Form>, RepositoryError> {
            self.inner.create(document).await
        }

        async fn update(
            &self,
            expected_version: i64,
            document: Form,
        ) -> Result<td_state::StoredDocument<Form>, RepositoryError> {
            let pending = self.failures.load(Ordering::SeqCst);
            if pending > 0 {
                self.failures.store(pending - 1, Ordering::SeqCst);
                return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
            }
            self.inner.update(expected_version, document).await
        }
    }

    #[tokio::test]
    async fn test_failed_document_write_rolls_back_deciding_answer() {
        let documents = InMemoryDocumentRepository::<Form>::new();
        documents.create(processed()).await.unwrap();
        let failing = Arc::new(FailingUpdates {
            inner: documents.clone(),
            failures: AtomicUsize::new(1),
        });
        let events = InMemoryPrimaryStore::new();
        let revisions = InMemoryRevisionRepository::new();
        let engine = RevisionEngine::<Form>::new(
            failing,
            Arc::new(revisions.clone()),
            EventPersister::new(Arc::new(events.clone())),
        );
        let request = engine
            .create_revision_request(revise(EMITTER, json!({"wasteDetailsCode": "06 13 04*"})), &actor())
            .await
            .unwrap();

        let err = engine
            .submit_approval(&request.id, &siret(RECIPIENT), true, None, &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, RevisionError::Documents(_)));
        let restored = engine.get_revision_request(&request.id).await.unwrap();
        assert_eq!(restored.status, RevisionStatus::Pending);
        assert_eq!(restored.approval(&siret(RECIPIENT)).unwrap().status, ApprovalStatus::Pending);
        assert_eq!(applied_events(&events), 0);
        assert!(events.all().iter().all(|e| e.event_type != "BsddRevisionRequestAccepted"));

        let outcome = engine
            .submit_approval(&request.id, &siret(RECIPIENT), true, None, &actor())
            .await
            .unwrap();
        assert!(outcome.applied);
        assert!(outcome.request.applied_at.is_some());
        let form = documents.find(&BsdId::from("BSD-1")).await.unwrap().unwrap().document;
        assert_eq!(form.waste_details_code.as_deref(), Some("06 13 04*"));
        assert_eq!(applied_events(&events), 1);
    }

    #[tokio::test]
    async fn test_failed_write_at_creation_records_nothing() {
        let documents = InMemoryDocumentRepository::<Form>::new();
        documents
            .create(Form { recipient_company_siret: None, ..processed() })
            .await
            .unwrap();
        let events = InMemoryPrimaryStore::new();
        let engine = RevisionEngine::<Form>::new(
            Arc::new(FailingUpdates {
                inner: documents.clone(),
                failures: AtomicUsize::new(1),
            }),
            Arc::new(InMemoryRevisionRepository::new()),
            EventPersister::new(Arc::new(events.clone())),
        );

        let err = engine
            .create_revision_request(revise(EMITTER, json!({"wasteDetailsName": "x"})), &actor())
            .await
            .unwrap_err();
        assert!(matches!(err, RevisionError::Documents(_)));
        assert!(engine
            .revision_requests_for(&BsdId::from("BSD-1"))
            .await
            .unwrap()
            .is_empty());
        assert!(events.all().is_empty());
    }
}
