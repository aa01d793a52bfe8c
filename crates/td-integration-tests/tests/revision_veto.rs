//! A single refusal closes a revision request without touching the
//! document.

use serde_json::json;

use td_integration_tests::{fields, member_of, siret, Deployment, DESTINATION, EMITTER, WORKER};
use td_revision::{ApprovalStatus, RevisionStatus};
use td_service::SignInput;
use td_state::{BsdaEvent, BsdaStatus};

async fn pending_request(d: &Deployment) -> (td_core::BsdId, td_core::RevisionRequestId) {
    let emitter = member_of(EMITTER);
    let bsda = d
        .workflows
        .bsda
        .create(
            &emitter,
            fields(json!({
                "emitterCompanySiret": siret(EMITTER),
                "workerCompanySiret": siret(WORKER),
                "destinationCompanySiret": siret(DESTINATION),
                "wasteCode": "17 06 05*",
                "weightValue": 3.0,
            })),
        )
        .await
        .unwrap();
    d.workflows
        .bsda
        .sign(&emitter, &bsda.id, BsdaEvent::SignEmission, SignInput::new("Marie"))
        .await
        .unwrap();
    let request = d
        .workflows
        .bsda
        .create_revision_request(&emitter, &bsda.id, fields(json!({"wasteCode": "17 06 01*"})), false, None)
        .await
        .unwrap();
    (bsda.id, request.id)
}

#[tokio::test]
async fn test_refusal_closes_request() {
    let d = Deployment::new();
    let (id, request_id) = pending_request(&d).await;

    let outcome = d
        .workflows
        .bsda
        .submit_approval(&member_of(WORKER), &request_id, false, Some("code inchangé".into()))
        .await
        .unwrap();
    assert!(!outcome.applied);
    assert_eq!(outcome.request.status, RevisionStatus::Refused);
    assert!(outcome.request.applied_at.is_none());
    let refused = outcome.request.approval(&siret(WORKER)).unwrap();
    assert_eq!(refused.status, ApprovalStatus::Refused);

    let live = d.workflows.bsda.get(&id).await.unwrap();
    assert_eq!(live.waste_code.as_deref(), Some("17 06 05*"));
    assert_eq!(live.status, BsdaStatus::SignedByProducer);
}

#[tokio::test]
async fn test_later_approval_after_veto_is_rejected() {
    let d = Deployment::new();
    let (id, request_id) = pending_request(&d).await;
    d.workflows
        .bsda
        .submit_approval(&member_of(WORKER), &request_id, false, None)
        .await
        .unwrap();

    let err = d
        .workflows
        .bsda
        .submit_approval(&member_of(DESTINATION), &request_id, true, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "ALREADY_RESOLVED");
    assert!(d
        .event_types(id.as_str())
        .iter()
        .all(|t| t != "BsdaRevisionRequestApplied"));
    assert_eq!(
        d.event_types(&request_id.to_string()),
        vec!["BsdaRevisionRequestCreated", "BsdaRevisionRequestRefused"]
    );
}

#[tokio::test]
async fn test_new_request_allowed_after_refusal() {
    let d = Deployment::new();
    let (id, request_id) = pending_request(&d).await;
    d.workflows
        .bsda
        .submit_approval(&member_of(DESTINATION), &request_id, false, None)
        .await
        .unwrap();

    let retry = d
        .workflows
        .bsda
        .create_revision_request(&member_of(EMITTER), &id, fields(json!({"wasteCode": "17 06 01*"})), false, None)
        .await
        .unwrap();
    assert_eq!(retry.status, RevisionStatus::Pending);
    assert_eq!(d.workflows.bsda.revision_requests(&id).await.unwrap().len(), 2);
}
