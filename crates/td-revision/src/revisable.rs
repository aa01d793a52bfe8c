//! Per-type revision rules: who approves, what may be revised, and from
//! which statuses.

use td_core::{Bsd, Delta, DeltaError, PartyRole};
use td_state::bsdd::status_after_operation_revision;
use td_state::{Bsda, BsdaStatus, Bsdasri, BsdasriStatus, BsddStatus, Form, StateMachine};

/// A document type that accepts revision requests.
pub trait Revisable: StateMachine {
    /// Roles that may author a revision request and must approve one.
    fn approver_roles() -> &'static [PartyRole];

    /// Fields a revision request may change.
    fn revisable_fields() -> &'static [&'static str];

    /// Why the document cannot be revised in its current status, if it can't.
    fn revision_blocker(&self) -> Option<&'static str>;

    /// Whether a cancellation request is allowed in the current status.
    fn is_cancellable(&self) -> bool;

    fn canceled_status() -> Self::Status;

    /// The document with an accepted revision's content applied.
    fn revised(&self, content: &Delta) -> Result<Self, DeltaError> {
        Ok(self.apply_delta(content)?.normalized())
    }
}

// ─── BSDD ───────────────────────────────────────────────────────────────

impl Revisable for Form {
    fn approver_roles() -> &'static [PartyRole] {
        &[PartyRole::Emitter, PartyRole::EcoOrganisme, PartyRole::Destination]
    }

    fn revisable_fields() -> &'static [&'static str] {
        &[
            "wasteDetailsCode",
            "wasteDetailsName",
            "wasteDetailsQuantity",
            "quantityReceived",
            "processingOperationDone",
            "recipientProcessingOperation",
        ]
    }

    fn revision_blocker(&self) -> Option<&'static str> {
        match self.status {
            BsddStatus::Draft | BsddStatus::Sealed => Some("the form can still be modified directly"),
            BsddStatus::Refused => Some("the waste was refused"),
            BsddStatus::Canceled => Some("the form is canceled"),
            _ => None,
        }
    }

    fn is_cancellable(&self) -> bool {
        matches!(self.status, BsddStatus::SignedByProducer | BsddStatus::Sent)
    }

    fn canceled_status() -> BsddStatus {
        BsddStatus::Canceled
    }

    fn revised(&self, content: &Delta) -> Result<Self, DeltaError> {
        let mut next = self.apply_delta(content)?;
        if content.contains_key("processingOperationDone") {
            if let Some(code) = next.processing_operation_done.as_deref() {
                next.status = status_after_operation_revision(next.status, code);
            }
        }
        Ok(next.normalized())
    }
}

// ─── BSDA ───────────────────────────────────────────────────────────────

impl Revisable for Bsda {
    fn approver_roles() -> &'static [PartyRole] {
        &[
            PartyRole::Emitter,
            PartyRole::EcoOrganisme,
            PartyRole::Worker,
            PartyRole::Destination,
        ]
    }

    fn revisable_fields() -> &'static [&'static str] {
        &[
            "wasteCode",
            "wasteMaterialName",
            "destinationReceptionWeight",
            "destinationOperationCode",
        ]
    }

    fn revision_blocker(&self) -> Option<&'static str> {
        match self.status {
            BsdaStatus::Initial => Some("the form can still be modified directly"),
            BsdaStatus::Refused => Some("the waste was refused"),
            BsdaStatus::Canceled => Some("the form is canceled"),
            _ => None,
        }
    }

    fn is_cancellable(&self) -> bool {
        matches!(
            self.status,
            BsdaStatus::SignedByProducer | BsdaStatus::SignedByWorker | BsdaStatus::Sent
        )
    }

    fn canceled_status() -> BsdaStatus {
        BsdaStatus::Canceled
    }
}

// ─── BSDASRI ────────────────────────────────────────────────────────────

impl Revisable for Bsdasri {
    fn approver_roles() -> &'static [PartyRole] {
        &[PartyRole::Emitter, PartyRole::EcoOrganisme, PartyRole::Destination]
    }

    fn revisable_fields() -> &'static [&'static str] {
        &["wasteCode", "destinationOperationCode"]
    }

    fn revision_blocker(&self) -> Option<&'static str> {
        match self.status {
            BsdasriStatus::Initial => Some("the form can still be modified directly"),
            BsdasriStatus::Refused => Some("the waste was refused"),
            BsdasriStatus::Canceled => Some("the form is canceled"),
            _ => None,
        }
    }

    fn is_cancellable(&self) -> bool {
        matches!(self.status, BsdasriStatus::SignedByProducer | BsdasriStatus::Sent)
    }

    fn canceled_status() -> BsdasriStatus {
        BsdasriStatus::Canceled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use td_core::BsdId;

    fn processed(code: &str) -> Form {
        Form {
            status: BsddStatus::Processed,
            processing_operation_done: Some(code.into()),
            waste_details_code: Some("01 01 01".into()),
            ..Form::new(BsdId::from("BSD-1"))
        }
    }

    fn content(value: serde_json::Value) -> Delta {
        td_core::delta::from_value(value).unwrap()
    }

    #[test]
    fn test_grouping_operation_moves_form_to_awaiting_group() {
        let next = processed("R1")
            .revised(&content(json!({"processingOperationDone": "D 13"})))
            .unwrap();
        assert_eq!(next.status, BsddStatus::AwaitingGroup);
    }

    #[test]
    fn test_final_operation_moves_form_back_to_processed() {
        let form = Form { status: BsddStatus::AwaitingGroup, ..processed("R13") };
        let next = form.revised(&content(json!({"processingOperationDone": "R1"}))).unwrap();
        assert_eq!(next.status, BsddStatus::Processed);
    }

    #[test]
    fn test_waste_code_revision_recomputes_danger() {
        let next = processed("R1")
            .revised(&content(json!({"wasteDetailsCode": "06 07 01*"})))
            .unwrap();
        assert!(next.waste_details_is_dangerous);
        assert_eq!(next.status, BsddStatus::Processed);
    }

    #[test]
    fn test_blockers() {
        assert!(Form::new(BsdId::from("BSD-1")).revision_blocker().is_some());
        assert!(processed("R1").revision_blocker().is_none());
        assert!(Bsda::new(BsdId::from("BSDA-1")).revision_blocker().is_some());
        let sent = Bsdasri { status: BsdasriStatus::Sent, ..Bsdasri::new(BsdId::from("DASRI-1")) };
        assert!(sent.revision_blocker().is_none());
        assert!(sent.is_cancellable());
    }

    #[test]
    fn test_processed_documents_are_not_cancellable() {
        assert!(!processed("R1").is_cancellable());
    }
}
