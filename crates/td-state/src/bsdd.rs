//! # BSDD — Dangerous Waste Form
//!
//! ```text
//! DRAFT ──seal──▶ SEALED ──emission──▶ SIGNED_BY_PRODUCER ──transport──▶ SENT
//!                   │                                                    │
//!                   └──transport (refused at pickup)──▶ REFUSED ◀──refused┤
//!                                                                   reception
//!                                                                        ▼
//!                      PROCESSED / AWAITING_GROUP ◀──operation── RECEIVED
//! ```
//!
//! `CANCELED` is only reachable through an accepted cancellation revision.
//! `AWAITING_GROUP` is reached when the operation performed is a grouping
//! operation; the waste will leave again on another form.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use td_core::{
    Bsd, BsdId, BsdType, Delta, Party, PartyRole, SignatureType, Siret, ValidationError,
    WasteAcceptationStatus,
};

use crate::machine::{signature_delta, SignatureStamp, StateMachine, TakeoverMode, Transition};
use crate::validation::{filled, positive};

// ─── Status ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BsddStatus {
    Draft,
    Sealed,
    SignedByProducer,
    Sent,
    Received,
    Processed,
    AwaitingGroup,
    Refused,
    Canceled,
}

impl BsddStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Refused | Self::Canceled)
    }
}

impl std::fmt::Display for BsddStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "DRAFT",
            Self::Sealed => "SEALED",
            Self::SignedByProducer => "SIGNED_BY_PRODUCER",
            Self::Sent => "SENT",
            Self::Received => "RECEIVED",
            Self::Processed => "PROCESSED",
            Self::AwaitingGroup => "AWAITING_GROUP",
            Self::Refused => "REFUSED",
            Self::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

// ─── Events ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BsddEvent {
    MarkAsSealed,
    SignEmission,
    /// Emission signed by the transporter with the emitter's security code.
    SignEmissionWithSecretCode,
    SignTransport,
    SignReception,
    SignOperation,
}

impl std::fmt::Display for BsddEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MarkAsSealed => "MARK_AS_SEALED",
            Self::SignEmission => "SIGN_EMISSION",
            Self::SignEmissionWithSecretCode => "SIGN_EMISSION_WITH_SECRET_CODE",
            Self::SignTransport => "SIGN_TRANSPORT",
            Self::SignReception => "SIGN_RECEPTION",
            Self::SignOperation => "SIGN_OPERATION",
        };
        f.write_str(s)
    }
}

// ─── Record ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Form {
    pub id: BsdId,
    pub status: BsddStatus,
    #[serde(default)]
    pub is_deleted: bool,

    pub emitter_company_siret: Option<Siret>,
    pub emitter_company_name: Option<String>,
    pub eco_organisme_siret: Option<Siret>,
    pub eco_organisme_name: Option<String>,
    pub recipient_company_siret: Option<Siret>,
    pub recipient_company_name: Option<String>,
    pub recipient_processing_operation: Option<String>,
    pub transporter_company_siret: Option<Siret>,
    pub transporter_company_name: Option<String>,
    pub transporter_number_plate: Option<String>,

    pub waste_details_code: Option<String>,
    pub waste_details_name: Option<String>,
    pub waste_details_quantity: Option<f64>,
    #[serde(default)]
    pub waste_details_is_dangerous: bool,

    pub emitted_by: Option<String>,
    pub emitted_at: Option<DateTime<Utc>>,
    pub taken_over_by: Option<String>,
    pub taken_over_at: Option<DateTime<Utc>>,
    pub transporter_acceptation_status: Option<WasteAcceptationStatus>,

    pub received_by: Option<String>,
    pub received_at: Option<DateTime<Utc>>,
    pub waste_acceptation_status: Option<WasteAcceptationStatus>,
    pub waste_refusal_reason: Option<String>,
    pub quantity_received: Option<f64>,

    pub processing_operation_done: Option<String>,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
}

impl Form {
    /// An empty draft.
    pub fn new(id: BsdId) -> Self {
        Self {
            id,
            status: BsddStatus::Draft,
            is_deleted: false,
            emitter_company_siret: None,
            emitter_company_name: None,
            eco_organisme_siret: None,
            eco_organisme_name: None,
            recipient_company_siret: None,
            recipient_company_name: None,
            recipient_processing_operation: None,
            transporter_company_siret: None,
            transporter_company_name: None,
            transporter_number_plate: None,
            waste_details_code: None,
            waste_details_name: None,
            waste_details_quantity: None,
            waste_details_is_dangerous: false,
            emitted_by: None,
            emitted_at: None,
            taken_over_by: None,
            taken_over_at: None,
            transporter_acceptation_status: None,
            received_by: None,
            received_at: None,
            waste_acceptation_status: None,
            waste_refusal_reason: None,
            quantity_received: None,
            processing_operation_done: None,
            processed_by: None,
            processed_at: None,
        }
    }

    fn emission_signed(&self) -> bool {
        self.emitted_by.is_some() || self.emitted_at.is_some()
    }
}

/// Operation codes after which the waste waits to be regrouped on another
/// form instead of being processed.
pub const GROUPING_OPERATION_CODES: [&str; 5] = ["D13", "D14", "D15", "R12", "R13"];

pub fn is_grouping_code(code: &str) -> bool {
    let compact: String = code
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    GROUPING_OPERATION_CODES.contains(&compact.as_str())
}

/// Waste codes flagged with a trailing `*` are dangerous.
pub fn is_dangerous_code(code: &str) -> bool {
    code.trim_end().ends_with('*')
}

impl Bsd for Form {
    type Status = BsddStatus;
    const TYPE: BsdType = BsdType::Bsdd;

    fn id(&self) -> &BsdId {
        &self.id
    }

    fn status(&self) -> BsddStatus {
        self.status
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn parties(&self) -> Vec<Party> {
        [
            (PartyRole::Emitter, &self.emitter_company_siret),
            (PartyRole::EcoOrganisme, &self.eco_organisme_siret),
            (PartyRole::Transporter, &self.transporter_company_siret),
            (PartyRole::Destination, &self.recipient_company_siret),
        ]
        .into_iter()
        .filter_map(|(role, siret)| siret.clone().map(|s| Party::new(role, s)))
        .collect()
    }
}

impl StateMachine for Form {
    type Event = BsddEvent;

    fn transition(&self, event: BsddEvent) -> Transition<BsddStatus> {
        use BsddEvent as E;
        use BsddStatus as S;
        use Transition::{Rejected, Transitioned};

        match (self.status, event) {
            (S::Draft, E::MarkAsSealed) => Transitioned(S::Sealed),
            (S::Sealed, E::SignEmission | E::SignEmissionWithSecretCode) if !self.emission_signed() => {
                Transitioned(S::SignedByProducer)
            }
            (S::Sealed | S::SignedByProducer, E::SignTransport) if self.taken_over_at.is_none() => {
                // No decision recorded at pickup means the waste was taken.
                let acceptation = self
                    .transporter_acceptation_status
                    .unwrap_or(WasteAcceptationStatus::Accepted);
                if acceptation.is_accepted() {
                    Transitioned(S::Sent)
                } else if !self.emission_signed() {
                    Transitioned(S::Refused)
                } else {
                    Rejected
                }
            }
            (S::Sent, E::SignReception) if self.received_at.is_none() => {
                // An unset acceptation is reported by the step validator.
                match self.waste_acceptation_status {
                    Some(WasteAcceptationStatus::Refused) => Transitioned(S::Refused),
                    _ => Transitioned(S::Received),
                }
            }
            (S::Received, E::SignOperation) if self.processed_at.is_none() => {
                match self.processing_operation_done.as_deref() {
                    Some(code) if is_grouping_code(code) => Transitioned(S::AwaitingGroup),
                    _ => Transitioned(S::Processed),
                }
            }
            _ => Rejected,
        }
    }

    fn signature_type(event: BsddEvent) -> Option<SignatureType> {
        match event {
            BsddEvent::MarkAsSealed => None,
            BsddEvent::SignEmission | BsddEvent::SignEmissionWithSecretCode => {
                Some(SignatureType::Emission)
            }
            BsddEvent::SignTransport => Some(SignatureType::Transport),
            BsddEvent::SignReception => Some(SignatureType::Reception),
            BsddEvent::SignOperation => Some(SignatureType::Operation),
        }
    }

    fn signature_fields(event: BsddEvent, stamp: &SignatureStamp) -> Delta {
        match event {
            BsddEvent::MarkAsSealed => Delta::new(),
            BsddEvent::SignEmission | BsddEvent::SignEmissionWithSecretCode => {
                signature_delta("emittedBy", "emittedAt", stamp)
            }
            BsddEvent::SignTransport => signature_delta("takenOverBy", "takenOverAt", stamp),
            BsddEvent::SignReception => signature_delta("receivedBy", "receivedAt", stamp),
            BsddEvent::SignOperation => signature_delta("processedBy", "processedAt", stamp),
        }
    }

    fn protected_fields() -> &'static [&'static str] {
        &[
            "id",
            "status",
            "isDeleted",
            "wasteDetailsIsDangerous",
            "emittedBy",
            "emittedAt",
            "takenOverBy",
            "takenOverAt",
            "receivedBy",
            "receivedAt",
            "processedBy",
            "processedAt",
        ]
    }

    fn signer_roles(event: BsddEvent) -> &'static [PartyRole] {
        match event {
            BsddEvent::MarkAsSealed => &[
                PartyRole::Emitter,
                PartyRole::EcoOrganisme,
                PartyRole::Transporter,
                PartyRole::Destination,
            ],
            BsddEvent::SignEmission => &[PartyRole::Emitter, PartyRole::EcoOrganisme],
            BsddEvent::SignEmissionWithSecretCode | BsddEvent::SignTransport => {
                &[PartyRole::Transporter]
            }
            BsddEvent::SignReception | BsddEvent::SignOperation => &[PartyRole::Destination],
        }
    }

    fn takeover_mode(event: BsddEvent) -> Option<TakeoverMode> {
        matches!(event, BsddEvent::SignEmissionWithSecretCode).then_some(TakeoverMode::SecretCode)
    }

    fn missing_fields(&self, event: BsddEvent) -> ValidationError {
        let mut errors = ValidationError::new();
        match event {
            BsddEvent::MarkAsSealed => {
                errors.require("emitterCompanySiret", self.emitter_company_siret.is_some());
                errors.require("recipientCompanySiret", self.recipient_company_siret.is_some());
                errors.require("wasteDetailsCode", filled(&self.waste_details_code));
            }
            BsddEvent::SignEmission | BsddEvent::SignEmissionWithSecretCode => {
                errors.require("emitterCompanySiret", self.emitter_company_siret.is_some());
                errors.require("recipientCompanySiret", self.recipient_company_siret.is_some());
                errors.require("transporterCompanySiret", self.transporter_company_siret.is_some());
                errors.require("wasteDetailsCode", filled(&self.waste_details_code));
                errors.require("wasteDetailsQuantity", positive(self.waste_details_quantity));
            }
            BsddEvent::SignTransport => {
                errors.require("transporterCompanySiret", self.transporter_company_siret.is_some());
                errors.require("transporterNumberPlate", filled(&self.transporter_number_plate));
            }
            BsddEvent::SignReception => match self.waste_acceptation_status {
                None => errors.push("wasteAcceptationStatus", "required"),
                Some(status) => {
                    if status != WasteAcceptationStatus::Accepted {
                        errors.require("wasteRefusalReason", filled(&self.waste_refusal_reason));
                    }
                    if status.is_accepted() {
                        errors.require("quantityReceived", positive(self.quantity_received));
                    }
                }
            },
            BsddEvent::SignOperation => {
                errors.require("processingOperationDone", filled(&self.processing_operation_done));
            }
        }
        errors
    }

    fn is_terminal(status: BsddStatus) -> bool {
        status.is_terminal()
    }

    fn is_deletable(&self) -> bool {
        matches!(self.status, BsddStatus::Draft | BsddStatus::Sealed)
    }

    fn normalized(mut self) -> Self {
        if let Some(code) = self.waste_details_code.as_deref() {
            self.waste_details_is_dangerous = is_dangerous_code(code);
        }
        self
    }
}

/// Status a processed form takes after its operation code was revised.
pub fn status_after_operation_revision(current: BsddStatus, operation_code: &str) -> BsddStatus {
    match current {
        BsddStatus::Processed | BsddStatus::AwaitingGroup => {
            if is_grouping_code(operation_code) {
                BsddStatus::AwaitingGroup
            } else {
                BsddStatus::Processed
            }
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn siret(n: char) -> Option<Siret> {
        Some(Siret::parse(&n.to_string().repeat(14)).unwrap())
    }

    fn sealed() -> Form {
        Form {
            status: BsddStatus::Sealed,
            emitter_company_siret: siret('1'),
            recipient_company_siret: siret('2'),
            transporter_company_siret: siret('3'),
            waste_details_code: Some("06 07 01*".into()),
            waste_details_quantity: Some(1.2),
            ..Form::new(BsdId::from("BSD-1"))
        }
    }

    fn at(form: Form, status: BsddStatus) -> Form {
        Form { status, ..form }
    }

    // ── Nominal path ────────────────────────────────────────────────

    #[test]
    fn test_draft_is_sealed_unconditionally() {
        let draft = at(sealed(), BsddStatus::Draft);
        assert_eq!(draft.transition(BsddEvent::MarkAsSealed), Transition::Transitioned(BsddStatus::Sealed));
    }

    #[test]
    fn test_emission_signature_moves_to_signed_by_producer() {
        assert_eq!(
            sealed().transition(BsddEvent::SignEmission),
            Transition::Transitioned(BsddStatus::SignedByProducer)
        );
        assert_eq!(
            sealed().transition(BsddEvent::SignEmissionWithSecretCode),
            Transition::Transitioned(BsddStatus::SignedByProducer)
        );
    }

    #[test]
    fn test_transport_from_sealed_or_signed_by_producer() {
        assert_eq!(sealed().transition(BsddEvent::SignTransport), Transition::Transitioned(BsddStatus::Sent));
        let signed = Form {
            emitted_by: Some("Jean".into()),
            emitted_at: Some(Utc::now()),
            ..at(sealed(), BsddStatus::SignedByProducer)
        };
        assert_eq!(signed.transition(BsddEvent::SignTransport), Transition::Transitioned(BsddStatus::Sent));
    }

    #[test]
    fn test_reception_and_operation() {
        let sent = Form {
            waste_acceptation_status: Some(WasteAcceptationStatus::PartiallyRefused),
            ..at(sealed(), BsddStatus::Sent)
        };
        assert_eq!(sent.transition(BsddEvent::SignReception), Transition::Transitioned(BsddStatus::Received));

        let received = Form {
            processing_operation_done: Some("R 1".into()),
            ..at(sealed(), BsddStatus::Received)
        };
        assert_eq!(received.transition(BsddEvent::SignOperation), Transition::Transitioned(BsddStatus::Processed));
    }

    #[test]
    fn test_grouping_operation_awaits_group() {
        let received = Form {
            processing_operation_done: Some("D 13".into()),
            ..at(sealed(), BsddStatus::Received)
        };
        assert_eq!(
            received.transition(BsddEvent::SignOperation),
            Transition::Transitioned(BsddStatus::AwaitingGroup)
        );
    }

    // ── Refusal branches ────────────────────────────────────────────

    #[test]
    fn test_refusal_at_pickup_requires_unsigned_emission() {
        let refused = Form {
            transporter_acceptation_status: Some(WasteAcceptationStatus::Refused),
            ..sealed()
        };
        assert_eq!(refused.transition(BsddEvent::SignTransport), Transition::Transitioned(BsddStatus::Refused));

        let signed_then_refused = Form {
            emitted_at: Some(Utc::now()),
            emitted_by: Some("Jean".into()),
            ..at(refused, BsddStatus::SignedByProducer)
        };
        assert_eq!(signed_then_refused.transition(BsddEvent::SignTransport), Transition::Rejected);
    }

    #[test]
    fn test_refusal_at_reception() {
        let sent = Form {
            waste_acceptation_status: Some(WasteAcceptationStatus::Refused),
            ..at(sealed(), BsddStatus::Sent)
        };
        assert_eq!(sent.transition(BsddEvent::SignReception), Transition::Transitioned(BsddStatus::Refused));
    }

    #[test]
    fn test_reception_without_decision_is_left_to_validation() {
        let sent = at(sealed(), BsddStatus::Sent);
        assert_eq!(sent.transition(BsddEvent::SignReception), Transition::Transitioned(BsddStatus::Received));
        assert!(sent
            .missing_fields(BsddEvent::SignReception)
            .fields()
            .contains(&"wasteAcceptationStatus"));
    }

    // ── Illegal events ──────────────────────────────────────────────

    #[test]
    fn test_operation_on_draft_is_rejected() {
        let draft = Form {
            processing_operation_done: Some("R 1".into()),
            ..at(sealed(), BsddStatus::Draft)
        };
        assert!(draft.transition(BsddEvent::SignOperation).is_rejected());
    }

    #[test]
    fn test_emission_cannot_be_signed_twice() {
        let already = Form {
            emitted_by: Some("Jean".into()),
            emitted_at: Some(Utc::now()),
            ..sealed()
        };
        assert!(already.transition(BsddEvent::SignEmission).is_rejected());
    }

    #[test]
    fn test_terminal_statuses_reject_everything() {
        let events = [
            BsddEvent::MarkAsSealed,
            BsddEvent::SignEmission,
            BsddEvent::SignTransport,
            BsddEvent::SignReception,
            BsddEvent::SignOperation,
        ];
        for status in [BsddStatus::Processed, BsddStatus::Refused, BsddStatus::Canceled] {
            for event in events {
                assert!(at(sealed(), status).transition(event).is_rejected(), "{status} / {event}");
            }
        }
    }

    // ── Validation ──────────────────────────────────────────────────

    #[test]
    fn test_emission_requirements_list_every_missing_field() {
        let bare = Form::new(BsdId::from("BSD-2"));
        let errors = bare.missing_fields(BsddEvent::SignEmission);
        assert_eq!(
            errors.fields(),
            vec![
                "emitterCompanySiret",
                "recipientCompanySiret",
                "transporterCompanySiret",
                "wasteDetailsCode",
                "wasteDetailsQuantity"
            ]
        );
    }

    #[test]
    fn test_partial_refusal_needs_reason_and_quantity() {
        let sent = Form {
            waste_acceptation_status: Some(WasteAcceptationStatus::PartiallyRefused),
            ..sealed()
        };
        assert_eq!(
            sent.missing_fields(BsddEvent::SignReception).fields(),
            vec!["wasteRefusalReason", "quantityReceived"]
        );
    }

    // ── Derived fields ──────────────────────────────────────────────

    #[test]
    fn test_dangerous_flag_follows_waste_code() {
        let form = Form { waste_details_code: Some("01 01 01".into()), waste_details_is_dangerous: true, ..sealed() };
        assert!(!form.normalized().waste_details_is_dangerous);
        let form = Form { waste_details_code: Some("06 13 04*".into()), ..sealed() };
        assert!(form.normalized().waste_details_is_dangerous);
    }

    #[test]
    fn test_operation_revision_recomputes_status() {
        assert_eq!(status_after_operation_revision(BsddStatus::Processed, "R 13"), BsddStatus::AwaitingGroup);
        assert_eq!(status_after_operation_revision(BsddStatus::AwaitingGroup, "R 1"), BsddStatus::Processed);
        assert_eq!(status_after_operation_revision(BsddStatus::Sent, "R 13"), BsddStatus::Sent);
    }

    #[test]
    fn test_json_form_uses_camel_case() {
        let value = serde_json::to_value(sealed()).unwrap();
        assert_eq!(value["status"], json!("SEALED"));
        assert_eq!(value["wasteDetailsCode"], json!("06 07 01*"));
        assert_eq!(value["emitterCompanySiret"], json!("11111111111111"));
    }
}
