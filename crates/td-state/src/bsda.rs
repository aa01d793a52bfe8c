//! # BSDA — Asbestos Waste
//!
//! ```text
//! INITIAL ──emission──▶ SIGNED_BY_PRODUCER ──work──▶ SIGNED_BY_WORKER
//!    │                        │                             │
//!    │                        └────transport (no worker)────┤ transport
//!    │                                                      ▼
//!    └──operation (collection 2710)──▶ PROCESSED ◀──operation── SENT
//!                                      REFUSED   ◀──refused─────┘
//! ```
//!
//! A document has a work step only when a worker company is named and not
//! disabled, and when it is not a gathering, reshipment or 2710 collection
//! document. Drafts cannot be signed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use td_core::{
    Bsd, BsdId, BsdType, Delta, Party, PartyRole, SignatureType, Siret, ValidationError,
    WasteAcceptationStatus,
};

use crate::machine::{signature_delta, SignatureStamp, StateMachine, Transition};
use crate::validation::{filled, positive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BsdaStatus {
    Initial,
    SignedByProducer,
    SignedByWorker,
    Sent,
    Processed,
    Refused,
    Canceled,
}

impl BsdaStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Refused | Self::Canceled)
    }
}

impl std::fmt::Display for BsdaStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initial => "INITIAL",
            Self::SignedByProducer => "SIGNED_BY_PRODUCER",
            Self::SignedByWorker => "SIGNED_BY_WORKER",
            Self::Sent => "SENT",
            Self::Processed => "PROCESSED",
            Self::Refused => "REFUSED",
            Self::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

/// Kind of asbestos document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BsdaType {
    #[default]
    #[serde(rename = "OTHER")]
    Other,
    /// Drop-off at a waste collection facility: only emitter and
    /// destination take part.
    #[serde(rename = "COLLECTION_2710")]
    Collection2710,
    #[serde(rename = "GATHERING")]
    Gathering,
    #[serde(rename = "RESHIPMENT")]
    Reshipment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BsdaEvent {
    SignEmission,
    SignWork,
    SignTransport,
    SignOperation,
}

impl std::fmt::Display for BsdaEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SignEmission => "SIGN_EMISSION",
            Self::SignWork => "SIGN_WORK",
            Self::SignTransport => "SIGN_TRANSPORT",
            Self::SignOperation => "SIGN_OPERATION",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bsda {
    pub id: BsdId,
    pub status: BsdaStatus,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(rename = "type", default)]
    pub bsda_type: BsdaType,

    pub emitter_company_siret: Option<Siret>,
    pub emitter_company_name: Option<String>,
    pub eco_organisme_siret: Option<Siret>,
    pub worker_company_siret: Option<Siret>,
    #[serde(default)]
    pub worker_is_disabled: bool,
    pub transporter_company_siret: Option<Siret>,
    #[serde(default)]
    pub transporter_transport_plates: Vec<String>,
    pub destination_company_siret: Option<Siret>,
    pub destination_planned_operation_code: Option<String>,

    pub waste_code: Option<String>,
    pub waste_material_name: Option<String>,
    pub weight_value: Option<f64>,

    pub emitter_emission_signature_author: Option<String>,
    pub emitter_emission_signature_date: Option<DateTime<Utc>>,
    pub worker_work_signature_author: Option<String>,
    pub worker_work_signature_date: Option<DateTime<Utc>>,
    pub transporter_transport_signature_author: Option<String>,
    pub transporter_transport_signature_date: Option<DateTime<Utc>>,

    pub destination_reception_acceptation_status: Option<WasteAcceptationStatus>,
    pub destination_reception_refusal_reason: Option<String>,
    pub destination_reception_weight: Option<f64>,
    pub destination_operation_code: Option<String>,
    pub destination_operation_signature_author: Option<String>,
    pub destination_operation_signature_date: Option<DateTime<Utc>>,
}

impl Bsda {
    pub fn new(id: BsdId) -> Self {
        Self {
            id,
            status: BsdaStatus::Initial,
            is_deleted: false,
            is_draft: false,
            bsda_type: BsdaType::Other,
            emitter_company_siret: None,
            emitter_company_name: None,
            eco_organisme_siret: None,
            worker_company_siret: None,
            worker_is_disabled: false,
            transporter_company_siret: None,
            transporter_transport_plates: Vec::new(),
            destination_company_siret: None,
            destination_planned_operation_code: None,
            waste_code: None,
            waste_material_name: None,
            weight_value: None,
            emitter_emission_signature_author: None,
            emitter_emission_signature_date: None,
            worker_work_signature_author: None,
            worker_work_signature_date: None,
            transporter_transport_signature_author: None,
            transporter_transport_signature_date: None,
            destination_reception_acceptation_status: None,
            destination_reception_refusal_reason: None,
            destination_reception_weight: None,
            destination_operation_code: None,
            destination_operation_signature_author: None,
            destination_operation_signature_date: None,
        }
    }

    /// Whether the workflow includes a work signature.
    pub fn has_worker(&self) -> bool {
        self.worker_company_siret.is_some()
            && !self.worker_is_disabled
            && self.bsda_type == BsdaType::Other
    }

    fn emission_signed(&self) -> bool {
        self.emitter_emission_signature_author.is_some() || self.emitter_emission_signature_date.is_some()
    }

    fn work_signed(&self) -> bool {
        self.worker_work_signature_date.is_some()
    }

    fn transport_signed(&self) -> bool {
        self.transporter_transport_signature_date.is_some()
    }

    fn operation_signed(&self) -> bool {
        self.destination_operation_signature_date.is_some()
    }

    fn operation_outcome(&self) -> Transition<BsdaStatus> {
        match self.destination_reception_acceptation_status {
            Some(WasteAcceptationStatus::Refused) => Transition::Transitioned(BsdaStatus::Refused),
            _ => Transition::Transitioned(BsdaStatus::Processed),
        }
    }
}

impl Bsd for Bsda {
    type Status = BsdaStatus;
    const TYPE: BsdType = BsdType::Bsda;

    fn id(&self) -> &BsdId {
        &self.id
    }

    fn status(&self) -> BsdaStatus {
        self.status
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn parties(&self) -> Vec<Party> {
        [
            (PartyRole::Emitter, &self.emitter_company_siret),
            (PartyRole::EcoOrganisme, &self.eco_organisme_siret),
            (PartyRole::Worker, &self.worker_company_siret),
            (PartyRole::Transporter, &self.transporter_company_siret),
            (PartyRole::Destination, &self.destination_company_siret),
        ]
        .into_iter()
        .filter_map(|(role, siret)| siret.clone().map(|s| Party::new(role, s)))
        .collect()
    }
}

impl StateMachine for Bsda {
    type Event = BsdaEvent;

    fn transition(&self, event: BsdaEvent) -> Transition<BsdaStatus> {
        use BsdaEvent as E;
        use BsdaStatus as S;
        use Transition::{Rejected, Transitioned};

        // A draft is published by its emission signature.
        if self.is_draft && !matches!(event, E::SignEmission) {
            return Rejected;
        }
        match (self.status, event) {
            (S::Initial, E::SignEmission) if !self.emission_signed() => Transitioned(S::SignedByProducer),
            (S::SignedByProducer, E::SignWork) if self.has_worker() && !self.work_signed() => {
                Transitioned(S::SignedByWorker)
            }
            (S::SignedByProducer, E::SignTransport) if !self.has_worker() && !self.transport_signed() => {
                Transitioned(S::Sent)
            }
            (S::SignedByWorker, E::SignTransport) if !self.transport_signed() => Transitioned(S::Sent),
            (S::Sent, E::SignOperation) if !self.operation_signed() => self.operation_outcome(),
            (S::Initial, E::SignOperation)
                if self.bsda_type == BsdaType::Collection2710 && !self.operation_signed() =>
            {
                self.operation_outcome()
            }
            _ => Rejected,
        }
    }

    fn signature_type(event: BsdaEvent) -> Option<SignatureType> {
        Some(match event {
            BsdaEvent::SignEmission => SignatureType::Emission,
            BsdaEvent::SignWork => SignatureType::Work,
            BsdaEvent::SignTransport => SignatureType::Transport,
            BsdaEvent::SignOperation => SignatureType::Operation,
        })
    }

    fn signature_fields(event: BsdaEvent, stamp: &SignatureStamp) -> Delta {
        let (author, date) = match event {
            BsdaEvent::SignEmission => ("emitterEmissionSignatureAuthor", "emitterEmissionSignatureDate"),
            BsdaEvent::SignWork => ("workerWorkSignatureAuthor", "workerWorkSignatureDate"),
            BsdaEvent::SignTransport => {
                ("transporterTransportSignatureAuthor", "transporterTransportSignatureDate")
            }
            BsdaEvent::SignOperation => {
                ("destinationOperationSignatureAuthor", "destinationOperationSignatureDate")
            }
        };
        let mut fields = signature_delta(author, date, stamp);
        if event == BsdaEvent::SignEmission {
            fields.insert("isDraft".to_string(), serde_json::Value::Bool(false));
        }
        fields
    }

    fn protected_fields() -> &'static [&'static str] {
        &[
            "id",
            "status",
            "isDeleted",
            "emitterEmissionSignatureAuthor",
            "emitterEmissionSignatureDate",
            "workerWorkSignatureAuthor",
            "workerWorkSignatureDate",
            "transporterTransportSignatureAuthor",
            "transporterTransportSignatureDate",
            "destinationOperationSignatureAuthor",
            "destinationOperationSignatureDate",
        ]
    }

    fn signer_roles(event: BsdaEvent) -> &'static [PartyRole] {
        match event {
            BsdaEvent::SignEmission => &[PartyRole::Emitter, PartyRole::EcoOrganisme],
            BsdaEvent::SignWork => &[PartyRole::Worker],
            BsdaEvent::SignTransport => &[PartyRole::Transporter],
            BsdaEvent::SignOperation => &[PartyRole::Destination],
        }
    }

    fn missing_fields(&self, event: BsdaEvent) -> ValidationError {
        let mut errors = ValidationError::new();
        match event {
            BsdaEvent::SignEmission => {
                errors.require("emitterCompanySiret", self.emitter_company_siret.is_some());
                errors.require("destinationCompanySiret", self.destination_company_siret.is_some());
                errors.require("wasteCode", filled(&self.waste_code));
                errors.require("weightValue", positive(self.weight_value));
            }
            BsdaEvent::SignWork => {
                errors.require("workerCompanySiret", self.worker_company_siret.is_some());
            }
            BsdaEvent::SignTransport => {
                errors.require("transporterCompanySiret", self.transporter_company_siret.is_some());
                errors.require(
                    "transporterTransportPlates",
                    self.transporter_transport_plates.iter().any(|p| !p.trim().is_empty()),
                );
            }
            BsdaEvent::SignOperation => match self.destination_reception_acceptation_status {
                None => errors.push("destinationReceptionAcceptationStatus", "required"),
                Some(status) => {
                    if status != WasteAcceptationStatus::Accepted {
                        errors.require(
                            "destinationReceptionRefusalReason",
                            filled(&self.destination_reception_refusal_reason),
                        );
                    }
                    if status.is_accepted() {
                        errors.require("destinationOperationCode", filled(&self.destination_operation_code));
                    }
                }
            },
        }
        errors
    }

    fn is_terminal(status: BsdaStatus) -> bool {
        status.is_terminal()
    }

    fn is_deletable(&self) -> bool {
        self.status == BsdaStatus::Initial && !self.emission_signed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn siret(n: char) -> Option<Siret> {
        Some(Siret::parse(&n.to_string().repeat(14)).unwrap())
    }

    fn bsda() -> Bsda {
        Bsda {
            emitter_company_siret: siret('1'),
            worker_company_siret: siret('2'),
            transporter_company_siret: siret('3'),
            destination_company_siret: siret('4'),
            waste_code: Some("06 07 01*".into()),
            weight_value: Some(2.0),
            ..Bsda::new(BsdId::from("BSDA-1"))
        }
    }

    fn at(bsda: Bsda, status: BsdaStatus) -> Bsda {
        Bsda { status, ..bsda }
    }

    #[test]
    fn test_full_path_with_worker() {
        let b = bsda();
        assert_eq!(b.transition(BsdaEvent::SignEmission), Transition::Transitioned(BsdaStatus::SignedByProducer));
        let b = at(b, BsdaStatus::SignedByProducer);
        assert_eq!(b.transition(BsdaEvent::SignWork), Transition::Transitioned(BsdaStatus::SignedByWorker));
        assert!(b.transition(BsdaEvent::SignTransport).is_rejected());
        let b = at(b, BsdaStatus::SignedByWorker);
        assert_eq!(b.transition(BsdaEvent::SignTransport), Transition::Transitioned(BsdaStatus::Sent));
        let b = Bsda {
            destination_reception_acceptation_status: Some(WasteAcceptationStatus::Accepted),
            ..at(b, BsdaStatus::Sent)
        };
        assert_eq!(b.transition(BsdaEvent::SignOperation), Transition::Transitioned(BsdaStatus::Processed));
    }

    #[test]
    fn test_no_worker_skips_work_step() {
        let b = Bsda { worker_is_disabled: true, ..at(bsda(), BsdaStatus::SignedByProducer) };
        assert!(b.transition(BsdaEvent::SignWork).is_rejected());
        assert_eq!(b.transition(BsdaEvent::SignTransport), Transition::Transitioned(BsdaStatus::Sent));
    }

    #[test]
    fn test_gathering_has_no_work_step() {
        let b = Bsda { bsda_type: BsdaType::Gathering, ..at(bsda(), BsdaStatus::SignedByProducer) };
        assert!(!b.has_worker());
        assert!(b.transition(BsdaEvent::SignWork).is_rejected());
    }

    #[test]
    fn test_refused_at_operation() {
        let b = Bsda {
            destination_reception_acceptation_status: Some(WasteAcceptationStatus::Refused),
            ..at(bsda(), BsdaStatus::Sent)
        };
        assert_eq!(b.transition(BsdaEvent::SignOperation), Transition::Transitioned(BsdaStatus::Refused));
    }

    #[test]
    fn test_collection_2710_signed_directly_by_destination() {
        let b = Bsda {
            bsda_type: BsdaType::Collection2710,
            destination_reception_acceptation_status: Some(WasteAcceptationStatus::Accepted),
            ..bsda()
        };
        assert_eq!(b.transition(BsdaEvent::SignOperation), Transition::Transitioned(BsdaStatus::Processed));
    }

    #[test]
    fn test_draft_is_published_by_emission() {
        let b = Bsda { is_draft: true, ..bsda() };
        assert_eq!(b.transition(BsdaEvent::SignEmission), Transition::Transitioned(BsdaStatus::SignedByProducer));
        let stamp = SignatureStamp::new("Marie", Utc::now());
        assert_eq!(Bsda::signature_fields(BsdaEvent::SignEmission, &stamp)["isDraft"], serde_json::json!(false));
    }

    #[test]
    fn test_draft_accepts_no_other_step() {
        let b = Bsda { is_draft: true, status: BsdaStatus::SignedByProducer, ..bsda() };
        assert!(b.transition(BsdaEvent::SignWork).is_rejected());
    }

    #[test]
    fn test_emission_cannot_be_signed_twice() {
        let b = Bsda { emitter_emission_signature_date: Some(Utc::now()), ..bsda() };
        assert!(b.transition(BsdaEvent::SignEmission).is_rejected());
    }

    #[test]
    fn test_type_field_serializes_as_type() {
        let value = serde_json::to_value(Bsda { bsda_type: BsdaType::Collection2710, ..bsda() }).unwrap();
        assert_eq!(value["type"], serde_json::json!("COLLECTION_2710"));
    }

    #[test]
    fn test_transport_requires_a_plate() {
        let errors = bsda().missing_fields(BsdaEvent::SignTransport);
        assert_eq!(errors.fields(), vec!["transporterTransportPlates"]);
    }
}
