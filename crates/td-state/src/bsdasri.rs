//! # BSDASRI — Infectious Healthcare Waste
//!
//! ```text
//! INITIAL ──emission / secret code──▶ SIGNED_BY_PRODUCER ──transport──▶ SENT
//!    │                                        │                          │
//!    └──────direct takeover──────▶ SENT       └──refused──▶ REFUSED ◀────┤
//!                                                                 reception
//!                                                                        ▼
//!                                       PROCESSED ◀──operation── RECEIVED
//! ```
//!
//! Direct takeover lets the transporter leave with the waste before the
//! emitter signs, when the emitter company opted in. The opt-in check is
//! done by the caller before the event is submitted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use td_core::{
    Bsd, BsdId, BsdType, Delta, Party, PartyRole, SignatureType, Siret, ValidationError,
    WasteAcceptationStatus,
};

use crate::machine::{signature_delta, SignatureStamp, StateMachine, TakeoverMode, Transition};
use crate::validation::{filled, positive};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BsdasriStatus {
    Initial,
    SignedByProducer,
    Sent,
    Received,
    Processed,
    Refused,
    Canceled,
}

impl BsdasriStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Processed | Self::Refused | Self::Canceled)
    }
}

impl std::fmt::Display for BsdasriStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Initial => "INITIAL",
            Self::SignedByProducer => "SIGNED_BY_PRODUCER",
            Self::Sent => "SENT",
            Self::Received => "RECEIVED",
            Self::Processed => "PROCESSED",
            Self::Refused => "REFUSED",
            Self::Canceled => "CANCELED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BsdasriEvent {
    SignEmission,
    SignEmissionWithSecretCode,
    SignTransport,
    SignTransportDirectTakeover,
    SignReception,
    SignOperation,
}

impl std::fmt::Display for BsdasriEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SignEmission => "SIGN_EMISSION",
            Self::SignEmissionWithSecretCode => "SIGN_EMISSION_WITH_SECRET_CODE",
            Self::SignTransport => "SIGN_TRANSPORT",
            Self::SignTransportDirectTakeover => "SIGN_TRANSPORT_DIRECT_TAKEOVER",
            Self::SignReception => "SIGN_RECEPTION",
            Self::SignOperation => "SIGN_OPERATION",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bsdasri {
    pub id: BsdId,
    pub status: BsdasriStatus,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub is_draft: bool,

    pub emitter_company_siret: Option<Siret>,
    pub emitter_company_name: Option<String>,
    pub eco_organisme_siret: Option<Siret>,
    pub transporter_company_siret: Option<Siret>,
    #[serde(default)]
    pub transporter_transport_plates: Vec<String>,
    pub destination_company_siret: Option<Siret>,

    pub waste_code: Option<String>,
    pub emitter_waste_weight_value: Option<f64>,

    pub emitter_emission_signature_author: Option<String>,
    pub emitter_emission_signature_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_emission_direct_takeover: bool,
    #[serde(default)]
    pub is_emission_taken_over_with_secret_code: bool,

    pub transporter_acceptation_status: Option<WasteAcceptationStatus>,
    pub transporter_waste_refusal_reason: Option<String>,
    pub transporter_transport_signature_author: Option<String>,
    pub transporter_transport_signature_date: Option<DateTime<Utc>>,

    pub destination_reception_acceptation_status: Option<WasteAcceptationStatus>,
    pub destination_reception_waste_refusal_reason: Option<String>,
    pub destination_reception_signature_author: Option<String>,
    pub destination_reception_signature_date: Option<DateTime<Utc>>,
    pub destination_operation_code: Option<String>,
    pub destination_operation_signature_author: Option<String>,
    pub destination_operation_signature_date: Option<DateTime<Utc>>,
}

impl Bsdasri {
    pub fn new(id: BsdId) -> Self {
        Self {
            id,
            status: BsdasriStatus::Initial,
            is_deleted: false,
            is_draft: false,
            emitter_company_siret: None,
            emitter_company_name: None,
            eco_organisme_siret: None,
            transporter_company_siret: None,
            transporter_transport_plates: Vec::new(),
            destination_company_siret: None,
            waste_code: None,
            emitter_waste_weight_value: None,
            emitter_emission_signature_author: None,
            emitter_emission_signature_date: None,
            is_emission_direct_takeover: false,
            is_emission_taken_over_with_secret_code: false,
            transporter_acceptation_status: None,
            transporter_waste_refusal_reason: None,
            transporter_transport_signature_author: None,
            transporter_transport_signature_date: None,
            destination_reception_acceptation_status: None,
            destination_reception_waste_refusal_reason: None,
            destination_reception_signature_author: None,
            destination_reception_signature_date: None,
            destination_operation_code: None,
            destination_operation_signature_author: None,
            destination_operation_signature_date: None,
        }
    }

    fn emission_signed(&self) -> bool {
        self.emitter_emission_signature_author.is_some() || self.emitter_emission_signature_date.is_some()
    }

    fn transport_signed(&self) -> bool {
        self.transporter_transport_signature_date.is_some()
    }

    /// Outcome of a transport signature given the transporter's decision.
    /// No decision recorded means the waste was taken.
    fn transport_outcome(&self) -> Transition<BsdasriStatus> {
        let acceptation = self
            .transporter_acceptation_status
            .unwrap_or(WasteAcceptationStatus::Accepted);
        if acceptation.is_accepted() {
            Transition::Transitioned(BsdasriStatus::Sent)
        } else {
            Transition::Transitioned(BsdasriStatus::Refused)
        }
    }
}

impl Bsd for Bsdasri {
    type Status = BsdasriStatus;
    const TYPE: BsdType = BsdType::Bsdasri;

    fn id(&self) -> &BsdId {
        &self.id
    }

    fn status(&self) -> BsdasriStatus {
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
            (PartyRole::Destination, &self.destination_company_siret),
        ]
        .into_iter()
        .filter_map(|(role, siret)| siret.clone().map(|s| Party::new(role, s)))
        .collect()
    }
}

impl StateMachine for Bsdasri {
    type Event = BsdasriEvent;

    fn transition(&self, event: BsdasriEvent) -> Transition<BsdasriStatus> {
        use BsdasriEvent as E;
        use BsdasriStatus as S;
        use Transition::{Rejected, Transitioned};

        if self.is_draft {
            return Rejected;
        }
        match (self.status, event) {
            (S::Initial, E::SignEmission | E::SignEmissionWithSecretCode) if !self.emission_signed() => {
                Transitioned(S::SignedByProducer)
            }
            (S::SignedByProducer, E::SignTransport) if !self.transport_signed() => self.transport_outcome(),
            (S::Initial, E::SignTransportDirectTakeover)
                if !self.emission_signed() && !self.transport_signed() =>
            {
                self.transport_outcome()
            }
            (S::Sent, E::SignReception) if self.destination_reception_signature_date.is_none() => {
                match self.destination_reception_acceptation_status {
                    Some(WasteAcceptationStatus::Refused) => Transitioned(S::Refused),
                    _ => Transitioned(S::Received),
                }
            }
            (S::Received, E::SignOperation) if self.destination_operation_signature_date.is_none() => {
                Transitioned(S::Processed)
            }
            _ => Rejected,
        }
    }

    fn signature_type(event: BsdasriEvent) -> Option<SignatureType> {
        Some(match event {
            BsdasriEvent::SignEmission | BsdasriEvent::SignEmissionWithSecretCode => SignatureType::Emission,
            BsdasriEvent::SignTransport | BsdasriEvent::SignTransportDirectTakeover => SignatureType::Transport,
            BsdasriEvent::SignReception => SignatureType::Reception,
            BsdasriEvent::SignOperation => SignatureType::Operation,
        })
    }

    fn signature_fields(event: BsdasriEvent, stamp: &SignatureStamp) -> Delta {
        match event {
            BsdasriEvent::SignEmission => {
                signature_delta("emitterEmissionSignatureAuthor", "emitterEmissionSignatureDate", stamp)
            }
            BsdasriEvent::SignEmissionWithSecretCode => {
                let mut delta =
                    signature_delta("emitterEmissionSignatureAuthor", "emitterEmissionSignatureDate", stamp);
                delta.insert("isEmissionTakenOverWithSecretCode".into(), Value::Bool(true));
                delta
            }
            BsdasriEvent::SignTransport => signature_delta(
                "transporterTransportSignatureAuthor",
                "transporterTransportSignatureDate",
                stamp,
            ),
            BsdasriEvent::SignTransportDirectTakeover => {
                let mut delta = signature_delta(
                    "transporterTransportSignatureAuthor",
                    "transporterTransportSignatureDate",
                    stamp,
                );
                delta.insert("isEmissionDirectTakeover".into(), Value::Bool(true));
                delta
            }
            BsdasriEvent::SignReception => signature_delta(
                "destinationReceptionSignatureAuthor",
                "destinationReceptionSignatureDate",
                stamp,
            ),
            BsdasriEvent::SignOperation => signature_delta(
                "destinationOperationSignatureAuthor",
                "destinationOperationSignatureDate",
                stamp,
            ),
        }
    }

    fn protected_fields() -> &'static [&'static str] {
        &[
            "id",
            "status",
            "isDeleted",
            "isEmissionDirectTakeover",
            "isEmissionTakenOverWithSecretCode",
            "emitterEmissionSignatureAuthor",
            "emitterEmissionSignatureDate",
            "transporterTransportSignatureAuthor",
            "transporterTransportSignatureDate",
            "destinationReceptionSignatureAuthor",
            "destinationReceptionSignatureDate",
            "destinationOperationSignatureAuthor",
            "destinationOperationSignatureDate",
        ]
    }

    fn signer_roles(event: BsdasriEvent) -> &'static [PartyRole] {
        match event {
            BsdasriEvent::SignEmission => &[PartyRole::Emitter, PartyRole::EcoOrganisme],
            BsdasriEvent::SignEmissionWithSecretCode
            | BsdasriEvent::SignTransport
            | BsdasriEvent::SignTransportDirectTakeover => &[PartyRole::Transporter],
            BsdasriEvent::SignReception | BsdasriEvent::SignOperation => &[PartyRole::Destination],
        }
    }

    fn takeover_mode(event: BsdasriEvent) -> Option<TakeoverMode> {
        match event {
            BsdasriEvent::SignEmissionWithSecretCode => Some(TakeoverMode::SecretCode),
            BsdasriEvent::SignTransportDirectTakeover => Some(TakeoverMode::Direct),
            _ => None,
        }
    }

    fn missing_fields(&self, event: BsdasriEvent) -> ValidationError {
        let mut errors = ValidationError::new();
        match event {
            BsdasriEvent::SignEmission | BsdasriEvent::SignEmissionWithSecretCode => {
                errors.require("emitterCompanySiret", self.emitter_company_siret.is_some());
                errors.require("destinationCompanySiret", self.destination_company_siret.is_some());
                errors.require("wasteCode", filled(&self.waste_code));
                errors.require("emitterWasteWeightValue", positive(self.emitter_waste_weight_value));
            }
            BsdasriEvent::SignTransport | BsdasriEvent::SignTransportDirectTakeover => {
                errors.require("transporterCompanySiret", self.transporter_company_siret.is_some());
                errors.require(
                    "transporterTransportPlates",
                    self.transporter_transport_plates.iter().any(|p| !p.trim().is_empty()),
                );
                if matches!(
                    self.transporter_acceptation_status,
                    Some(WasteAcceptationStatus::Refused | WasteAcceptationStatus::PartiallyRefused)
                ) {
                    errors.require(
                        "transporterWasteRefusalReason",
                        filled(&self.transporter_waste_refusal_reason),
                    );
                }
            }
            BsdasriEvent::SignReception => match self.destination_reception_acceptation_status {
                None => errors.push("destinationReceptionAcceptationStatus", "required"),
                Some(WasteAcceptationStatus::Accepted) => {}
                Some(_) => errors.require(
                    "destinationReceptionWasteRefusalReason",
                    filled(&self.destination_reception_waste_refusal_reason),
                ),
            },
            BsdasriEvent::SignOperation => {
                errors.require("destinationOperationCode", filled(&self.destination_operation_code));
            }
        }
        errors
    }

    fn is_terminal(status: BsdasriStatus) -> bool {
        status.is_terminal()
    }

    fn is_deletable(&self) -> bool {
        self.status == BsdasriStatus::Initial
    }
}
