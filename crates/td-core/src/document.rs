//! # Document Vocabulary
//!
//! The closed set of tracking documents ("bordereaux") and the capability
//! every document record shares, whatever its type:
//!
//! ```text
//! BSDD     dangerous waste (the historical form)
//! BSDA     asbestos waste
//! BSDASRI  infectious healthcare waste
//! ```
//!
//! Records are flat structs with role-prefixed fields (`emitter*`,
//! `transporter*`, `destination*`, `worker*`, `waste*`). Their JSON form
//! (camelCase keys) is what events carry and what replay folds.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::delta::{self, Delta, DeltaError};
use crate::identity::{BsdId, Siret};

// ─── Document types ──────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BsdType {
    Bsdd,
    Bsda,
    Bsdasri,
}

impl BsdType {
    /// Prefix of every event type emitted on a stream of this document type
    /// (`BsdaCreated`, `BsdasriSigned`, ...).
    pub fn event_prefix(&self) -> &'static str {
        match self {
            Self::Bsdd => "Bsdd",
            Self::Bsda => "Bsda",
            Self::Bsdasri => "Bsdasri",
        }
    }

    /// Prefix of generated document identifiers.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Bsdd => "BSD",
            Self::Bsda => "BSDA",
            Self::Bsdasri => "DASRI",
        }
    }

    /// Split an event type into its document type and action suffix.
    ///
    /// `Bsdasri` is tested before `Bsda` since one is a prefix of the other.
    pub fn split_event_type(event_type: &str) -> Option<(BsdType, &str)> {
        [Self::Bsdasri, Self::Bsda, Self::Bsdd]
            .into_iter()
            .find_map(|t| event_type.strip_prefix(t.event_prefix()).map(|rest| (t, rest)))
    }
}

impl fmt::Display for BsdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bsdd => "BSDD",
            Self::Bsda => "BSDA",
            Self::Bsdasri => "BSDASRI",
        };
        f.write_str(s)
    }
}

impl FromStr for BsdType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BSDD" | "FORM" => Ok(Self::Bsdd),
            "BSDA" => Ok(Self::Bsda),
            "BSDASRI" | "DASRI" => Ok(Self::Bsdasri),
            other => Err(format!("unknown document type: {other}")),
        }
    }
}

// ─── Parties ─────────────────────────────────────────────────────────

/// Role a company plays on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PartyRole {
    Emitter,
    EcoOrganisme,
    Transporter,
    Destination,
    Worker,
}

impl PartyRole {
    /// Emitter and eco-organisme act on behalf of the same producer: each
    /// may sign the emission, and an approval from one stands for the other.
    pub fn is_producer_side(&self) -> bool {
        matches!(self, Self::Emitter | Self::EcoOrganisme)
    }
}

impl fmt::Display for PartyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Emitter => "EMITTER",
            Self::EcoOrganisme => "ECO_ORGANISME",
            Self::Transporter => "TRANSPORTER",
            Self::Destination => "DESTINATION",
            Self::Worker => "WORKER",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Party {
    pub role: PartyRole,
    pub siret: Siret,
}

impl Party {
    pub fn new(role: PartyRole, siret: Siret) -> Self {
        Self { role, siret }
    }
}

// ─── Signature vocabulary ────────────────────────────────────────────

/// Acceptation decision taken when waste is handed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WasteAcceptationStatus {
    Accepted,
    Refused,
    PartiallyRefused,
}

impl WasteAcceptationStatus {
    /// Whether at least part of the waste was taken.
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted | Self::PartiallyRefused)
    }
}

/// Signature step of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureType {
    Emission,
    Work,
    Transport,
    Reception,
    Operation,
}

impl fmt::Display for SignatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Emission => "EMISSION",
            Self::Work => "WORK",
            Self::Transport => "TRANSPORT",
            Self::Reception => "RECEPTION",
            Self::Operation => "OPERATION",
        };
        f.write_str(s)
    }
}

// ─── Document capability ─────────────────────────────────────────────

/// Capability shared by every document record.
///
/// A record's JSON object form is its canonical field map: it is what a
/// `Created` event carries, what deltas merge into, and what replay
/// deserializes back into the record type.
pub trait Bsd: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync + 'static {
    /// Workflow status of this document type.
    type Status: Copy
        + Eq
        + fmt::Debug
        + fmt::Display
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static;

    const TYPE: BsdType;

    fn id(&self) -> &BsdId;

    fn status(&self) -> Self::Status;

    fn is_deleted(&self) -> bool;

    /// Every company named on the document, with its role.
    fn parties(&self) -> Vec<Party>;

    /// Roles the given company holds on the document.
    fn roles_of(&self, siret: &Siret) -> Vec<PartyRole> {
        self.parties()
            .into_iter()
            .filter(|p| &p.siret == siret)
            .map(|p| p.role)
            .collect()
    }

    fn to_fields(&self) -> Result<Delta, DeltaError> {
        delta::to_fields(self)
    }

    /// Shallow-merge `delta` into this record and read the result back.
    fn apply_delta(&self, delta: &Delta) -> Result<Self, DeltaError> {
        delta::apply_delta(self, delta)
    }
}
