//! # Domain Identity Newtypes
//!
//! Identifiers used across the activity log. Document ids are readable
//! strings (`BSDA-20240117-8Q3KXW2F1M`), company ids are 14-digit SIRET
//! numbers, and everything the log generates itself (events, revision
//! requests) is a time-ordered UUIDv7 so that ids sort in creation order.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::document::BsdType;
use crate::error::IdentityError;

// ─── Documents ───────────────────────────────────────────────────────

/// Identifier of a tracking document. Also the id of its event stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BsdId(String);

impl BsdId {
    /// Wrap an existing identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a readable identifier for a new document of the given type.
    pub fn generate(bsd_type: BsdType) -> Self {
        let suffix: String = Uuid::new_v4()
            .simple()
            .to_string()
            .chars()
            .take(10)
            .collect::<String>()
            .to_uppercase();
        Self(format!(
            "{}-{}-{}",
            bsd_type.id_prefix(),
            Utc::now().format("%Y%m%d"),
            suffix
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BsdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BsdId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ─── Companies and users ─────────────────────────────────────────────

/// French company establishment number (SIRET): exactly 14 ASCII digits.
///
/// Validated on construction and on deserialization, so a `Siret` held in
/// memory is always well formed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Siret(String);

impl Siret {
    /// Parse and validate a SIRET. Surrounding whitespace is ignored.
    pub fn parse(value: &str) -> Result<Self, IdentityError> {
        let trimmed = value.trim();
        if trimmed.len() == 14 && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(trimmed.to_string()))
        } else {
            Err(IdentityError::InvalidSiret(value.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Siret {
    type Error = IdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Siret> for String {
    fn from(value: Siret) -> Self {
        value.0
    }
}

impl FromStr for Siret {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Siret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of an authenticated user (the `actor` of an event).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Actor recorded for mutations performed by the system itself
    /// (auto-approvals, revision application).
    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Log-generated identifiers ───────────────────────────────────────

/// Unique identifier of an event. Shared by both event stores, which is
/// what makes cross-store deduplication possible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Generate a new time-ordered event identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a revision request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionRequestId(pub Uuid);

impl RevisionRequestId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn parse(value: &str) -> Result<Self, IdentityError> {
        Uuid::parse_str(value)
            .map(Self)
            .map_err(|_| IdentityError::InvalidRevisionRequestId(value.to_string()))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RevisionRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RevisionRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_siret_accepts_fourteen_digits() {
        let siret = Siret::parse(" 85001946400021 ").unwrap();
        assert_eq!(siret.as_str(), "85001946400021");
    }

    #[test]
    fn test_siret_rejects_malformed_values() {
        for bad in ["", "1234", "8500194640002A", "850019464000211"] {
            assert!(Siret::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_siret_deserialization_validates() {
        let ok: Siret = serde_json::from_str("\"85001946400021\"").unwrap();
        assert_eq!(ok.to_string(), "85001946400021");
        assert!(serde_json::from_str::<Siret>("\"not-a-siret\"").is_err());
    }

    #[test]
    fn test_generated_bsd_id_has_type_prefix() {
        let id = BsdId::generate(BsdType::Bsdasri);
        assert!(id.as_str().starts_with("DASRI-"));
        assert_eq!(id.as_str().split('-').count(), 3);
    }

    #[test]
    fn test_event_ids_sort_in_creation_order() {
        let ids: Vec<EventId> = (0..50).map(|_| EventId::new()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_revision_request_id_parse_round_trip() {
        let id = RevisionRequestId::new();
        assert_eq!(RevisionRequestId::parse(&id.to_string()).unwrap(), id);
        assert!(RevisionRequestId::parse("nope").is_err());
    }
}
