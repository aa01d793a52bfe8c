//! # td-cli — Activity Log Operator Tool
//!
//! Read-side commands over a PostgreSQL deployment:
//!
//! - `migrate` — apply the embedded schema migrations
//! - `stream` — dump a document's merged event stream
//! - `snapshot` — rebuild a document as of an instant
//! - `reconcile` — compare live documents with their folded streams
//!
//! Argument parsing lives here; the work is done by `td-service`.

pub mod context;
pub mod reconcile;
pub mod snapshot;
pub mod stream;

use std::str::FromStr;

use td_core::{BsdId, BsdType};

/// Document type of an id, from its prefix.
pub fn infer_type(id: &BsdId) -> Option<BsdType> {
    let prefix = id.as_str().split('-').next()?;
    [BsdType::Bsdasri, BsdType::Bsda, BsdType::Bsdd]
        .into_iter()
        .find(|t| t.id_prefix() == prefix)
}

/// Resolve the document type from an explicit flag or the id.
pub fn resolve_type(explicit: Option<&str>, id: &BsdId) -> anyhow::Result<BsdType> {
    match explicit {
        Some(raw) => BsdType::from_str(raw).map_err(anyhow::Error::msg),
        None => infer_type(id)
            .ok_or_else(|| anyhow::anyhow!("cannot infer the document type of {id}, pass --type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_inference_from_prefix() {
        assert_eq!(infer_type(&BsdId::from("BSD-20260101-ABCDEFGHIJ")), Some(BsdType::Bsdd));
        assert_eq!(infer_type(&BsdId::from("BSDA-20260101-ABCDEFGHIJ")), Some(BsdType::Bsda));
        assert_eq!(infer_type(&BsdId::from("DASRI-20260101-ABCDEFGHIJ")), Some(BsdType::Bsdasri));
        assert_eq!(infer_type(&BsdId::from("XYZ-1")), None);
    }

    #[test]
    fn test_explicit_type_wins() {
        let id = BsdId::from("BSD-1");
        assert_eq!(resolve_type(Some("dasri"), &id).unwrap(), BsdType::Bsdasri);
        assert!(resolve_type(Some("nope"), &id).is_err());
    }
}
