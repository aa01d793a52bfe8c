//! # Snapshot Subcommand
//!
//! Rebuilds a document from its activity events as of an instant.

use chrono::{DateTime, Utc};
use clap::Args;

use td_core::{BsdId, BsdType};
use td_service::Workflows;

#[derive(Args, Debug)]
pub struct SnapshotArgs {
    /// Document id.
    pub id: String,

    /// Document type, inferred from the id prefix when absent.
    #[arg(long = "type")]
    pub bsd_type: Option<String>,

    /// RFC 3339 instant; the latest state when absent.
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,
}

pub async fn run(args: SnapshotArgs, workflows: &Workflows) -> anyhow::Result<()> {
    let id = BsdId::new(args.id);
    let document = match crate::resolve_type(args.bsd_type.as_deref(), &id)? {
        BsdType::Bsdd => serde_json::to_value(workflows.bsdd.document_at(&id, args.at).await?)?,
        BsdType::Bsda => serde_json::to_value(workflows.bsda.document_at(&id, args.at).await?)?,
        BsdType::Bsdasri => serde_json::to_value(workflows.bsdasri.document_at(&id, args.at).await?)?,
    };
    println!("{}", serde_json::to_string_pretty(&document)?);
    Ok(())
}
