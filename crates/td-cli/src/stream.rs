//! # Stream Subcommand
//!
//! Prints a document's merged event stream, oldest first.

use chrono::{DateTime, Utc};
use clap::Args;

use td_core::{BsdId, BsdType};
use td_events::Event;
use td_service::Workflows;

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Document id.
    pub id: String,

    /// Document type, inferred from the id prefix when absent.
    #[arg(long = "type")]
    pub bsd_type: Option<String>,

    /// Only events created at or before this RFC 3339 instant.
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,

    /// One JSON object per line instead of a table.
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: StreamArgs, workflows: &Workflows) -> anyhow::Result<()> {
    let id = BsdId::new(args.id);
    let events = match crate::resolve_type(args.bsd_type.as_deref(), &id)? {
        BsdType::Bsdd => workflows.bsdd.get_stream(&id, args.until).await?,
        BsdType::Bsda => workflows.bsda.get_stream(&id, args.until).await?,
        BsdType::Bsdasri => workflows.bsdasri.get_stream(&id, args.until).await?,
    };
    tracing::debug!(bsd_id = %id, count = events.len(), "stream read");

    for event in &events {
        if args.json {
            println!("{}", serde_json::to_string(event)?);
        } else {
            println!("{}", table_row(event));
        }
    }
    Ok(())
}

fn table_row(event: &Event) -> String {
    format!(
        "{}  {:<36}  {:<32}  {}",
        event.created_at.to_rfc3339(),
        event.id,
        event.event_type,
        event.actor.as_deref().unwrap_or("-"),
    )
}
