//! # Reconcile Subcommand
//!
//! Compares live documents with the fold of their event streams and lists
//! the fields that diverge. Exits with an error when any document does.

use clap::Args;

use td_core::{BsdId, BsdType};
use td_service::{ReconcileReport, Workflows};

#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Document ids.
    #[arg(required = true)]
    pub ids: Vec<String>,

    /// Document type, inferred from each id prefix when absent.
    #[arg(long = "type")]
    pub bsd_type: Option<String>,

    /// Print reports as JSON.
    #[arg(long)]
    pub json: bool,
}

pub async fn run(args: ReconcileArgs, workflows: &Workflows) -> anyhow::Result<()> {
    let mut divergent = 0usize;
    for raw in args.ids {
        let id = BsdId::new(raw);
        let report = match crate::resolve_type(args.bsd_type.as_deref(), &id)? {
            BsdType::Bsdd => workflows.bsdd.reconcile(&id).await?,
            BsdType::Bsda => workflows.bsda.reconcile(&id).await?,
            BsdType::Bsdasri => workflows.bsdasri.reconcile(&id).await?,
        };
        if !report.is_consistent() {
            divergent += 1;
        }
        if args.json {
            println!("{}", serde_json::to_string(&report)?);
        } else {
            println!("{}", summary(&report));
        }
    }
    if divergent > 0 {
        anyhow::bail!("{divergent} document(s) diverge from their activity log");
    }
    Ok(())
}

fn summary(report: &ReconcileReport) -> String {
    if report.is_consistent() {
        format!("{}  ok  ({} events)", report.bsd_id, report.event_count)
    } else {
        format!(
            "{}  DIVERGENT  ({} events)  {}",
            report.bsd_id,
            report.event_count,
            report.divergent_fields.join(", ")
        )
    }
}
