//! # tdctl Entry Point
//!
//! Assembles subcommands and dispatches to handler modules.

use clap::Parser;

use td_cli::context::{self, GlobalArgs};

/// Activity log operator tool.
///
/// Inspects event streams, rebuilds point-in-time snapshots and checks
/// live documents against their log.
#[derive(Parser, Debug)]
#[command(name = "tdctl", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Apply the embedded database migrations.
    Migrate,
    /// Print a document's event stream.
    Stream(td_cli::stream::StreamArgs),
    /// Rebuild a document as of an instant.
    Snapshot(td_cli::snapshot::SnapshotArgs),
    /// Compare documents with their activity log.
    Reconcile(td_cli::reconcile::ReconcileArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.global.config()?;
    td_service::telemetry::init(config.log_format);
    tracing::debug!(?config, "configuration loaded");

    if let Commands::Migrate = cli.command {
        td_service::db::init_pool(&config)
            .await?
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required to migrate"))?;
        return Ok(());
    }

    let workflows = context::connect(&config).await?;
    match cli.command {
        Commands::Migrate => Ok(()),
        Commands::Stream(args) => td_cli::stream::run(args, &workflows).await,
        Commands::Snapshot(args) => td_cli::snapshot::run(args, &workflows).await,
        Commands::Reconcile(args) => td_cli::reconcile::run(args, &workflows).await,
    }
}
