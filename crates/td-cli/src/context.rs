//! Global options and the connection they lead to.

use std::sync::Arc;

use clap::Args;

use td_service::{
    db, Hooks, InMemoryCompanyDirectory, LogFormat, MembershipAuthorizer, ServiceConfig, Workflows,
};

/// Options shared by every subcommand. Each flag overrides its
/// environment variable.
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// PostgreSQL connection string.
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: Option<String>,

    /// Read the primary event store only.
    #[arg(long, global = true)]
    pub no_archive: bool,

    /// Log output format (`pretty` or `json`).
    #[arg(long, global = true, value_parser = parse_log_format)]
    pub log_format: Option<LogFormat>,
}

fn parse_log_format(raw: &str) -> Result<LogFormat, td_service::ConfigError> {
    raw.parse()
}

impl GlobalArgs {
    /// Environment configuration with the flags applied on top.
    pub fn config(&self) -> anyhow::Result<ServiceConfig> {
        let mut config = ServiceConfig::from_env()?;
        if let Some(url) = &self.database_url {
            config.database_url = Some(url.clone());
        }
        if self.no_archive {
            config.archive_events = false;
        }
        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        Ok(config)
    }
}

/// Connect to the configured database. Operator commands have nothing to
/// inspect in memory, so a missing database is an error.
pub async fn connect(config: &ServiceConfig) -> anyhow::Result<Workflows> {
    let pool = db::init_pool(config)
        .await?
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required (flag --database-url or environment)"))?;
    Ok(Workflows::postgres(
        pool,
        config,
        Arc::new(MembershipAuthorizer),
        Arc::new(InMemoryCompanyDirectory::new()),
        Hooks::default(),
    ))
}
