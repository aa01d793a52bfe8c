//! # Database
//!
//! The database is optional. With a `database_url` the service keeps
//! events, documents and revision requests in PostgreSQL; without one it
//! runs on in-memory stores, suitable for development and tests only.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::ServiceConfig;

/// Connect and run embedded migrations.
///
/// Returns `None` when no database is configured. Returns `Err` if a URL is
/// set but the connection or a migration fails.
pub async fn init_pool(config: &ServiceConfig) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, running on in-memory stores. State will not survive restarts.");
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    tracing::info!(max_connections = config.max_connections, "connected to PostgreSQL");

    migrate(&pool).await?;
    Ok(Some(pool))
}

pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations").run(pool).await?;
    tracing::info!("database migrations applied");
    Ok(())
}
