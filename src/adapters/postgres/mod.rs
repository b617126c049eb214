//! PostgreSQL adapters - Database implementations for repository ports.
//!
//! - `PostgresChatRepository` - conversations, messages, projects, streams
//! - `connect_pool` / `run_migrations` - process-wide pool setup

mod chat_repository;

pub use chat_repository::PostgresChatRepository;

use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;

use crate::config::DatabaseConfig;

/// Build the process-wide pool. Connections are opened on first use.
pub fn connect_pool(config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    let options = PgConnectOptions::from_str(&config.url)?;

    let pool = PgPoolOptions::new()
        .min_connections(config.min_connections)
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout())
        .idle_timeout(Some(config.idle_timeout()))
        .max_lifetime(Some(config.max_lifetime()))
        .connect_lazy_with(options);

    Ok(pool)
}

/// Apply the bundled schema migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
