//! Connection provider: turns a [`ConnectionConfig`] into a pooled
//! `sqlx` connection (C1, §4.1).

use crate::config::connections::ConnectionConfig;
use crate::error::{Error, Result};
use sqlx::mssql::{MssqlConnectOptions, MssqlPoolOptions};
use sqlx::MssqlPool;
use std::time::Duration;

/// Open a bounded connection pool to `cfg`, optionally against a
/// different database than the one named in `cfg` (used to connect to
/// `master` while ensuring the consolidated target database exists).
///
/// # Errors
///
/// Returns [`Error::Connection`] if the pool cannot be established
/// within `connect_timeout`.
pub async fn connect(
    cfg: &ConnectionConfig,
    database_override: Option<&str>,
    connect_timeout: Duration,
) -> Result<MssqlPool> {
    let database = database_override.unwrap_or(&cfg.database);

    let options = MssqlConnectOptions::new()
        .host(&cfg.server)
        .port(cfg.port)
        .username(&cfg.username)
        .password(&cfg.password)
        .database(database);

    MssqlPoolOptions::new()
        .max_connections(8)
        .acquire_timeout(connect_timeout)
        .connect_with(options)
        .await
        .map_err(|source| Error::Connection {
            server: cfg.server.clone(),
            port: cfg.port,
            database: database.to_string(),
            source,
        })
}

/// Ensure the consolidated target database exists on the target
/// server, creating it via a `master`-scoped connection if it is
/// absent. No-op if it already exists.
///
/// # Errors
///
/// Propagates connection and DDL failures.
pub async fn ensure_database_exists(
    target_cfg: &ConnectionConfig,
    database: &str,
    connect_timeout: Duration,
) -> Result<()> {
    let master_pool = connect(target_cfg, Some("master"), connect_timeout).await?;

    let exists: Option<String> = sqlx::query_scalar("SELECT name FROM sys.databases WHERE name = @p1")
        .bind(database)
        .fetch_optional(&master_pool)
        .await?;

    if exists.is_some() {
        tracing::debug!(database, "consolidated target database already exists");
        return Ok(());
    }

    tracing::info!(database, "consolidated target database missing; creating");
    let safe_name = database.replace(']', "]]");
    sqlx::query(&format!("CREATE DATABASE [{safe_name}]")).execute(&master_pool).await?;
    Ok(())
}
