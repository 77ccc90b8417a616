//! Database-facing components: connection pooling, schema
//! introspection and reconciliation, query planning, the
//! sync-metadata store, and batch upserts (C1-C6).

pub mod introspect;
pub mod planner;
pub mod pool;
pub mod reconcile;
pub mod sync_meta;
pub mod upsert;
pub mod value;

/// Determine the branch identifier for a source connection: the
/// trimmed, lowercased `Logo.BOTMESS1` value if present and non-empty,
/// otherwise the lowercased database name (§8 property 11).
pub async fn determine_branch_identifier(
    source_pool: &sqlx::MssqlPool,
    database_name: &str,
) -> String {
    let fetched: Result<Option<String>, sqlx::Error> =
        sqlx::query_scalar("SELECT TOP 1 BOTMESS1 FROM Logo WITH (NOLOCK)")
            .fetch_optional(source_pool)
            .await;

    match fetched {
        Ok(Some(value)) if !value.trim().is_empty() => {
            let branch = value.trim().to_ascii_lowercase();
            tracing::info!(database = database_name, branch, "determined branch identifier from Logo table");
            branch
        }
        Ok(_) => {
            tracing::warn!(database = database_name, "Logo.BOTMESS1 missing or empty; falling back to database name");
            database_name.to_ascii_lowercase()
        }
        Err(e) => {
            tracing::warn!(database = database_name, error = %e, "could not read Logo table; falling back to database name");
            database_name.to_ascii_lowercase()
        }
    }
}
