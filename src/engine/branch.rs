//! Branch Orchestrator: syncs every configured table for one source
//! branch into the consolidated target (C8, §4.8).

use crate::config::connections::ConnectionConfig;
use crate::config::SyncSettings;
use crate::db::pool::connect;
use crate::db::{determine_branch_identifier, sync_meta::ensure_sync_schema_and_meta};
use crate::engine::table_sync::{sync_table, TableSyncOutcome};
use crate::error::Result;
use crate::model::TableSyncSpec;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Outcome of syncing every table for one branch.
#[derive(Debug)]
pub struct BranchSyncOutcome {
    pub branch_identifier: String,
    pub table_outcomes: Vec<TableSyncOutcome>,
}

/// Sync every table in `settings.tables_to_sync` for one source
/// branch, bounding concurrency within the branch to
/// `settings.max_concurrent_tables_per_branch`.
pub async fn sync_branch(
    source_cfg: &ConnectionConfig,
    target_cfg: &ConnectionConfig,
    target_database: &str,
    settings: Arc<SyncSettings>,
    cancel: CancellationToken,
) -> Result<BranchSyncOutcome> {
    let source_pool = connect(source_cfg, None, settings.connect_timeout).await?;
    let branch_identifier = determine_branch_identifier(&source_pool, &source_cfg.database).await;

    tracing::info!(branch = branch_identifier, "starting branch sync");

    let target_pool = connect(target_cfg, Some(target_database), settings.connect_timeout).await?;
    ensure_sync_schema_and_meta(&target_pool).await?;

    let semaphore = Arc::new(Semaphore::new(settings.max_concurrent_tables_per_branch.max(1)));
    let mut tasks: JoinSet<Result<TableSyncOutcome>> = JoinSet::new();

    for (index, table_name) in settings.tables_to_sync.iter().enumerate() {
        let spec = TableSyncSpec {
            name: table_name.clone(),
            sync_method: settings.sync_method_for(table_name),
            batch_size: settings.batch_size_for(table_name),
        };
        let source_pool = source_pool.clone();
        let target_pool = target_pool.clone();
        let branch_identifier = branch_identifier.clone();
        let settings = Arc::clone(&settings);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        let worker_id = format!("{branch_identifier}-{index}");

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            sync_table(&source_pool, &target_pool, &spec, &branch_identifier, &settings, &worker_id, &cancel).await
        });
    }

    let mut table_outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(outcome)) => table_outcomes.push(outcome),
            Ok(Err(e)) => {
                tracing::error!(branch = branch_identifier, error = %e, "table sync task returned an error");
            }
            Err(join_err) => {
                tracing::error!(branch = branch_identifier, error = %join_err, "table sync task panicked");
            }
        }
    }

    tracing::info!(branch = branch_identifier, tables = table_outcomes.len(), "completed branch sync");
    Ok(BranchSyncOutcome { branch_identifier, table_outcomes })
}
