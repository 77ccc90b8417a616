//! Cycle Orchestrator: runs one consolidation cycle across every
//! configured source branch (C9, §4.9).

use crate::config::connections::ConnectionConfig;
use crate::config::SyncSettings;
use crate::db::pool::ensure_database_exists;
use crate::engine::branch::{sync_branch, BranchSyncOutcome};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Run one full cycle: every source branch synced against the single
/// consolidated target, bounded by `settings.max_db_sync_workers`
/// concurrent branches.
pub async fn run_cycle(
    target_cfg: &ConnectionConfig,
    sources: &[ConnectionConfig],
    settings: Arc<SyncSettings>,
    cancel: CancellationToken,
) -> Vec<BranchSyncOutcome> {
    tracing::info!(branches = sources.len(), "starting consolidation cycle");

    let target_database = settings
        .consolidated_target_database
        .clone()
        .unwrap_or_else(|| target_cfg.database.clone());

    if let Err(e) = ensure_database_exists(target_cfg, &target_database, settings.connect_timeout).await {
        tracing::error!(error = %e, "could not ensure consolidated target database exists; aborting cycle");
        return Vec::new();
    }

    let semaphore = Arc::new(Semaphore::new(settings.max_db_sync_workers.max(1)));
    let mut tasks: JoinSet<Option<BranchSyncOutcome>> = JoinSet::new();

    for source in sources {
        let source = source.clone();
        let target_cfg = target_cfg.clone();
        let target_database = target_database.clone();
        let settings = Arc::clone(&settings);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();

        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            if cancel.is_cancelled() {
                return None;
            }
            match sync_branch(&source, &target_cfg, &target_database, settings, cancel).await {
                Ok(outcome) => Some(outcome),
                Err(e) => {
                    tracing::error!(server = source.server, database = source.database, error = %e, "branch sync failed");
                    None
                }
            }
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(outcome)) => outcomes.push(outcome),
            Ok(None) => {}
            Err(join_err) => tracing::error!(error = %join_err, "branch sync task panicked"),
        }
    }

    tracing::info!(branches_completed = outcomes.len(), "consolidation cycle finished");
    outcomes
}
