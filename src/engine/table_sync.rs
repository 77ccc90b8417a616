//! Table Sync Engine: the per-`(branch, table)` state machine (C7, §4).
//!
//! Drives one table through `Pending -> InProgress -> {Complete,
//! Failed, SchemaError}`, committing one batch per transaction so a
//! crash mid-run leaves the watermark consistent with whatever was
//! actually committed.

use crate::config::SyncSettings;
use crate::db::introspect::fetch_table_schema;
use crate::db::planner::{build_query, determine_watermark_and_pk_columns};
use crate::db::reconcile::align_target_schema_to_source;
use crate::db::sync_meta::{get_sync_meta_entry, update_sync_meta_status};
use crate::db::upsert::upsert_batch;
use crate::db::value::{decode_column, max_value, to_watermark_string};
use crate::error::{Error, Result};
use crate::model::{SyncMetaRecord, SyncStatus, TableSyncSpec};
use sqlx::{MssqlPool, Row};
use tokio_util::sync::CancellationToken;

/// Result of syncing one `(branch, table)` pair for one cycle.
#[derive(Debug)]
pub struct TableSyncOutcome {
    pub table: String,
    pub status: SyncStatus,
    pub rows_synced: u64,
}

/// Run one `(branch, table)` sync to completion (or until the batch
/// loop runs dry, a schema conflict halts it, or cancellation is
/// observed).
pub async fn sync_table(
    source_pool: &MssqlPool,
    target_pool: &MssqlPool,
    spec: &TableSyncSpec,
    branch_identifier: &str,
    settings: &SyncSettings,
    worker_id: &str,
    cancel: &CancellationToken,
) -> Result<TableSyncOutcome> {
    let table = spec.name.as_str();
    tracing::info!(branch = branch_identifier, table, "starting table sync");

    get_sync_meta_entry(target_pool, branch_identifier, table, true).await?;
    update_sync_meta_status(
        target_pool,
        branch_identifier,
        table,
        SyncStatus::InProgress,
        Some(&format!("[{worker_id}] starting sync cycle")),
    )
    .await?;

    if cancel.is_cancelled() {
        return finish(target_pool, branch_identifier, table, SyncStatus::Pending, 0, "cancelled before schema alignment").await;
    }

    if let Err(e) = align_target_schema_to_source(source_pool, target_pool, table, "dbo", "dbo").await {
        tracing::warn!(branch = branch_identifier, table, error = %e, "schema alignment failed; marking SchemaError");
        update_sync_meta_status(target_pool, branch_identifier, table, SyncStatus::SchemaError, Some(&e.to_string()))
            .await?;
        return Ok(TableSyncOutcome { table: table.to_string(), status: SyncStatus::SchemaError, rows_synced: 0 });
    }

    let source_schema = fetch_table_schema(source_pool, "dbo", table)
        .await?
        .ok_or_else(|| Error::TableNotFound { schema: "dbo".to_string(), table: table.to_string() })?;

    let Some((watermark_col, pk_columns)) =
        determine_watermark_and_pk_columns(table, &spec.sync_method, &source_schema)
    else {
        return Err(Error::WatermarkUndetermined { table: table.to_string() });
    };

    let select_columns = source_schema.ordered_column_names();

    let meta = get_sync_meta_entry(target_pool, branch_identifier, table, false)
        .await?
        .ok_or_else(|| Error::SyncMetaRowMissing { branch: branch_identifier.to_string(), table: table.to_string() })?;

    let mut query_last_val =
        if spec.sync_method.is_full() { SyncMetaRecord::DEFAULT_LAST_VALUE.to_string() } else { meta.last_value };

    let mut rows_synced: u64 = 0;
    let mut halted_by_cancel = false;
    let mut loop_error = None;

    loop {
        if cancel.is_cancelled() {
            halted_by_cancel = true;
            break;
        }

        let query = build_query(
            table,
            &select_columns,
            &watermark_col,
            &query_last_val,
            &spec.sync_method,
            settings,
            chrono::Local::now().naive_local(),
        );

        let batch = match sqlx::query(&query).fetch_all(source_pool).await {
            Ok(rows) => rows,
            Err(e) => {
                loop_error = Some(Error::Database(e));
                break;
            }
        };

        if batch.is_empty() {
            tracing::info!(branch = branch_identifier, table, "no more new rows; table sync complete");
            break;
        }

        let watermark_ordinal = batch[0]
            .columns()
            .iter()
            .position(|c| c.name().eq_ignore_ascii_case(&watermark_col));
        let Some(watermark_ordinal) = watermark_ordinal else {
            loop_error = Some(Error::WatermarkUndetermined { table: table.to_string() });
            break;
        };

        let watermark_details = &source_schema.columns[&watermark_col];
        let next_last_val = match max_watermark_value(&batch, watermark_ordinal, watermark_details) {
            Ok(v) => v,
            Err(e) => {
                loop_error = Some(e);
                break;
            }
        };

        if let Err(e) = upsert_batch(
            target_pool,
            table,
            &batch,
            &pk_columns,
            branch_identifier,
            &source_schema,
            worker_id,
            &next_last_val,
        )
        .await
        {
            loop_error = Some(e);
            break;
        }

        rows_synced += batch.len() as u64;
        tracing::info!(
            branch = branch_identifier,
            table,
            rows = batch.len(),
            watermark = next_last_val,
            "committed batch"
        );

        if spec.sync_method.is_full() {
            break;
        }
        query_last_val = next_last_val;
    }

    if halted_by_cancel {
        return finish(target_pool, branch_identifier, table, SyncStatus::Pending, rows_synced, "shutdown signaled mid-sync").await;
    }

    if let Some(e) = loop_error {
        let status = if rows_synced > 0 { SyncStatus::Pending } else { SyncStatus::Failed };
        let remarks = format!("sync interrupted: {e}");
        update_sync_meta_status(target_pool, branch_identifier, table, status, Some(&remarks)).await?;
        return Ok(TableSyncOutcome { table: table.to_string(), status, rows_synced });
    }

    finish(
        target_pool,
        branch_identifier,
        table,
        SyncStatus::Complete,
        rows_synced,
        &format!("sync cycle completed. {rows_synced} rows processed."),
    )
    .await
}

async fn finish(
    target_pool: &MssqlPool,
    branch_identifier: &str,
    table: &str,
    status: SyncStatus,
    rows_synced: u64,
    remarks: &str,
) -> Result<TableSyncOutcome> {
    update_sync_meta_status(target_pool, branch_identifier, table, status, Some(remarks)).await?;
    if status == SyncStatus::Complete {
        tracing::info!(target: "success", branch = branch_identifier, table, rows_synced, "table sync completed");
    }
    Ok(TableSyncOutcome { table: table.to_string(), status, rows_synced })
}

/// The largest watermark value in a batch, decoded and compared per
/// the column's own SQL Server type rather than lexicographically —
/// an `int` watermark of `9` must compare less than `10`, which plain
/// string comparison gets wrong.
fn max_watermark_value(
    rows: &[sqlx::mssql::MssqlRow],
    ordinal: usize,
    details: &crate::db::introspect::ColumnDetails,
) -> Result<String> {
    let mut current = None;
    for row in rows {
        let value = decode_column(row, ordinal, details)?;
        current = Some(match current {
            Some(prev) => max_value(prev, value),
            None => value,
        });
    }
    Ok(current.map(|v| to_watermark_string(&v)).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_carries_through_requested_fields() {
        let outcome = TableSyncOutcome { table: "Item".to_string(), status: SyncStatus::Complete, rows_synced: 42 };
        assert_eq!(outcome.table, "Item");
        assert_eq!(outcome.rows_synced, 42);
    }
}
