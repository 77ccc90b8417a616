//! The durable sync-metadata store: `sync.SyncMeta` in the
//! consolidated target database (C3, §4.2, §6).

use crate::error::{Error, Result};
use crate::model::{SyncMetaRecord, SyncStatus};
use sqlx::{Executor, Mssql, Pool, Row};
use std::str::FromStr;

/// Create the `sync` schema and `SyncMeta` table if they don't exist,
/// and add any status/remarks columns missing from an older version
/// of the table. Idempotent, safe to call on every startup.
pub async fn ensure_sync_schema_and_meta(pool: &Pool<Mssql>) -> Result<()> {
    pool.execute(
        "IF NOT EXISTS (SELECT 1 FROM sys.schemas WHERE name = 'sync') \
         BEGIN EXEC('CREATE SCHEMA [sync]') END",
    )
    .await?;

    pool.execute(
        r"
        IF NOT EXISTS (
            SELECT 1 FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = 'sync' AND TABLE_NAME = 'SyncMeta'
        )
        BEGIN
            CREATE TABLE [sync].[SyncMeta] (
                BranchName NVARCHAR(255) NOT NULL,
                TableName  NVARCHAR(255) NOT NULL,
                LastValue  NVARCHAR(255) NOT NULL,
                LastSynced DATETIME DEFAULT GETDATE(),
                SyncStatus NVARCHAR(20) DEFAULT 'Pending' NOT NULL,
                LastCompletionTime DATETIME NULL,
                SyncRemarks NVARCHAR(MAX) NULL,
                CONSTRAINT PK_SyncMeta PRIMARY KEY (BranchName, TableName)
            );
            CREATE INDEX IX_SyncMeta_LastSynced ON [sync].[SyncMeta](LastSynced);
            CREATE INDEX IX_SyncMeta_SyncStatus ON [sync].[SyncMeta](SyncStatus);
        END
        ",
    )
    .await?;

    for (column, ddl) in [
        ("SyncStatus", "NVARCHAR(20) DEFAULT 'Pending' NOT NULL"),
        ("LastCompletionTime", "DATETIME NULL"),
        ("SyncRemarks", "NVARCHAR(MAX) NULL"),
    ] {
        let check_sql = format!(
            "IF NOT EXISTS (SELECT 1 FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_SCHEMA = 'sync' AND TABLE_NAME = 'SyncMeta' AND COLUMN_NAME = '{column}') \
             BEGIN ALTER TABLE [sync].[SyncMeta] ADD {column} {ddl} END"
        );
        pool.execute(check_sql.as_str()).await?;
    }

    Ok(())
}

/// Fetch the `SyncMeta` row for `(branch, table)`. If `create_if_missing`
/// is set and no row exists, inserts a fresh `Pending` row seeded with
/// [`SyncMetaRecord::DEFAULT_LAST_VALUE`] and returns it.
pub async fn get_sync_meta_entry(
    pool: &Pool<Mssql>,
    branch: &str,
    table: &str,
    create_if_missing: bool,
) -> Result<Option<SyncMetaRecord>> {
    let row = sqlx::query(
        "SELECT LastValue, LastSynced, SyncStatus, LastCompletionTime, SyncRemarks \
         FROM [sync].[SyncMeta] WHERE BranchName = @p1 AND TableName = @p2",
    )
    .bind(branch)
    .bind(table)
    .fetch_optional(pool)
    .await?;

    if let Some(row) = row {
        let status: String = row.try_get("SyncStatus")?;
        return Ok(Some(SyncMetaRecord {
            branch: branch.to_string(),
            table: table.to_string(),
            last_value: row.try_get("LastValue")?,
            last_synced: row.try_get("LastSynced")?,
            status: SyncStatus::from_str(&status)?,
            last_completion_time: row.try_get("LastCompletionTime")?,
            remarks: row.try_get("SyncRemarks")?,
        }));
    }

    if !create_if_missing {
        return Ok(None);
    }

    tracing::info!(branch, table, "no sync-meta entry found; creating as Pending");
    sqlx::query(
        "INSERT INTO [sync].[SyncMeta] (BranchName, TableName, LastValue, SyncStatus, LastSynced) \
         VALUES (@p1, @p2, @p3, @p4, GETDATE())",
    )
    .bind(branch)
    .bind(table)
    .bind(SyncMetaRecord::DEFAULT_LAST_VALUE)
    .bind(SyncStatus::Pending.as_str())
    .execute(pool)
    .await?;

    Ok(Some(SyncMetaRecord {
        branch: branch.to_string(),
        table: table.to_string(),
        last_value: SyncMetaRecord::DEFAULT_LAST_VALUE.to_string(),
        last_synced: None,
        status: SyncStatus::Pending,
        last_completion_time: None,
        remarks: None,
    }))
}

/// Advance the watermark for `(branch, table)` after a batch commits.
///
/// Generic over the executor so the caller can run this against a
/// bare pool or, as `upsert_batch` does, against the same transaction
/// that staged and merged the batch — the watermark only ever moves
/// together with the rows it describes.
///
/// # Errors
///
/// Returns [`Error::SyncMetaRowMissing`] if no row existed to update —
/// the row should always have been created by
/// [`get_sync_meta_entry`] first.
pub async fn update_last_synced_value<'e, E>(
    executor: E,
    branch: &str,
    table: &str,
    last_value: &str,
) -> Result<()>
where
    E: Executor<'e, Database = Mssql>,
{
    let result = sqlx::query(
        "UPDATE [sync].[SyncMeta] SET LastValue = @p1, LastSynced = GETDATE() \
         WHERE BranchName = @p2 AND TableName = @p3",
    )
    .bind(last_value)
    .bind(branch)
    .bind(table)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(Error::SyncMetaRowMissing { branch: branch.to_string(), table: table.to_string() });
    }
    Ok(())
}

/// Update the status (and, for `Complete`, the completion timestamp)
/// and remarks for `(branch, table)`.
///
/// # Errors
///
/// Returns [`Error::SyncMetaRowMissing`] if no row existed to update.
pub async fn update_sync_meta_status(
    pool: &Pool<Mssql>,
    branch: &str,
    table: &str,
    status: SyncStatus,
    remarks: Option<&str>,
) -> Result<()> {
    let remarks = remarks.map(SyncMetaRecord::truncate_remarks);

    let result = if status == SyncStatus::Complete {
        sqlx::query(
            "UPDATE [sync].[SyncMeta] \
             SET SyncStatus = @p1, LastCompletionTime = GETDATE(), SyncRemarks = @p2, LastSynced = GETDATE() \
             WHERE BranchName = @p3 AND TableName = @p4",
        )
        .bind(status.as_str())
        .bind(remarks)
        .bind(branch)
        .bind(table)
        .execute(pool)
        .await?
    } else {
        sqlx::query(
            "UPDATE [sync].[SyncMeta] SET SyncStatus = @p1, SyncRemarks = @p2, LastSynced = GETDATE() \
             WHERE BranchName = @p3 AND TableName = @p4",
        )
        .bind(status.as_str())
        .bind(remarks)
        .bind(branch)
        .bind(table)
        .execute(pool)
        .await?
    };

    if result.rows_affected() == 0 {
        tracing::error!(branch, table, status = status.as_str(), "sync-meta row expected but not found");
        return Err(Error::SyncMetaRowMissing { branch: branch.to_string(), table: table.to_string() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_last_value_is_zero() {
        assert_eq!(SyncMetaRecord::DEFAULT_LAST_VALUE, "0");
    }

    #[test]
    fn complete_status_round_trips() {
        assert_eq!(SyncStatus::from_str("Complete").unwrap(), SyncStatus::Complete);
    }
}
