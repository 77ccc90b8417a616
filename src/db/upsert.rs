//! Batch upserts via a global temp table and a server-side `MERGE`
//! (C6, §4.5, §9 Open Question resolution).

use crate::db::introspect::{sql_type_definition, TableSchema};
use crate::db::reconcile::{quote_ident, BRANCH_ID_COL};
use crate::db::sync_meta::update_last_synced_value;
use crate::db::value::{bind_value, decode_column};
use crate::error::Result;
use sqlx::{Column, Mssql, MssqlPool, Row, Transaction};

/// Upsert one extracted batch into the consolidated target table and
/// advance its watermark, as a single transactional unit.
///
/// Stages the batch into a worker-scoped global temp table, issues a
/// single server-side `MERGE` keyed on the branch identifier plus
/// every source primary-key column — matching on the full composite
/// key, not just its first column, so branches whose source tables
/// carry multi-column primary keys can't silently clobber each other's
/// rows — and, inside the same transaction, writes the batch's
/// watermark to `sync.SyncMeta`. All of it commits together or none of
/// it does: a crash between the merge and the watermark write can
/// never leave rows live in the target with a stale `LastValue`. The
/// temp table is always dropped before returning, success or failure.
pub async fn upsert_batch(
    target_pool: &MssqlPool,
    table: &str,
    rows: &[sqlx::mssql::MssqlRow],
    pk_columns: &[String],
    branch_identifier: &str,
    source_schema: &TableSchema,
    worker_id: &str,
    next_last_value: &str,
) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }

    let columns_in_batch: Vec<String> = rows[0].columns().iter().map(|c| c.name().to_string()).collect();
    let temp_table = format!("##{table}_sync_{worker_id}");

    let mut tx = target_pool.begin().await?;
    let result = stage_and_merge(&mut tx, table, &temp_table, &columns_in_batch, rows, pk_columns, branch_identifier, source_schema).await;
    let result = match result {
        Ok(()) => update_last_synced_value(&mut *tx, branch_identifier, table, next_last_value).await,
        Err(e) => Err(e),
    };

    let _ = sqlx::query(&format!("DROP TABLE {temp_table}")).execute(&mut *tx).await;

    match result {
        Ok(()) => {
            tx.commit().await?;
            Ok(())
        }
        Err(e) => {
            tx.rollback().await?;
            Err(e)
        }
    }
}

async fn stage_and_merge(
    tx: &mut Transaction<'_, Mssql>,
    table: &str,
    temp_table: &str,
    columns_in_batch: &[String],
    rows: &[sqlx::mssql::MssqlRow],
    pk_columns: &[String],
    branch_identifier: &str,
    source_schema: &TableSchema,
) -> Result<()> {
    let mut column_definitions = vec![format!("{} NVARCHAR(255) NOT NULL", quote_ident(BRANCH_ID_COL))];
    for name in columns_in_batch {
        let details = &source_schema.columns[name];
        column_definitions.push(format!("{} {}", quote_ident(name), sql_type_definition(details)));
    }
    let create_sql = format!("CREATE TABLE {temp_table} ({})", column_definitions.join(", "));
    sqlx::query(&create_sql).execute(&mut **tx).await?;

    let target_columns: Vec<String> =
        std::iter::once(BRANCH_ID_COL.to_string()).chain(columns_in_batch.iter().cloned()).collect();
    let insert_sql = format!(
        "INSERT INTO {temp_table} ({}) VALUES ({})",
        target_columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
        (0..target_columns.len()).map(|i| format!("@p{}", i + 1)).collect::<Vec<_>>().join(", ")
    );

    for row in rows {
        let mut query = sqlx::query(&insert_sql).bind(branch_identifier.to_string());
        for (ordinal, name) in columns_in_batch.iter().enumerate() {
            let details = &source_schema.columns[name];
            let value = decode_column(row, ordinal, details)?;
            query = bind_value(query, value);
        }
        query.execute(&mut **tx).await?;
    }

    let merge_on = std::iter::once(format!(
        "target.{} = source.{}",
        quote_ident(BRANCH_ID_COL),
        quote_ident(BRANCH_ID_COL)
    ))
    .chain(pk_columns.iter().map(|pk| format!("target.{} = source.{}", quote_ident(pk), quote_ident(pk))))
    .collect::<Vec<_>>()
    .join(" AND ");

    let pk_lower: Vec<String> = pk_columns.iter().map(|c| c.to_ascii_lowercase()).collect();
    let set_clause_parts: Vec<String> = columns_in_batch
        .iter()
        .filter(|c| !pk_lower.contains(&c.to_ascii_lowercase()))
        .map(|c| format!("target.{} = source.{}", quote_ident(c), quote_ident(c)))
        .collect();
    let set_clause = if set_clause_parts.is_empty() {
        format!(
            "target.{} = source.{}",
            quote_ident(&columns_in_batch[0]),
            quote_ident(&columns_in_batch[0])
        )
    } else {
        set_clause_parts.join(", ")
    };

    let target_col_list = target_columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
    let source_col_list =
        target_columns.iter().map(|c| format!("source.{}", quote_ident(c))).collect::<Vec<_>>().join(", ");

    let merge_sql = format!(
        "MERGE INTO {} AS target \
         USING {temp_table} AS source \
         ON ({merge_on}) \
         WHEN MATCHED THEN UPDATE SET {set_clause} \
         WHEN NOT MATCHED BY TARGET THEN INSERT ({target_col_list}) VALUES ({source_col_list});",
        quote_ident(table)
    );
    sqlx::query(&merge_sql).execute(&mut **tx).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_on_clause_matches_every_composite_pk_column() {
        let pk_columns = vec!["BranchOrderId".to_string(), "LineNo".to_string()];
        let merge_on = std::iter::once(format!(
            "target.{} = source.{}",
            quote_ident(BRANCH_ID_COL),
            quote_ident(BRANCH_ID_COL)
        ))
        .chain(pk_columns.iter().map(|pk| format!("target.{} = source.{}", quote_ident(pk), quote_ident(pk))))
        .collect::<Vec<_>>()
        .join(" AND ");

        assert_eq!(
            merge_on,
            "target.[BranchIdentifier] = source.[BranchIdentifier] AND \
             target.[BranchOrderId] = source.[BranchOrderId] AND target.[LineNo] = source.[LineNo]"
        );
    }
}
