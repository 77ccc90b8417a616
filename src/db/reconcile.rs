//! Schema reconciliation: creates or aligns a consolidated target table
//! against its source shape (C4, §4.3).

use crate::db::introspect::{fetch_table_schema, sql_type_definition, TableSchema};
use crate::error::{Error, Result};
use sqlx::{Executor, Mssql, Pool};

/// Column injected into every consolidated table ahead of the source's
/// own columns, carrying which branch a row originated from.
pub const BRANCH_ID_COL: &str = "BranchIdentifier";
pub const BRANCH_ID_TYPE: &str = "NVARCHAR(255)";

/// Quote a SQL Server identifier, escaping embedded `]` the way the
/// engine escapes every bracket-quoted name it emits.
#[must_use]
pub fn quote_ident(ident: &str) -> String {
    format!("[{}]", ident.replace(']', "]]"))
}

fn build_create_table_sql(table: &str, schema_name: &str, source: &TableSchema) -> String {
    let mut column_definitions = vec![format!("{} {} NOT NULL", quote_ident(BRANCH_ID_COL), BRANCH_ID_TYPE)];

    for name in source.ordered_column_names() {
        let details = &source.columns[&name];
        let nullability = if details.is_nullable { "NULL" } else { "NOT NULL" };
        column_definitions.push(format!(
            "{} {} {nullability}",
            quote_ident(&name),
            sql_type_definition(details)
        ));
    }

    let mut sql = format!(
        "CREATE TABLE {}.{} (\n    ",
        quote_ident(schema_name),
        quote_ident(table)
    );
    sql.push_str(&column_definitions.join(",\n    "));

    if !source.primary_key_columns.is_empty() {
        let pk_cols: Vec<String> = std::iter::once(BRANCH_ID_COL.to_string())
            .chain(source.primary_key_columns.iter().cloned())
            .collect();
        let pk_cols_str = pk_cols.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
        sql.push_str(&format!(
            ",\n    CONSTRAINT {} PRIMARY KEY ({pk_cols_str})",
            quote_ident(&format!("PK_{table}_Composite"))
        ));
    }

    sql.push_str("\n);");
    sql
}

/// Create the consolidated table if it is missing, or bring an
/// existing one in line with the source's columns. Returns `true` if
/// the target is now safe to sync into, `false` if reconciliation
/// halted on an irreconcilable difference (primary key mismatch).
///
/// # Errors
///
/// Returns [`Error::TableNotFound`] if the source table itself cannot
/// be introspected, and propagates any underlying `sqlx` failure.
pub async fn align_target_schema_to_source(
    source_pool: &Pool<Mssql>,
    target_pool: &Pool<Mssql>,
    table: &str,
    source_schema_name: &str,
    target_schema_name: &str,
) -> Result<bool> {
    let source_schema = fetch_table_schema(source_pool, source_schema_name, table)
        .await?
        .ok_or_else(|| Error::TableNotFound {
            schema: source_schema_name.to_string(),
            table: table.to_string(),
        })?;

    let target_schema = fetch_table_schema(target_pool, target_schema_name, table).await?;

    let Some(mut target_schema) = target_schema else {
        tracing::info!(table, "target table missing; creating with composite primary key");
        let create_sql = build_create_table_sql(table, target_schema_name, &source_schema);
        target_pool.execute(create_sql.as_str()).await?;
        return Ok(true);
    };

    tracing::debug!(table, "target table exists; reconciling columns");
    let mut schema_changed = false;

    if !target_schema.columns.contains_key(BRANCH_ID_COL) {
        tracing::warn!(table, column = BRANCH_ID_COL, "branch identifier column missing; adding as nullable");
        let sql = format!(
            "ALTER TABLE {}.{} ADD {} {BRANCH_ID_TYPE} NULL",
            quote_ident(target_schema_name),
            quote_ident(table),
            quote_ident(BRANCH_ID_COL)
        );
        target_pool.execute(sql.as_str()).await?;
        schema_changed = true;
        target_schema = fetch_table_schema(target_pool, target_schema_name, table)
            .await?
            .ok_or_else(|| Error::TableNotFound {
                schema: target_schema_name.to_string(),
                table: table.to_string(),
            })?;
    }

    let mut expected_target_pk = source_schema.primary_key_columns.clone();
    expected_target_pk.push(BRANCH_ID_COL.to_string());
    expected_target_pk.sort();
    let mut found_target_pk = target_schema.primary_key_columns.clone();
    found_target_pk.sort();

    if !source_schema.primary_key_columns.is_empty() && expected_target_pk != found_target_pk {
        tracing::error!(
            table,
            expected = ?expected_target_pk,
            found = ?found_target_pk,
            "primary key mismatch on consolidated table; manual intervention required"
        );
        return Err(Error::PrimaryKeyMismatch {
            table: table.to_string(),
            expected: expected_target_pk,
            found: found_target_pk,
        });
    }

    for (name, src_details) in &source_schema.columns {
        if !target_schema.columns.contains_key(name) {
            tracing::info!(table, column = name, "column missing in target; adding");
            let nullability = if src_details.is_nullable { "NULL" } else { "NOT NULL" };
            let sql = format!(
                "ALTER TABLE {}.{} ADD {} {} {nullability}",
                quote_ident(target_schema_name),
                quote_ident(table),
                quote_ident(name),
                sql_type_definition(src_details)
            );
            target_pool.execute(sql.as_str()).await?;
            schema_changed = true;
        } else {
            let tgt_details = &target_schema.columns[name];
            let src_def = sql_type_definition(src_details);
            let tgt_def = sql_type_definition(tgt_details);
            if src_def != tgt_def || src_details.is_nullable != tgt_details.is_nullable {
                tracing::warn!(
                    table,
                    column = name,
                    source_type = src_def,
                    target_type = tgt_def,
                    "column type or nullability differs between source and target; leaving in place"
                );
            }
        }
    }

    if schema_changed {
        tracing::info!(table, "schema reconciliation applied changes");
    } else {
        tracing::debug!(table, "schema already aligned");
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::introspect::ColumnDetails;
    use std::collections::BTreeMap;

    fn table_schema() -> TableSchema {
        let mut columns = BTreeMap::new();
        columns.insert(
            "ItemCode".to_string(),
            ColumnDetails {
                data_type: "nvarchar".to_string(),
                max_length: Some(50),
                numeric_precision: None,
                numeric_scale: None,
                datetime_precision: None,
                is_nullable: false,
                ordinal_position: 1,
            },
        );
        columns.insert(
            "Price".to_string(),
            ColumnDetails {
                data_type: "decimal".to_string(),
                max_length: None,
                numeric_precision: Some(18),
                numeric_scale: Some(2),
                datetime_precision: None,
                is_nullable: true,
                ordinal_position: 2,
            },
        );
        TableSchema { columns, primary_key_columns: vec!["ItemCode".to_string()] }
    }

    #[test]
    fn quote_ident_escapes_embedded_brackets() {
        assert_eq!(quote_ident("weird]name"), "[weird]]name]");
    }

    #[test]
    fn create_table_sql_injects_branch_column_and_composite_pk() {
        let sql = build_create_table_sql("Item", "dbo", &table_schema());
        assert!(sql.contains("[BranchIdentifier] NVARCHAR(255) NOT NULL"));
        assert!(sql.contains("[ItemCode] NVARCHAR(50) NOT NULL"));
        assert!(sql.contains("[Price] DECIMAL(18, 2) NULL"));
        assert!(sql.contains("CONSTRAINT [PK_Item_Composite] PRIMARY KEY ([BranchIdentifier], [ItemCode])"));
    }

    #[test]
    fn create_table_sql_omits_pk_constraint_when_source_has_none() {
        let mut schema = table_schema();
        schema.primary_key_columns.clear();
        let sql = build_create_table_sql("Item", "dbo", &schema);
        assert!(!sql.contains("CONSTRAINT"));
    }
}
