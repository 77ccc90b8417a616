//! Query planning: decides the watermark column and builds the
//! bounded `SELECT` that extracts the next batch from a source table
//! (C5, §4.4).

use crate::config::SyncSettings;
use crate::db::introspect::TableSchema;
use crate::db::reconcile::quote_ident;
use crate::model::SyncMethod;

/// Tables whose `timestamp`/`hybrid` sync method additionally filters
/// on a named date column, mirroring the original tool's special
/// cases for these two tables.
fn timestamp_condition_column(table: &str, sync_method: &SyncMethod) -> Option<&'static str> {
    match table.to_ascii_lowercase().as_str() {
        "saledetail" | "saleheader" => Some("TrnDate"),
        "debitheader" => Some("VoucherDate"),
        _ => match sync_method {
            SyncMethod::Timestamp => None,
            _ => None,
        },
    }
}

/// The watermark column used to build `WHERE` conditions, and the
/// primary-key column(s) the batch upserter should `MERGE` on.
///
/// Returns `None` if the source table has no primary key — nothing to
/// watermark or merge against.
#[must_use]
pub fn determine_watermark_and_pk_columns(
    table: &str,
    sync_method: &SyncMethod,
    source_schema: &TableSchema,
) -> Option<(String, Vec<String>)> {
    if source_schema.primary_key_columns.is_empty() {
        return None;
    }

    let pk_columns = source_schema.primary_key_columns.clone();
    let watermark = match sync_method {
        SyncMethod::Column(col) => col.clone(),
        SyncMethod::Timestamp => timestamp_condition_column(table, sync_method)
            .map(ToString::to_string)
            .unwrap_or_else(|| pk_columns[0].clone()),
        _ => pk_columns[0].clone(),
    };

    Some((watermark, pk_columns))
}

/// Build the bounded `SELECT` that extracts the next batch of rows
/// from `table`, following the configured sync method.
#[must_use]
pub fn build_query(
    table: &str,
    select_columns: &[String],
    watermark_column: &str,
    last_synced_value: &str,
    sync_method: &SyncMethod,
    settings: &SyncSettings,
    now: chrono::NaiveDateTime,
) -> String {
    let select_columns_str = if select_columns.is_empty() {
        "*".to_string()
    } else {
        select_columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
    };

    let batch_size = settings.batch_size_for(table);

    if sync_method.is_full() {
        return format!(
            "SELECT TOP {batch_size} {select_columns_str} FROM {} ORDER BY {}",
            quote_ident(table),
            quote_ident(watermark_column)
        );
    }

    let mut conditions = Vec::new();
    let is_special_timestamp_watermark = matches!(watermark_column, "TrnDate" | "VoucherDate");

    if matches!(sync_method, SyncMethod::Autono | SyncMethod::Hybrid | SyncMethod::Column(_))
        || !is_special_timestamp_watermark
    {
        conditions.push(format!(
            "{} > '{}'",
            quote_ident(watermark_column),
            last_synced_value.replace('\'', "''")
        ));
    }

    if matches!(sync_method, SyncMethod::Timestamp | SyncMethod::Hybrid) {
        let special_col = timestamp_condition_column(table, sync_method)
            .filter(|c| select_columns.iter().any(|s| s == c));
        let fallback_col = matches!(sync_method, SyncMethod::Timestamp)
            .then_some(watermark_column)
            .filter(|c| select_columns.iter().any(|s| s == c));
        let timestamp_col = special_col.or(fallback_col);

        if let Some(col) = timestamp_col {
            let cutoff = now - chrono::Duration::days(settings.sync_lookback_days);
            conditions.push(format!(
                "{} >= '{}'",
                quote_ident(col),
                cutoff.format("%Y-%m-%d %H:%M:%S")
            ));
        } else {
            tracing::warn!(table, "timestamp/hybrid sync method configured but no timestamp column identified");
        }
    }

    if conditions.is_empty() {
        tracing::warn!(table, "no WHERE conditions for incremental sync; fetching from the beginning");
        return format!(
            "SELECT TOP {batch_size} {select_columns_str} FROM {} ORDER BY {}",
            quote_ident(table),
            quote_ident(watermark_column)
        );
    }

    let where_clause = conditions.join(" AND ");
    format!(
        "SELECT TOP {batch_size} {select_columns_str} FROM {} WHERE {where_clause} ORDER BY {}",
        quote_ident(table),
        quote_ident(watermark_column)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::introspect::ColumnDetails;
    use std::collections::BTreeMap;

    fn schema_with_pk(pk: &[&str]) -> TableSchema {
        let mut columns = BTreeMap::new();
        for (i, name) in pk.iter().enumerate() {
            columns.insert(
                (*name).to_string(),
                ColumnDetails {
                    data_type: "int".to_string(),
                    max_length: None,
                    numeric_precision: None,
                    numeric_scale: None,
                    datetime_precision: None,
                    is_nullable: false,
                    ordinal_position: i as i32,
                },
            );
        }
        TableSchema { columns, primary_key_columns: pk.iter().map(|s| (*s).to_string()).collect() }
    }

    fn now() -> chrono::NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2026, 8, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn autono_watermark_uses_first_pk_column() {
        let schema = schema_with_pk(&["ItemCode", "VariantId"]);
        let (watermark, pks) =
            determine_watermark_and_pk_columns("Item", &SyncMethod::Autono, &schema).unwrap();
        assert_eq!(watermark, "ItemCode");
        assert_eq!(pks, vec!["ItemCode", "VariantId"]);
    }

    #[test]
    fn literal_column_sync_method_overrides_watermark() {
        let schema = schema_with_pk(&["VoucherNo"]);
        let method = SyncMethod::Column("VoucherNo".to_string());
        let (watermark, _) = determine_watermark_and_pk_columns("debitheader", &method, &schema).unwrap();
        assert_eq!(watermark, "VoucherNo");
    }

    #[test]
    fn missing_primary_key_yields_no_watermark() {
        let schema = schema_with_pk(&[]);
        assert!(determine_watermark_and_pk_columns("Item", &SyncMethod::Autono, &schema).is_none());
    }

    #[test]
    fn full_sync_query_ignores_watermark_value() {
        let settings = SyncSettings::default();
        let query = build_query(
            "Supplier",
            &["SupplierCode".to_string()],
            "SupplierCode",
            "999",
            &SyncMethod::Full,
            &settings,
            now(),
        );
        assert!(query.starts_with("SELECT TOP 100 [SupplierCode] FROM [Supplier] ORDER BY [SupplierCode]"));
        assert!(!query.contains("WHERE"));
    }

    #[test]
    fn autono_query_filters_on_watermark_greater_than() {
        let settings = SyncSettings::default();
        let query = build_query(
            "Item",
            &["ItemCode".to_string()],
            "ItemCode",
            "A100",
            &SyncMethod::Autono,
            &settings,
            now(),
        );
        assert!(query.contains("WHERE [ItemCode] > 'A100'"));
    }

    #[test]
    fn query_escapes_single_quotes_in_watermark_value() {
        let settings = SyncSettings::default();
        let query = build_query(
            "Item",
            &["ItemCode".to_string()],
            "ItemCode",
            "O'Brien",
            &SyncMethod::Autono,
            &settings,
            now(),
        );
        assert!(query.contains("'O''Brien'"));
    }
}
