//! Typed column values: decodes a source row's columns per their
//! actual SQL Server type instead of forcing every column through a
//! single `String` decode, which only succeeds for character types.

use crate::db::introspect::ColumnDetails;
use crate::error::Result;
use sqlx::mssql::{MssqlArguments, MssqlRow};
use sqlx::query::Query;
use sqlx::{Mssql, Row};

/// One decoded column value, tagged by the SQL Server type family it
/// came from. Covers the families [`crate::db::introspect::sql_type_definition`]
/// renders; anything outside that set falls back to `Text`.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Bit(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Binary(Vec<u8>),
    DateTime(chrono::NaiveDateTime),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
}

/// Decode column `ordinal` of `row` according to `details.data_type`.
pub fn decode_column(row: &MssqlRow, ordinal: usize, details: &ColumnDetails) -> Result<ColumnValue> {
    let value = match details.data_type.as_str() {
        "bit" => row.try_get::<Option<bool>, _>(ordinal)?.map(ColumnValue::Bit),
        "tinyint" => row.try_get::<Option<i16>, _>(ordinal)?.map(|v| ColumnValue::Int(i64::from(v))),
        "smallint" => row.try_get::<Option<i16>, _>(ordinal)?.map(|v| ColumnValue::Int(i64::from(v))),
        "int" => row.try_get::<Option<i32>, _>(ordinal)?.map(|v| ColumnValue::Int(i64::from(v))),
        "bigint" => row.try_get::<Option<i64>, _>(ordinal)?.map(ColumnValue::Int),
        "real" => row.try_get::<Option<f32>, _>(ordinal)?.map(|v| ColumnValue::Float(f64::from(v))),
        "float" | "decimal" | "numeric" | "money" | "smallmoney" => {
            row.try_get::<Option<f64>, _>(ordinal)?.map(ColumnValue::Float)
        }
        "binary" | "varbinary" | "image" => row.try_get::<Option<Vec<u8>>, _>(ordinal)?.map(ColumnValue::Binary),
        "datetime" | "datetime2" | "smalldatetime" | "datetimeoffset" => {
            row.try_get::<Option<chrono::NaiveDateTime>, _>(ordinal)?.map(ColumnValue::DateTime)
        }
        "date" => row.try_get::<Option<chrono::NaiveDate>, _>(ordinal)?.map(ColumnValue::Date),
        "time" => row.try_get::<Option<chrono::NaiveTime>, _>(ordinal)?.map(ColumnValue::Time),
        _ => row.try_get::<Option<String>, _>(ordinal)?.map(ColumnValue::Text),
    };
    Ok(value.unwrap_or(ColumnValue::Null))
}

/// Bind a decoded value onto a query in progress, matching the bind
/// type to the variant so the driver sends the wire type the target
/// column (or staging temp table column) actually expects.
#[must_use]
pub fn bind_value<'q>(
    query: Query<'q, Mssql, MssqlArguments>,
    value: ColumnValue,
) -> Query<'q, Mssql, MssqlArguments> {
    match value {
        ColumnValue::Null => query.bind(None::<String>),
        ColumnValue::Bit(v) => query.bind(v),
        ColumnValue::Int(v) => query.bind(v),
        ColumnValue::Float(v) => query.bind(v),
        ColumnValue::Text(v) => query.bind(v),
        ColumnValue::Binary(v) => query.bind(v),
        ColumnValue::DateTime(v) => query.bind(v),
        ColumnValue::Date(v) => query.bind(v),
        ColumnValue::Time(v) => query.bind(v),
    }
}

/// The later of two same-column values, by the natural ordering of
/// their type family (numeric columns compare numerically, temporal
/// columns chronologically, everything else lexicographically) — the
/// same per-type `max()` the original tool gets for free from
/// natively-typed Python values.
#[must_use]
pub fn max_value(a: ColumnValue, b: ColumnValue) -> ColumnValue {
    match (&a, &b) {
        (ColumnValue::Int(x), ColumnValue::Int(y)) => if y >= x { b } else { a },
        (ColumnValue::Float(x), ColumnValue::Float(y)) => if y >= x { b } else { a },
        (ColumnValue::DateTime(x), ColumnValue::DateTime(y)) => if y >= x { b } else { a },
        (ColumnValue::Date(x), ColumnValue::Date(y)) => if y >= x { b } else { a },
        (ColumnValue::Time(x), ColumnValue::Time(y)) => if y >= x { b } else { a },
        (ColumnValue::Text(x), ColumnValue::Text(y)) => if y >= x { b } else { a },
        (ColumnValue::Null, _) => b,
        (_, ColumnValue::Null) => a,
        _ => b,
    }
}

/// Render a value the way it is persisted into `SyncMeta.LastValue`
/// (always `NVARCHAR`) and substituted back into the next query's
/// `WHERE [watermark] > '...'` literal.
#[must_use]
pub fn to_watermark_string(value: &ColumnValue) -> String {
    match value {
        ColumnValue::Null => String::new(),
        ColumnValue::Bit(v) => i32::from(*v).to_string(),
        ColumnValue::Int(v) => v.to_string(),
        ColumnValue::Float(v) => v.to_string(),
        ColumnValue::Text(v) => v.clone(),
        ColumnValue::Binary(v) => hex_encode(v),
        ColumnValue::DateTime(v) => v.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
        ColumnValue::Date(v) => v.format("%Y-%m-%d").to_string(),
        ColumnValue::Time(v) => v.format("%H:%M:%S%.f").to_string(),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_value_compares_integers_numerically_not_lexicographically() {
        let result = max_value(ColumnValue::Int(9), ColumnValue::Int(10));
        assert_eq!(result, ColumnValue::Int(10));
    }

    #[test]
    fn max_value_prefers_non_null() {
        assert_eq!(max_value(ColumnValue::Null, ColumnValue::Int(5)), ColumnValue::Int(5));
        assert_eq!(max_value(ColumnValue::Int(5), ColumnValue::Null), ColumnValue::Int(5));
    }

    #[test]
    fn watermark_string_renders_integers_without_padding() {
        assert_eq!(to_watermark_string(&ColumnValue::Int(42)), "42");
    }

    #[test]
    fn watermark_string_renders_datetime_sortable() {
        let dt = chrono::NaiveDate::from_ymd_opt(2026, 8, 1).unwrap().and_hms_opt(9, 30, 0).unwrap();
        assert_eq!(to_watermark_string(&ColumnValue::DateTime(dt)), "2026-08-01 09:30:00");
    }
}
