//! Schema introspection against `INFORMATION_SCHEMA` (C2, §4.2).

use crate::error::Result;
use sqlx::{Mssql, Pool, Row};
use std::collections::BTreeMap;

/// One column's shape, as reported by `INFORMATION_SCHEMA.COLUMNS`.
#[derive(Debug, Clone)]
pub struct ColumnDetails {
    pub data_type: String,
    pub max_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
    pub datetime_precision: Option<i32>,
    pub is_nullable: bool,
    pub ordinal_position: i32,
}

/// A table's full column set and primary key, as introspected from one
/// database connection.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: BTreeMap<String, ColumnDetails>,
    pub primary_key_columns: Vec<String>,
}

impl TableSchema {
    /// Columns ordered the way the source table defines them.
    #[must_use]
    pub fn ordered_column_names(&self) -> Vec<String> {
        let mut pairs: Vec<_> = self
            .columns
            .iter()
            .map(|(name, details)| (name.clone(), details.ordinal_position))
            .collect();
        pairs.sort_by_key(|(_, ordinal)| *ordinal);
        pairs.into_iter().map(|(name, _)| name).collect()
    }
}

/// Fetch the column and primary-key shape of `schema.table`, or `None`
/// if the table has no columns (doesn't exist, or the caller lacks
/// permission to see it).
pub async fn fetch_table_schema(
    pool: &Pool<Mssql>,
    schema: &str,
    table: &str,
) -> Result<Option<TableSchema>> {
    let rows = sqlx::query(
        r"
        SELECT
            C.COLUMN_NAME,
            C.ORDINAL_POSITION,
            C.DATA_TYPE,
            C.CHARACTER_MAXIMUM_LENGTH AS MAX_LENGTH,
            C.NUMERIC_PRECISION,
            C.NUMERIC_SCALE,
            C.DATETIME_PRECISION,
            C.IS_NULLABLE,
            CASE WHEN KU.COLUMN_NAME IS NOT NULL THEN 1 ELSE 0 END AS IS_PRIMARY_KEY_COLUMN,
            KU.ORDINAL_POSITION AS PK_ORDINAL_POSITION
        FROM INFORMATION_SCHEMA.COLUMNS C
        OUTER APPLY (
            SELECT TOP 1 KU.COLUMN_NAME, KU.ORDINAL_POSITION
            FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS TC
            INNER JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE KU
                ON TC.CONSTRAINT_NAME = KU.CONSTRAINT_NAME
                AND KU.TABLE_SCHEMA = C.TABLE_SCHEMA
                AND KU.TABLE_NAME = C.TABLE_NAME
                AND KU.COLUMN_NAME = C.COLUMN_NAME
            WHERE TC.TABLE_SCHEMA = C.TABLE_SCHEMA
                AND TC.TABLE_NAME = C.TABLE_NAME
                AND TC.CONSTRAINT_TYPE = 'PRIMARY KEY'
        ) AS KU
        WHERE C.TABLE_NAME = @p1 AND C.TABLE_SCHEMA = @p2
        ORDER BY C.ORDINAL_POSITION
        ",
    )
    .bind(table)
    .bind(schema)
    .fetch_all(pool)
    .await?;

    if rows.is_empty() {
        return Ok(None);
    }

    let mut columns = BTreeMap::new();
    let mut pk_ordinals: Vec<(String, i32)> = Vec::new();

    for row in &rows {
        let name: String = row.try_get("COLUMN_NAME")?;
        let is_nullable: String = row.try_get("IS_NULLABLE")?;
        let details = ColumnDetails {
            data_type: row.try_get::<String, _>("DATA_TYPE")?.to_lowercase(),
            max_length: row.try_get("MAX_LENGTH")?,
            numeric_precision: row.try_get("NUMERIC_PRECISION")?,
            numeric_scale: row.try_get("NUMERIC_SCALE")?,
            datetime_precision: row.try_get("DATETIME_PRECISION")?,
            is_nullable: is_nullable == "YES",
            ordinal_position: row.try_get("ORDINAL_POSITION")?,
        };
        let is_pk: i32 = row.try_get("IS_PRIMARY_KEY_COLUMN")?;
        if is_pk == 1 {
            let pk_ordinal: i32 = row.try_get("PK_ORDINAL_POSITION")?;
            pk_ordinals.push((name.clone(), pk_ordinal));
        }
        columns.insert(name, details);
    }

    pk_ordinals.sort_by_key(|(_, ordinal)| *ordinal);
    let primary_key_columns = pk_ordinals.into_iter().map(|(name, _)| name).collect();

    Ok(Some(TableSchema { columns, primary_key_columns }))
}

/// Render a SQL Server type-definition string for a column, following
/// the rendering rules for each family (string/binary types carry
/// length, decimal/numeric carry precision and scale, the temporal
/// types carry fractional-second precision).
#[must_use]
pub fn sql_type_definition(details: &ColumnDetails) -> String {
    match details.data_type.as_str() {
        "nvarchar" | "varchar" | "nchar" | "char" | "binary" | "varbinary" => {
            let upper = details.data_type.to_uppercase();
            match details.max_length {
                Some(len) if len > 0 => format!("{upper}({len})"),
                _ => format!("{upper}(MAX)"),
            }
        }
        "decimal" | "numeric" => {
            let precision = details.numeric_precision.unwrap_or(18);
            let scale = details.numeric_scale.unwrap_or(0);
            format!("{}({precision}, {scale})", details.data_type.to_uppercase())
        }
        "datetime2" => format!("DATETIME2({})", details.datetime_precision.unwrap_or(7)),
        "datetimeoffset" => format!("DATETIMEOFFSET({})", details.datetime_precision.unwrap_or(7)),
        "time" => format!("TIME({})", details.datetime_precision.unwrap_or(7)),
        "date" => "DATE".to_string(),
        "datetime" => "DATETIME".to_string(),
        "smalldatetime" => "SMALLDATETIME".to_string(),
        "float" => match details.numeric_precision {
            Some(p) if p <= 53 => format!("FLOAT({p})"),
            _ => "FLOAT".to_string(),
        },
        other => other.to_uppercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(data_type: &str) -> ColumnDetails {
        ColumnDetails {
            data_type: data_type.to_string(),
            max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            datetime_precision: None,
            is_nullable: true,
            ordinal_position: 1,
        }
    }

    #[test]
    fn renders_varchar_max_length() {
        let mut c = col("nvarchar");
        c.max_length = Some(255);
        assert_eq!(sql_type_definition(&c), "NVARCHAR(255)");
    }

    #[test]
    fn renders_varchar_unbounded_length_as_max() {
        let mut c = col("nvarchar");
        c.max_length = Some(-1);
        assert_eq!(sql_type_definition(&c), "NVARCHAR(MAX)");
    }

    #[test]
    fn renders_decimal_with_default_precision_and_scale() {
        let c = col("decimal");
        assert_eq!(sql_type_definition(&c), "DECIMAL(18, 0)");
    }

    #[test]
    fn renders_decimal_with_explicit_precision_and_scale() {
        let mut c = col("numeric");
        c.numeric_precision = Some(10);
        c.numeric_scale = Some(2);
        assert_eq!(sql_type_definition(&c), "NUMERIC(10, 2)");
    }

    #[test]
    fn renders_datetime2_with_default_precision() {
        let c = col("datetime2");
        assert_eq!(sql_type_definition(&c), "DATETIME2(7)");
    }

    #[test]
    fn renders_plain_datetime_without_precision() {
        assert_eq!(sql_type_definition(&col("datetime")), "DATETIME");
    }

    #[test]
    fn renders_float_with_precision_under_53() {
        let mut c = col("float");
        c.numeric_precision = Some(24);
        assert_eq!(sql_type_definition(&c), "FLOAT(24)");
    }

    #[test]
    fn renders_float_without_precision_as_bare() {
        assert_eq!(sql_type_definition(&col("float")), "FLOAT");
    }

    #[test]
    fn renders_unrecognized_type_uppercased() {
        assert_eq!(sql_type_definition(&col("bit")), "BIT");
    }

    #[test]
    fn ordered_column_names_follows_ordinal_position() {
        let mut columns = BTreeMap::new();
        columns.insert("Zebra".to_string(), {
            let mut c = col("int");
            c.ordinal_position = 1;
            c
        });
        columns.insert("Apple".to_string(), {
            let mut c = col("int");
            c.ordinal_position = 2;
            c
        });
        let schema = TableSchema { columns, primary_key_columns: vec![] };
        assert_eq!(schema.ordered_column_names(), vec!["Zebra", "Apple"]);
    }
}
