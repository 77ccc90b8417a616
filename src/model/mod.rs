//! Core data types shared across the engine.
//!
//! - [`SyncStatus`] — the per-`(branch, table)` state machine value.
//! - [`SyncMetaRecord`] — the durable catalog row (§3, §4.2).
//! - [`SyncMethod`] — the extraction strategy driving the Query Planner.
//! - [`TableSyncSpec`] — the configured shape of one table to replicate.

use std::fmt;

/// Status of one `(branch, table)` pair, persisted in `sync.SyncMeta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
    SchemaError,
}

impl SyncStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
            Self::SchemaError => "SchemaError",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SyncStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(Self::Pending),
            "InProgress" => Ok(Self::InProgress),
            "Complete" => Ok(Self::Complete),
            "Failed" => Ok(Self::Failed),
            "SchemaError" => Ok(Self::SchemaError),
            other => Err(crate::Error::Internal(format!("unknown sync status: {other}"))),
        }
    }
}

/// One durable row from `sync.SyncMeta`.
#[derive(Debug, Clone)]
pub struct SyncMetaRecord {
    pub branch: String,
    pub table: String,
    pub last_value: String,
    pub last_synced: Option<chrono::NaiveDateTime>,
    pub status: SyncStatus,
    pub last_completion_time: Option<chrono::NaiveDateTime>,
    pub remarks: Option<String>,
}

impl SyncMetaRecord {
    /// The watermark value to seed a fresh `(branch, table)` pair with.
    pub const DEFAULT_LAST_VALUE: &'static str = "0";

    /// Truncate remarks to the persisted column's limit.
    #[must_use]
    pub fn truncate_remarks(remarks: &str) -> String {
        const MAX_LEN: usize = 1000;
        if remarks.len() <= MAX_LEN {
            remarks.to_string()
        } else {
            remarks.chars().take(MAX_LEN).collect()
        }
    }
}

/// The extraction strategy for one table (§4.4, §4.7, glossary "Sync method").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncMethod {
    /// Watermark is the primary-key column; `WHERE pk > last_value`.
    Autono,
    /// Watermark is a date column; `WHERE date_col >= now() - lookback`.
    Timestamp,
    /// Both the PK watermark condition and the date-column condition apply.
    Hybrid,
    /// No watermark; one unbounded (batch-limited) snapshot per cycle.
    Full,
    /// A literal column name overrides the PK-derived watermark.
    Column(String),
}

impl SyncMethod {
    /// Parse a sync-method configuration value (case-insensitive for the
    /// four well-known keywords; anything else is a literal column name,
    /// matching the original tool's `SYNC_METHODS` map where entries like
    /// `'debitheader': 'VoucherNo'` name a column rather than a strategy).
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "autono" => Self::Autono,
            "timestamp" => Self::Timestamp,
            "hybrid" => Self::Hybrid,
            "full" => Self::Full,
            _ => Self::Column(raw.to_string()),
        }
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full)
    }
}

/// The configured shape of one table to replicate (§3 `TableSyncSpec`).
#[derive(Debug, Clone)]
pub struct TableSyncSpec {
    pub name: String,
    pub sync_method: SyncMethod,
    pub batch_size: u32,
}

impl TableSyncSpec {
    pub const DEFAULT_BATCH_SIZE: u32 = 100;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_method_parses_known_keywords_case_insensitively() {
        assert_eq!(SyncMethod::parse("Autono"), SyncMethod::Autono);
        assert_eq!(SyncMethod::parse("TIMESTAMP"), SyncMethod::Timestamp);
        assert_eq!(SyncMethod::parse("hybrid"), SyncMethod::Hybrid);
        assert_eq!(SyncMethod::parse("full"), SyncMethod::Full);
    }

    #[test]
    fn sync_method_falls_back_to_literal_column() {
        assert_eq!(
            SyncMethod::parse("VoucherNo"),
            SyncMethod::Column("VoucherNo".to_string())
        );
    }

    #[test]
    fn remarks_are_truncated_to_1000_chars() {
        let long = "x".repeat(2000);
        let truncated = SyncMetaRecord::truncate_remarks(&long);
        assert_eq!(truncated.len(), 1000);
    }

    #[test]
    fn remarks_shorter_than_limit_are_untouched() {
        assert_eq!(SyncMetaRecord::truncate_remarks("short"), "short");
    }

    #[test]
    fn sync_status_round_trips_through_string() {
        use std::str::FromStr;
        for status in [
            SyncStatus::Pending,
            SyncStatus::InProgress,
            SyncStatus::Complete,
            SyncStatus::Failed,
            SyncStatus::SchemaError,
        ] {
            let parsed = SyncStatus::from_str(status.as_str()).unwrap();
            assert_eq!(parsed, status);
        }
    }
}
