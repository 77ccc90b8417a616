//! Error types for the consolidation engine.
//!
//! Mirrors the taxonomy from §7 of the design: machine-readable
//! [`ErrorCode`]s grouped by category, each mapped to a stable exit code,
//! plus a `retryable` flag the orchestrator uses to decide whether a
//! `(branch, table)` failure should leave the row `Pending` (worth
//! retrying next cycle) or `Failed` (needs a human).

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Machine-readable error category.
///
/// Each code maps to a category-based exit code, matching the
/// convention operators use to distinguish transient connection trouble
/// (retry next cycle) from structural schema problems (needs a human).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Connection,
    Schema,
    Data,
    Shutdown,
    Config,
    Io,
    Internal,
}

impl ErrorCode {
    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Internal => 1,
            Self::Connection => 2,
            Self::Schema => 5,
            Self::Data => 6,
            Self::Config => 7,
            Self::Io => 8,
            Self::Shutdown => 0,
        }
    }

    /// Whether the caller should leave the `(branch, table)` row
    /// resumable (`Pending`) rather than terminal (`Failed`).
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Connection | Self::Data | Self::Shutdown)
    }
}

/// Errors produced by the consolidation engine.
#[derive(Error, Debug)]
pub enum Error {
    #[error("connection to {server}:{port}/{database} failed: {source}")]
    Connection {
        server: String,
        port: u16,
        database: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("table {schema}.{table} not found or has no columns")]
    TableNotFound { schema: String, table: String },

    #[error(
        "primary key mismatch for consolidated table {table}: expected {expected:?}, found {found:?}"
    )]
    PrimaryKeyMismatch {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("schema alignment failed for table {table}: {reason}")]
    SchemaAlignment { table: String, reason: String },

    #[error("could not determine watermark/primary key column for table {table}")]
    WatermarkUndetermined { table: String },

    #[error("batch upsert failed for {branch}:{table}: {source}")]
    BatchUpsert {
        branch: String,
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("sync-metadata row for {branch}:{table} was expected but not found")]
    SyncMetaRowMissing { branch: String, table: String },

    #[error("sync cancelled")]
    Shutdown,

    #[error("connection file not found: {path}")]
    ConnectionFileMissing { path: PathBuf },

    #[error("connection file {path} has no target connection (target_flag=yes)")]
    NoTargetConnection { path: PathBuf },

    #[error("connection file {path} has no source connections")]
    NoSourceConnections { path: PathBuf },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Map this error to its structured [`ErrorCode`].
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection { .. } => ErrorCode::Connection,
            Self::TableNotFound { .. }
            | Self::PrimaryKeyMismatch { .. }
            | Self::SchemaAlignment { .. } => ErrorCode::Schema,
            Self::WatermarkUndetermined { .. }
            | Self::BatchUpsert { .. }
            | Self::SyncMetaRowMissing { .. } => ErrorCode::Data,
            Self::Shutdown => ErrorCode::Shutdown,
            Self::ConnectionFileMissing { .. }
            | Self::NoTargetConnection { .. }
            | Self::NoSourceConnections { .. }
            | Self::Config(_) => ErrorCode::Config,
            Self::Io(_) => ErrorCode::Io,
            Self::Database(_) => ErrorCode::Connection,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Whether the failing `(branch, table)` should be left `Pending`
    /// (worth a retry next cycle) rather than `Failed`.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.error_code().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_errors_are_not_retryable() {
        let err = Error::PrimaryKeyMismatch {
            table: "Item".into(),
            expected: vec!["BranchIdentifier".into(), "ItemCode".into()],
            found: vec!["ItemCode".into()],
        };
        assert!(!err.is_retryable());
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn connection_errors_are_retryable() {
        let err = Error::Config("no target".into());
        assert!(!err.is_retryable());
        assert_eq!(err.exit_code(), 7);
    }

    #[test]
    fn shutdown_is_retryable_and_exits_clean() {
        assert!(Error::Shutdown.is_retryable());
        assert_eq!(Error::Shutdown.exit_code(), 0);
    }
}
