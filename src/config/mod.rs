//! Runtime configuration (§6).
//!
//! [`SyncSettings`] is the single configuration surface threaded
//! through the engine; it carries sane defaults, can be overlaid from
//! a JSON table catalog via [`SyncSettings::merge_file`], and then
//! overridden piecemeal from environment variables via
//! [`SyncSettings::from_env`] — file for what rarely changes shape
//! (which tables, which method), environment for what operators tune
//! per deployment (worker counts, the allowed window).

pub mod connections;

use crate::model::SyncMethod;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// The table catalog as it is authored on disk: which tables to
/// replicate, how each one is watermarked, and any batch size
/// overrides. Everything else in [`SyncSettings`] is scheduling/
/// concurrency tuning and lives in environment variables instead.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
struct SyncSettingsFile {
    tables_to_sync: Vec<String>,
    sync_methods: HashMap<String, String>,
    batch_size_map: HashMap<String, u32>,
}

impl Default for SyncSettingsFile {
    fn default() -> Self {
        Self { tables_to_sync: Vec::new(), sync_methods: HashMap::new(), batch_size_map: HashMap::new() }
    }
}

/// Table replication settings and scheduling knobs.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Ordered list of table names to replicate.
    pub tables_to_sync: Vec<String>,
    /// Table name (lowercased) → extraction strategy.
    pub sync_methods: HashMap<String, SyncMethod>,
    /// Table name (lowercased) → batch size.
    pub batch_size_map: HashMap<String, u32>,
    /// Outer bounded-concurrency pool size, one slot per branch.
    pub max_db_sync_workers: usize,
    /// Inner bounded-concurrency pool size, one slot per table within a branch.
    pub max_concurrent_tables_per_branch: usize,
    /// Seconds to sleep between consolidation cycles.
    pub run_interval: Duration,
    /// Seconds to sleep between checks while outside the allowed window.
    pub allowed_window_check_interval: Duration,
    /// Start of the allowed sync window, `HH:MM`.
    pub allowed_start_time: String,
    /// End of the allowed sync window, `HH:MM`.
    pub allowed_end_time: String,
    /// Overrides the consolidated target database name, if set.
    pub consolidated_target_database: Option<String>,
    /// Lookback window, in days, for `timestamp`/`hybrid` sync methods.
    pub sync_lookback_days: i64,
    /// Connection-establish timeout.
    pub connect_timeout: Duration,
}

impl SyncSettings {
    #[must_use]
    pub fn batch_size_for(&self, table: &str) -> u32 {
        self.batch_size_map
            .get(&table.to_ascii_lowercase())
            .copied()
            .unwrap_or(crate::model::TableSyncSpec::DEFAULT_BATCH_SIZE)
    }

    #[must_use]
    pub fn sync_method_for(&self, table: &str) -> SyncMethod {
        self.sync_methods
            .get(&table.to_ascii_lowercase())
            .cloned()
            .unwrap_or(SyncMethod::Autono)
    }

    /// Overlay the table catalog from a JSON config file onto the
    /// defaults. Missing file is not an error — a fresh deployment may
    /// not have written one yet, in which case `tables_to_sync` stays
    /// empty and the cycle orchestrator has nothing to do.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if the file exists but is not
    /// valid JSON in the expected shape.
    pub fn merge_file(mut self, path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no table catalog file found; using defaults");
            return Ok(self);
        }
        let contents = std::fs::read_to_string(path)?;
        let file: SyncSettingsFile = serde_json::from_str(&contents)
            .map_err(|e| crate::Error::Config(format!("invalid config file {}: {e}", path.display())))?;

        self.tables_to_sync = file.tables_to_sync;
        self.sync_methods =
            file.sync_methods.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), SyncMethod::parse(&v))).collect();
        self.batch_size_map = file.batch_size_map.into_iter().map(|(k, v)| (k.to_ascii_lowercase(), v)).collect();
        Ok(self)
    }

    /// Overlay values taken from environment variables onto the defaults.
    ///
    /// Unset or unparseable variables silently keep the existing value —
    /// matching the "best-effort override" shape of the corpus's other
    /// env-driven config layers.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if let Ok(v) = std::env::var("MAX_DB_SYNC_WORKERS") {
            if let Ok(n) = v.parse() {
                self.max_db_sync_workers = n;
            }
        }
        if let Ok(v) = std::env::var("MAX_CONCURRENT_TABLES_PER_BRANCH") {
            if let Ok(n) = v.parse() {
                self.max_concurrent_tables_per_branch = n;
            }
        }
        if let Ok(v) = std::env::var("RUN_INTERVAL_SECONDS") {
            if let Ok(n) = v.parse() {
                self.run_interval = Duration::from_secs(n);
            }
        }
        if let Ok(v) = std::env::var("ALLOWED_WINDOW_CHECK_INTERVAL_SECONDS") {
            if let Ok(n) = v.parse() {
                self.allowed_window_check_interval = Duration::from_secs(n);
            }
        }
        if let Ok(v) = std::env::var("ALLOWED_START_TIME") {
            self.allowed_start_time = v;
        }
        if let Ok(v) = std::env::var("ALLOWED_END_TIME") {
            self.allowed_end_time = v;
        }
        if let Ok(v) = std::env::var("CONSOLIDATED_TARGET_DATABASE") {
            self.consolidated_target_database = Some(v);
        }
        if let Ok(v) = std::env::var("SYNC_LOOKBACK_DAYS") {
            if let Ok(n) = v.parse() {
                self.sync_lookback_days = n;
            }
        }
        if let Ok(v) = std::env::var("CONNECT_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse() {
                self.connect_timeout = Duration::from_secs(n);
            }
        }
        self
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            tables_to_sync: Vec::new(),
            sync_methods: HashMap::new(),
            batch_size_map: HashMap::new(),
            max_db_sync_workers: 4,
            max_concurrent_tables_per_branch: 2,
            run_interval: Duration::from_secs(2000),
            allowed_window_check_interval: Duration::from_secs(60),
            allowed_start_time: "00:00".to_string(),
            allowed_end_time: "00:00".to_string(),
            consolidated_target_database: None,
            sync_lookback_days: 0,
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Whether `now` falls inside the `[allowed_start_time, allowed_end_time)`
/// window, honoring midnight wraparound (§8 properties 9-10).
///
/// `start == end` always means "always open" — the original tool's
/// convention for an unrestricted schedule, not an empty one.
#[must_use]
pub fn in_allowed_sync_window(
    start: chrono::NaiveTime,
    end: chrono::NaiveTime,
    now: chrono::NaiveTime,
) -> bool {
    if start == end {
        true
    } else if start < end {
        start <= now && now < end
    } else {
        now >= start || now < end
    }
}

/// Parse an `HH:MM` string into a [`chrono::NaiveTime`].
///
/// # Errors
///
/// Returns [`crate::Error::Config`] if the string cannot be parsed.
pub fn parse_hhmm(raw: &str) -> crate::Result<chrono::NaiveTime> {
    chrono::NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|e| crate::Error::Config(format!("invalid HH:MM time {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    #[test]
    fn equal_start_and_end_is_always_open() {
        assert!(in_allowed_sync_window(t("09:00"), t("09:00"), t("03:00")));
        assert!(in_allowed_sync_window(t("00:00"), t("00:00"), t("23:59")));
    }

    #[test]
    fn normal_window_is_half_open() {
        let start = t("09:00");
        let end = t("17:00");
        assert!(in_allowed_sync_window(start, end, t("09:00")));
        assert!(in_allowed_sync_window(start, end, t("16:59")));
        assert!(!in_allowed_sync_window(start, end, t("17:00")));
        assert!(!in_allowed_sync_window(start, end, t("08:59")));
    }

    #[test]
    fn wrapping_window_spans_midnight() {
        let start = t("23:30");
        let end = t("06:00");
        assert!(in_allowed_sync_window(start, end, t("00:00")));
        assert!(in_allowed_sync_window(start, end, t("23:30")));
        assert!(in_allowed_sync_window(start, end, t("05:59")));
        assert!(!in_allowed_sync_window(start, end, t("06:00")));
        assert!(!in_allowed_sync_window(start, end, t("12:00")));
    }

    #[test]
    fn default_settings_resolve_fallback_batch_size_and_method() {
        let settings = SyncSettings::default();
        assert_eq!(settings.batch_size_for("Item"), 100);
        assert_eq!(settings.sync_method_for("Item"), SyncMethod::Autono);
    }

    #[test]
    fn settings_honor_configured_overrides() {
        let mut settings = SyncSettings::default();
        settings.batch_size_map.insert("item".to_string(), 500);
        settings
            .sync_methods
            .insert("item".to_string(), SyncMethod::Full);
        assert_eq!(settings.batch_size_for("ITEM"), 500);
        assert_eq!(settings.sync_method_for("Item"), SyncMethod::Full);
    }

    #[test]
    fn parse_hhmm_rejects_malformed_input() {
        assert!(parse_hhmm("25:99").is_err());
        assert!(parse_hhmm("09:00").is_ok());
    }

    #[test]
    fn merge_file_is_a_noop_when_file_is_absent() {
        let settings = SyncSettings::default().merge_file(Path::new("/nonexistent/dbsync.json")).unwrap();
        assert!(settings.tables_to_sync.is_empty());
    }

    #[test]
    fn merge_file_loads_table_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbsync.json");
        std::fs::write(
            &path,
            r#"{"tables_to_sync": ["Item", "SaleDetail"], "sync_methods": {"item": "full"}, "batch_size_map": {"item": 250}}"#,
        )
        .unwrap();

        let settings = SyncSettings::default().merge_file(&path).unwrap();
        assert_eq!(settings.tables_to_sync, vec!["Item", "SaleDetail"]);
        assert_eq!(settings.sync_method_for("Item"), SyncMethod::Full);
        assert_eq!(settings.batch_size_for("Item"), 250);
    }

    #[test]
    fn merge_file_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dbsync.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(SyncSettings::default().merge_file(&path).is_err());
    }
}
