//! Environment-driven settings.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::builder::DEFAULT_BATCH_SIZE;

/// Default OpenSearch URL.
pub const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";

/// Default connection retry interval in seconds.
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 15;

/// Default number of build workers.
pub const DEFAULT_WORKERS: usize = 2;

/// Default age in hours after which a running task is reaped.
pub const DEFAULT_STALE_TASK_HOURS: u64 = 20;

/// Default reaper period in seconds.
pub const DEFAULT_REAPER_INTERVAL_SECS: u64 = 3600;

/// Default scheduler period in seconds.
pub const DEFAULT_SCHEDULER_INTERVAL_SECS: u64 = 300;

/// Default directory of NDJSON document files.
pub const DEFAULT_DOCUMENTS_DIR: &str = "./documents";

/// Connection mode for OpenSearch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionMode {
    /// Fail immediately if connection fails.
    FailFast,
    /// Retry connection until successful.
    Retry,
}

impl ConnectionMode {
    /// Parse a connection mode.
    ///
    /// Valid values: "fail-fast" or "retry" (case-insensitive). Anything else
    /// falls back to "retry".
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "fail-fast" | "failfast" | "fail_fast" => Self::FailFast,
            "retry" => Self::Retry,
            _ => {
                warn!(value = %value, "Invalid OPENSEARCH_CONNECTION_MODE, defaulting to 'retry'");
                Self::Retry
            }
        }
    }
}

/// Runtime settings of the reindexer binary.
#[derive(Debug, Clone)]
pub struct Settings {
    pub opensearch_url: String,
    pub connection_mode: ConnectionMode,
    pub retry_interval: Duration,
    /// PostgreSQL task store; tasks are kept in memory when unset.
    pub database_url: Option<String>,
    /// JSON catalog loaded at startup.
    pub catalog_path: Option<PathBuf>,
    pub documents_dir: PathBuf,
    pub workers: usize,
    pub batch_size: usize,
    pub stale_task_after: chrono::Duration,
    pub reaper_interval: Duration,
    pub scheduler_interval: Duration,
    /// Legacy `_type` written in bulk loads.
    pub document_type: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            opensearch_url: DEFAULT_OPENSEARCH_URL.to_string(),
            connection_mode: ConnectionMode::Retry,
            retry_interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            database_url: None,
            catalog_path: None,
            documents_dir: PathBuf::from(DEFAULT_DOCUMENTS_DIR),
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            stale_task_after: chrono::Duration::hours(DEFAULT_STALE_TASK_HOURS as i64),
            reaper_interval: Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS),
            scheduler_interval: Duration::from_secs(DEFAULT_SCHEDULER_INTERVAL_SECS),
            document_type: None,
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    ///
    /// # Environment Variables
    ///
    /// - `OPENSEARCH_URL`: OpenSearch server URL (default: http://localhost:9200)
    /// - `OPENSEARCH_CONNECTION_MODE`: "fail-fast" or "retry" (default: retry)
    /// - `OPENSEARCH_RETRY_INTERVAL_SECS`: Retry interval in seconds (default: 15)
    /// - `DATABASE_URL`: PostgreSQL task store (default: in-memory tasks)
    /// - `REINDEXER_CATALOG_PATH`: JSON catalog file (default: empty catalog)
    /// - `REINDEXER_DOCUMENTS_DIR`: NDJSON documents directory (default: ./documents)
    /// - `REINDEXER_WORKERS`: Build workers (default: 2)
    /// - `REINDEXER_BATCH_SIZE`: Documents per bulk request (default: 1000)
    /// - `REINDEXER_STALE_TASK_HOURS`: Reaper threshold (default: 20)
    /// - `REINDEXER_REAPER_INTERVAL_SECS`: Reaper period (default: 3600)
    /// - `REINDEXER_SCHEDULER_INTERVAL_SECS`: Scheduler period (default: 300)
    /// - `REINDEXER_DOCUMENT_TYPE`: Legacy `_type` for bulk loads (default: none)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read settings through `lookup`; unset or unparsable values keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let text = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let number = |key: &str, default: u64| parse_or(key, text(key), default);

        Self {
            opensearch_url: text("OPENSEARCH_URL").unwrap_or(defaults.opensearch_url),
            connection_mode: text("OPENSEARCH_CONNECTION_MODE")
                .map(|v| ConnectionMode::parse(&v))
                .unwrap_or(defaults.connection_mode),
            retry_interval: Duration::from_secs(number(
                "OPENSEARCH_RETRY_INTERVAL_SECS",
                DEFAULT_RETRY_INTERVAL_SECS,
            )),
            database_url: text("DATABASE_URL"),
            catalog_path: text("REINDEXER_CATALOG_PATH").map(PathBuf::from),
            documents_dir: text("REINDEXER_DOCUMENTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.documents_dir),
            workers: number("REINDEXER_WORKERS", DEFAULT_WORKERS as u64).max(1) as usize,
            batch_size: number("REINDEXER_BATCH_SIZE", DEFAULT_BATCH_SIZE as u64).max(1) as usize,
            stale_task_after: stale_after(number(
                "REINDEXER_STALE_TASK_HOURS",
                DEFAULT_STALE_TASK_HOURS,
            )),
            reaper_interval: Duration::from_secs(
                number("REINDEXER_REAPER_INTERVAL_SECS", DEFAULT_REAPER_INTERVAL_SECS).max(1),
            ),
            scheduler_interval: Duration::from_secs(
                number("REINDEXER_SCHEDULER_INTERVAL_SECS", DEFAULT_SCHEDULER_INTERVAL_SECS).max(1),
            ),
            document_type: text("REINDEXER_DOCUMENT_TYPE"),
        }
    }

    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn with_catalog_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    pub fn with_documents_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.documents_dir = dir.into();
        self
    }
}

/// Hours past which a running task is stale; out-of-range values keep the
/// default.
fn stale_after(hours: u64) -> chrono::Duration {
    i64::try_from(hours)
        .ok()
        .and_then(chrono::Duration::try_hours)
        .unwrap_or_else(|| {
            warn!(
                key = "REINDEXER_STALE_TASK_HOURS",
                value = hours,
                "Stale task threshold out of range, using default"
            );
            chrono::Duration::hours(DEFAULT_STALE_TASK_HOURS as i64)
        })
}

fn parse_or<T: FromStr + Copy>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key = %key, value = %raw, "Invalid numeric setting, using default");
            default
        }),
    }
}
