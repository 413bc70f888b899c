//! Reindexer Main Entry Point
//!
//! Reads the settings, loads the catalog, connects to the search engine and
//! the task store, then runs the worker pool, the scheduler and the stale-task
//! reaper until ctrl-c.

use dotenv::dotenv;
use reindexer::{Dependencies, ServiceError, Settings};
use std::env;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "reindexer=info,reindexer_repository=info";

/// Log output selected by `REINDEXER_LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    /// One JSON object per event, for log shippers.
    Json,
    /// Single-line events.
    Compact,
    /// Multi-line events for a terminal.
    Pretty,
}

impl LogFormat {
    fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            Some("json") => Self::Json,
            Some("compact") => Self::Compact,
            _ => Self::Pretty,
        }
    }
}

fn init_tracing(format: LogFormat) -> Result<(), ServiceError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(tracing_subscriber::fmt::layer().compact().with_target(true))
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true).pretty())
            .try_init(),
    };
    result.map_err(|e| ServiceError::config(format!("Failed to init tracing: {}", e)))?;

    info!(
        service_name = "reindexer",
        service_version = env!("CARGO_PKG_VERSION"),
        log_format = ?format,
        "Tracing initialized"
    );
    Ok(())
}

/// Warn about settings that let the process start but leave it unable to build.
fn check_settings(settings: &Settings) {
    if !settings.documents_dir.is_dir() {
        warn!(
            documents_dir = %settings.documents_dir.display(),
            "Documents directory does not exist, harvests will fail"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    dotenv().ok();

    let format = LogFormat::parse(env::var("REINDEXER_LOG_FORMAT").ok().as_deref());
    init_tracing(format)?;

    let settings = Settings::from_env();
    check_settings(&settings);
    info!(
        catalog = ?settings.catalog_path,
        documents_dir = %settings.documents_dir.display(),
        "Starting reindexer"
    );

    let deps = Dependencies::with_settings(settings).await.map_err(|e| {
        error!(error = %e, "Failed to initialize dependencies");
        e
    })?;

    deps.orchestrator.run().await;
    info!("Reindexer stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(Some("JSON")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some(" compact ")), LogFormat::Compact);
        assert_eq!(LogFormat::parse(Some("fancy")), LogFormat::Pretty);
        assert_eq!(LogFormat::parse(None), LogFormat::Pretty);
    }
}
