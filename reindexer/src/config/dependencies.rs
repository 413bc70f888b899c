//! Dependency initialization and wiring for the reindexer.

use std::sync::Arc;
use std::time::Duration;

use reindexer_repository::{
    InMemoryTaskRepository, OpenSearchProvider, PostgresTaskRepository, ProviderConfig,
    SearchEngineProvider, TaskRepository,
};
use tokio::sync::broadcast;
use tokio::time::sleep;
use tracing::{info, warn};

use super::settings::{ConnectionMode, Settings};
use crate::builder::{BuilderConfig, IndexBuilder};
use crate::catalog::Catalog;
use crate::harvest::{DirectorySourceCatalog, NdjsonHarvester};
use crate::orchestrator::{Orchestrator, OrchestratorConfig};
use crate::service::ReindexService;
use crate::tracker::{StaleTaskReaper, TaskTracker};
use crate::worker::{WorkerPool, DEFAULT_QUEUE_CAPACITY};
use crate::ServiceError;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
}

impl Dependencies {
    /// Initialize all dependencies from explicit settings.
    ///
    /// # Returns
    ///
    /// * `Ok(Dependencies)` - Initialized dependencies
    /// * `Err(ServiceError)` - If initialization fails (only in fail-fast mode
    ///   for the search engine)
    pub async fn with_settings(settings: Settings) -> Result<Self, ServiceError> {
        info!(
            opensearch_url = %settings.opensearch_url,
            connection_mode = ?settings.connection_mode,
            retry_interval_secs = settings.retry_interval.as_secs(),
            task_store = if settings.database_url.is_some() { "postgres" } else { "memory" },
            workers = settings.workers,
            batch_size = settings.batch_size,
            "Initializing dependencies"
        );

        let provider_config = ProviderConfig {
            document_type: settings.document_type.clone(),
            ..ProviderConfig::default()
        };
        let engine: Arc<dyn SearchEngineProvider> = Arc::new(
            Self::connect_to_opensearch(
                &settings.opensearch_url,
                provider_config,
                settings.connection_mode,
                settings.retry_interval,
            )
            .await?,
        );
        info!("OpenSearch connection established");

        let repository: Arc<dyn TaskRepository> = match settings.database_url {
            Some(ref url) => {
                let repository = PostgresTaskRepository::connect(url).await.map_err(|e| {
                    ServiceError::config(format!("Failed to open task store: {}", e))
                })?;
                info!("PostgreSQL task store ready");
                Arc::new(repository)
            }
            None => {
                warn!("DATABASE_URL not set, tasks are kept in memory");
                Arc::new(InMemoryTaskRepository::new())
            }
        };

        let catalog = Arc::new(match settings.catalog_path {
            Some(ref path) => Catalog::load(path).await?,
            None => {
                warn!("REINDEXER_CATALOG_PATH not set, starting with an empty catalog");
                Catalog::new()
            }
        });

        let harvester = NdjsonHarvester::new(settings.documents_dir.clone());
        let sources = Arc::new(DirectorySourceCatalog::new(harvester.clone()));
        let builder = Arc::new(IndexBuilder::with_config(
            engine.clone(),
            Arc::new(harvester),
            BuilderConfig::with_batch_size(settings.batch_size),
        ));

        let tracker = Arc::new(TaskTracker::new(repository));
        let (shutdown_tx, _) = broadcast::channel(1);
        let (queue, pool) = WorkerPool::start(
            tracker.clone(),
            settings.workers,
            DEFAULT_QUEUE_CAPACITY,
            &shutdown_tx,
        );

        let service = Arc::new(ReindexService::new(
            catalog,
            tracker.clone(),
            builder,
            sources,
            queue,
        ));
        let reaper =
            StaleTaskReaper::new(tracker, engine).with_threshold(settings.stale_task_after);

        let orchestrator = Orchestrator::new(
            service,
            pool,
            reaper,
            shutdown_tx,
            OrchestratorConfig {
                scheduler_interval: settings.scheduler_interval,
                reaper_interval: settings.reaper_interval,
            },
        );

        Ok(Self { orchestrator })
    }

    /// Connect to OpenSearch with retry logic based on connection mode.
    async fn connect_to_opensearch(
        url: &str,
        config: ProviderConfig,
        mode: ConnectionMode,
        retry_interval: Duration,
    ) -> Result<OpenSearchProvider, ServiceError> {
        loop {
            match Self::try_connect_opensearch(url, config.clone()).await {
                Ok(provider) => return Ok(provider),
                Err(e) => match mode {
                    ConnectionMode::FailFast => {
                        return Err(ServiceError::config(format!(
                            "Failed to connect to OpenSearch: {}",
                            e
                        )));
                    }
                    ConnectionMode::Retry => {
                        warn!(
                            opensearch_url = %url,
                            error = %e,
                            retry_interval_secs = retry_interval.as_secs(),
                            "Failed to connect to OpenSearch, retrying..."
                        );
                        sleep(retry_interval).await;
                    }
                },
            }
        }
    }

    /// Attempt to connect to OpenSearch.
    async fn try_connect_opensearch(
        url: &str,
        config: ProviderConfig,
    ) -> Result<OpenSearchProvider, ServiceError> {
        let provider = OpenSearchProvider::new(url, config).map_err(|e| {
            ServiceError::config(format!("Failed to create OpenSearch provider: {}", e))
        })?;
        provider
            .check_ready()
            .await
            .map_err(|e| ServiceError::config(format!("OpenSearch is not ready: {}", e)))?;
        Ok(provider)
    }
}
