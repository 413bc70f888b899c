//! Orchestrator for the reindexer process.
//!
//! Owns the background loops (worker pool, scheduler, reaper) and their shared
//! shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::config::settings::{DEFAULT_REAPER_INTERVAL_SECS, DEFAULT_SCHEDULER_INTERVAL_SECS};
use crate::scheduler::Scheduler;
use crate::service::ReindexService;
use crate::tracker::StaleTaskReaper;
use crate::worker::WorkerPool;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub scheduler_interval: Duration,
    pub reaper_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            scheduler_interval: Duration::from_secs(DEFAULT_SCHEDULER_INTERVAL_SECS),
            reaper_interval: Duration::from_secs(DEFAULT_REAPER_INTERVAL_SECS),
        }
    }
}

pub struct Orchestrator {
    service: Arc<ReindexService>,
    pool: WorkerPool,
    reaper: StaleTaskReaper,
    config: OrchestratorConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl Orchestrator {
    /// `shutdown_tx` must be the sender the worker pool was started with.
    pub fn new(
        service: Arc<ReindexService>,
        pool: WorkerPool,
        reaper: StaleTaskReaper,
        shutdown_tx: broadcast::Sender<()>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            service,
            pool,
            reaper,
            config,
            shutdown_tx,
        }
    }

    pub fn service(&self) -> &Arc<ReindexService> {
        &self.service
    }

    /// Run until ctrl-c or a shutdown request, then stop the loops and let
    /// running builds finish.
    #[instrument(skip(self))]
    pub async fn run(self) {
        info!(
            scheduler_interval_secs = self.config.scheduler_interval.as_secs(),
            reaper_interval_secs = self.config.reaper_interval.as_secs(),
            contexts = self.service.catalog().contexts().len(),
            "Starting reindexer orchestrator"
        );

        let scheduler = Scheduler::new(self.service.clone());
        let scheduler_handle = tokio::spawn(
            scheduler.run(self.config.scheduler_interval, self.shutdown_tx.subscribe()),
        );
        let reaper_handle = tokio::spawn(
            self.reaper
                .run(self.config.reaper_interval, self.shutdown_tx.subscribe()),
        );

        let mut stop = self.shutdown_tx.subscribe();
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Received shutdown signal");
            }
            _ = stop.recv() => {
                info!("Shutdown requested");
            }
        }
        let _ = self.shutdown_tx.send(());

        let _ = scheduler_handle.await;
        let _ = reaper_handle.await;
        self.pool.join().await;
        info!("Orchestrator shutdown complete");
    }

    /// Sender that triggers a graceful shutdown when sent to.
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }
}
