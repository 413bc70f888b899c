//! Stale task reaper.
//!
//! A task that never completes (the process died mid-build) would keep its
//! target locked forever. The reaper fails such tasks once they pass an age
//! threshold and drops the un-aliased index they were building.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reindexer_repository::SearchEngineProvider;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{describe, parse_index_id, TaskTracker};
use crate::errors::ReindexError;

/// Default age after which a running task is considered dead.
pub const DEFAULT_STALE_AFTER_HOURS: i64 = 20;

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Tasks that were force-failed.
    pub reaped: Vec<Uuid>,
    /// Indices deleted on behalf of reaped tasks.
    pub deleted_indices: Vec<String>,
    /// Indices that could not be deleted and are left behind.
    pub orphaned: Vec<String>,
}

pub struct StaleTaskReaper {
    tracker: Arc<TaskTracker>,
    engine: Arc<dyn SearchEngineProvider>,
    threshold: chrono::Duration,
}

impl StaleTaskReaper {
    pub fn new(tracker: Arc<TaskTracker>, engine: Arc<dyn SearchEngineProvider>) -> Self {
        Self {
            tracker,
            engine,
            threshold: chrono::Duration::hours(DEFAULT_STALE_AFTER_HOURS),
        }
    }

    pub fn with_threshold(mut self, threshold: chrono::Duration) -> Self {
        self.threshold = threshold;
        self
    }

    /// Fail every task running since before `now - threshold`.
    #[instrument(skip(self))]
    pub async fn reap(&self, now: DateTime<Utc>) -> Result<ReapReport, ReindexError> {
        let mut report = ReapReport::default();
        let stale = self.tracker.stale(now - self.threshold).await?;

        for task in stale {
            let index_id = parse_index_id(&task.description).map(str::to_string);
            let message = format!(
                "reaped: no completion after {} hours",
                self.threshold.num_hours()
            );
            let description = match index_id {
                Some(ref id) => describe(id, &message),
                None => message,
            };

            if self.tracker.force_fail(task.id, description).await?.is_none() {
                debug!(task_id = %task.id, "Task completed before it could be reaped");
                continue;
            }
            warn!(task_id = %task.id, target = %task.target, "Reaped stale task");
            report.reaped.push(task.id);

            if let Some(index) = index_id {
                self.drop_unaliased(&index, &mut report).await;
            }
        }

        Ok(report)
    }

    async fn drop_unaliased(&self, index: &str, report: &mut ReapReport) {
        match self.engine.index_exists(index).await {
            Ok(false) => return,
            Ok(true) => {}
            Err(e) => {
                warn!(index = %index, error = %e, "Orphan index: cannot check existence");
                report.orphaned.push(index.to_string());
                return;
            }
        }

        match self.engine.aliases_for_index(index).await {
            Ok(aliases) if !aliases.is_empty() => {
                debug!(index = %index, aliases = ?aliases, "Index is live, keeping it");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(index = %index, error = %e, "Orphan index: cannot read aliases");
                report.orphaned.push(index.to_string());
                return;
            }
        }

        match self.engine.delete_index(index).await {
            Ok(()) => {
                info!(index = %index, "Deleted index of reaped task");
                report.deleted_indices.push(index.to_string());
            }
            Err(e) => {
                warn!(index = %index, error = %e, "Orphan index: delete failed");
                report.orphaned.push(index.to_string());
            }
        }
    }

    /// Reap every `period` until shutdown.
    pub async fn run(self, period: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reap(Utc::now()).await {
                        Ok(report) if !report.reaped.is_empty() => {
                            info!(
                                reaped = report.reaped.len(),
                                deleted = report.deleted_indices.len(),
                                orphaned = report.orphaned.len(),
                                "Reaper pass finished"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => error!(error = %e, "Reaper pass failed"),
                    }
                }
                _ = shutdown.recv() => {
                    debug!("Reaper stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reindexer_repository::{
        FailurePlan, InMemorySearchEngine, InMemoryTaskRepository, TaskRepository,
    };
    use reindexer_shared::{Task, TaskTarget};
    use std::collections::BTreeSet;

    async fn stale_task(repository: &InMemoryTaskRepository, description: &str) -> Task {
        let mut task = Task::start(TaskTarget::Context(Uuid::new_v4()), None, description);
        task.start_date = Utc::now() - chrono::Duration::hours(30);
        assert!(repository.insert_if_idle(&task).await.unwrap());
        task
    }

    #[tokio::test]
    async fn test_reap_fails_old_tasks_and_drops_their_index() {
        let repository = Arc::new(InMemoryTaskRepository::new());
        let engine = Arc::new(InMemorySearchEngine::new());
        engine.seed_index("dead001", &[], vec![]);
        engine.seed_index("live002", &["ctx"], vec![]);

        let dead = stale_task(&repository, &describe("dead001", "building")).await;
        let live = stale_task(&repository, &describe("live002", "building")).await;
        let fresh = Task::start(TaskTarget::Context(Uuid::new_v4()), None, "fresh");
        repository.insert_if_idle(&fresh).await.unwrap();

        let tracker = Arc::new(TaskTracker::new(repository.clone()));
        let reaper = StaleTaskReaper::new(tracker.clone(), engine.clone());
        let report = reaper.reap(Utc::now()).await.unwrap();

        assert_eq!(report.reaped.len(), 2);
        assert!(report.reaped.contains(&dead.id));
        assert!(report.reaped.contains(&live.id));
        assert_eq!(report.deleted_indices, vec!["dead001".to_string()]);
        assert!(engine.index_names().contains(&"live002".to_string()));

        let reaped = repository.get(dead.id).await.unwrap().unwrap();
        assert_eq!(reaped.success, Some(false));
        assert!(reaped.description.starts_with("[index=dead001] reaped"));
        assert!(repository.get(fresh.id).await.unwrap().unwrap().is_running());
    }

    #[tokio::test]
    async fn test_delete_failure_is_reported_as_orphan() {
        let repository = Arc::new(InMemoryTaskRepository::new());
        let engine = Arc::new(InMemorySearchEngine::new());
        engine.seed_index("stuck01", &[], vec![]);
        engine.fail_with(FailurePlan {
            delete_indices: BTreeSet::from(["stuck01".to_string()]),
            ..FailurePlan::default()
        });
        stale_task(&repository, &describe("stuck01", "building")).await;

        let reaper = StaleTaskReaper::new(Arc::new(TaskTracker::new(repository)), engine);
        let report = reaper.reap(Utc::now()).await.unwrap();

        assert_eq!(report.reaped.len(), 1);
        assert_eq!(report.orphaned, vec!["stuck01".to_string()]);
    }
}
