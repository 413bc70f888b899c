//! Task tracking and the per-target lock.
//!
//! A target (context or source) is locked exactly while it has a task whose
//! outcome is unknown. Acquiring the lock and recording the task are one atomic
//! step in the repository, so concurrent callers cannot both get through.

mod reaper;

pub use reaper::{ReapReport, StaleTaskReaper};

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reindexer_repository::{TaskRepository, TaskRepositoryError};
use reindexer_shared::types::task::task_location;
use reindexer_shared::{Task, TaskTarget};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::ReindexError;

const INDEX_MARKER_PREFIX: &str = "[index=";

/// Prefix a task message with the physical index it concerns.
pub fn describe(index_id: &str, message: impl AsRef<str>) -> String {
    format!("{}{}] {}", INDEX_MARKER_PREFIX, index_id, message.as_ref())
}

/// Extract the physical index id embedded by [`describe`].
pub fn parse_index_id(description: &str) -> Option<&str> {
    let rest = description.strip_prefix(INDEX_MARKER_PREFIX)?;
    let (id, _) = rest.split_once(']')?;
    (!id.is_empty()).then_some(id)
}

/// Proof of holding the lock on a target.
///
/// Not `Clone`: [`TaskTracker::complete`] consumes it, so a task is completed
/// at most once through the tracker.
#[derive(Debug)]
pub struct TaskHandle {
    task: Task,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.task.id
    }

    pub fn target(&self) -> TaskTarget {
        self.task.target
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn ticket(&self) -> TaskTicket {
        TaskTicket {
            task_id: self.task.id,
            target: self.task.target,
            location: task_location(&self.task.target, self.task.id),
        }
    }
}

/// What a caller gets back when work is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskTicket {
    pub task_id: Uuid,
    pub target: TaskTarget,
    /// Where the task can be polled, e.g. `/contexts/{id}/tasks/{task_id}`.
    pub location: String,
}

/// Front end of the task repository.
pub struct TaskTracker {
    repository: Arc<dyn TaskRepository>,
}

impl TaskTracker {
    pub fn new(repository: Arc<dyn TaskRepository>) -> Self {
        Self { repository }
    }

    /// Lock `target` by recording a new running task.
    ///
    /// Returns `LockedError` when the target already has a running task.
    pub async fn acquire(
        &self,
        target: TaskTarget,
        user: Option<String>,
        description: impl Into<String>,
    ) -> Result<TaskHandle, ReindexError> {
        let task = Task::start(target, user, description);
        if !self.repository.insert_if_idle(&task).await? {
            debug!(target = %target, "Target is locked");
            return Err(ReindexError::LockedError(target));
        }
        info!(task_id = %task.id, target = %target, "Task started");
        Ok(TaskHandle { task })
    }

    /// Record the outcome of a task and release its target.
    pub async fn complete(
        &self,
        handle: TaskHandle,
        success: bool,
        description: impl Into<String>,
    ) -> Result<Task, ReindexError> {
        let description = description.into();
        let task = self
            .repository
            .complete(handle.id(), success, &description, Utc::now())
            .await?;
        if success {
            info!(task_id = %task.id, target = %task.target, description = %description, "Task succeeded");
        } else {
            warn!(task_id = %task.id, target = %task.target, description = %description, "Task failed");
        }
        Ok(task)
    }

    /// Fail a task without holding its handle.
    ///
    /// `None` when the task finished in the meantime.
    pub async fn force_fail(
        &self,
        task_id: Uuid,
        description: impl Into<String>,
    ) -> Result<Option<Task>, ReindexError> {
        match self
            .repository
            .complete(task_id, false, &description.into(), Utc::now())
            .await
        {
            Ok(task) => Ok(Some(task)),
            Err(TaskRepositoryError::AlreadyCompleted(_)) => Ok(None),
            Err(TaskRepositoryError::TaskNotFound(id)) => {
                Err(ReindexError::not_found(format!("task {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Tasks of `target`, newest first.
    pub async fn tasks(&self, target: &TaskTarget) -> Result<Vec<Task>, ReindexError> {
        Ok(self.repository.list_for_target(target).await?)
    }

    /// A single task of `target`.
    pub async fn task(&self, target: &TaskTarget, task_id: Uuid) -> Result<Task, ReindexError> {
        self.repository
            .get(task_id)
            .await?
            .filter(|task| task.target == *target)
            .ok_or_else(|| ReindexError::not_found(format!("task {}", task_id)))
    }

    pub async fn running(&self, target: &TaskTarget) -> Result<Option<Task>, ReindexError> {
        Ok(self.repository.running_for_target(target).await?)
    }

    pub async fn last_success(&self, target: &TaskTarget) -> Result<Option<Task>, ReindexError> {
        Ok(self.repository.last_success(target).await?)
    }

    /// Most recent failed task of `target`.
    pub async fn last_failure(&self, target: &TaskTarget) -> Result<Option<Task>, ReindexError> {
        Ok(self
            .repository
            .list_for_target(target)
            .await?
            .into_iter()
            .find(|task| task.success == Some(false)))
    }

    /// Running tasks started before `started_before`.
    pub async fn stale(&self, started_before: DateTime<Utc>) -> Result<Vec<Task>, ReindexError> {
        Ok(self.repository.find_stale(started_before).await?)
    }

    /// Release a lock taken for work that never happened, leaving no history.
    pub async fn discard(&self, handle: TaskHandle) -> Result<(), ReindexError> {
        self.repository.discard(handle.id()).await?;
        debug!(task_id = %handle.id(), target = %handle.target(), "Task discarded");
        Ok(())
    }

    /// Delete every task of `target`.
    pub async fn purge(&self, target: &TaskTarget) -> Result<u64, ReindexError> {
        let removed = self.repository.purge(target).await?;
        debug!(target = %target, removed = removed, "Tasks purged");
        Ok(removed)
    }
}
