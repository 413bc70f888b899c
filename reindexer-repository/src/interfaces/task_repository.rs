//! Task repository trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reindexer_shared::{Task, TaskTarget};
use uuid::Uuid;

use crate::errors::TaskRepositoryError;

/// Persistence for task records.
///
/// Implementations must make [`TaskRepository::insert_if_idle`] a single atomic
/// operation: under any concurrency at most one running task (`success` is
/// null) exists per target.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Insert `task` unless its target already has a running task.
    ///
    /// Returns `false`, inserting nothing, when the target is busy.
    async fn insert_if_idle(&self, task: &Task) -> Result<bool, TaskRepositoryError>;

    /// Move a running task to its terminal state.
    ///
    /// Fails with `AlreadyCompleted` if the task is no longer running.
    async fn complete(
        &self,
        task_id: Uuid,
        success: bool,
        description: &str,
        stop_date: DateTime<Utc>,
    ) -> Result<Task, TaskRepositoryError>;

    /// Fetch a task by id.
    async fn get(&self, task_id: Uuid) -> Result<Option<Task>, TaskRepositoryError>;

    /// All tasks of a target, newest first.
    async fn list_for_target(&self, target: &TaskTarget) -> Result<Vec<Task>, TaskRepositoryError>;

    /// The running task of a target, if any.
    async fn running_for_target(
        &self,
        target: &TaskTarget,
    ) -> Result<Option<Task>, TaskRepositoryError>;

    /// Most recent successful task of a target.
    async fn last_success(&self, target: &TaskTarget) -> Result<Option<Task>, TaskRepositoryError>;

    /// Running tasks started before `started_before`.
    async fn find_stale(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskRepositoryError>;

    /// Delete one task, returning whether it existed.
    async fn discard(&self, task_id: Uuid) -> Result<bool, TaskRepositoryError>;

    /// Delete every task of a target, returning how many were removed.
    async fn purge(&self, target: &TaskTarget) -> Result<u64, TaskRepositoryError>;
}
