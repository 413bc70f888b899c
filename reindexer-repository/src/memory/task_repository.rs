//! In-memory task repository.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reindexer_shared::{Task, TaskTarget};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::errors::TaskRepositoryError;
use crate::interfaces::TaskRepository;

/// Task store held in process memory.
///
/// Every operation runs under one mutex, which makes the idle check and the
/// insert in [`TaskRepository::insert_if_idle`] a single critical section.
#[derive(Default)]
pub struct InMemoryTaskRepository {
    tasks: Mutex<HashMap<Uuid, Task>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(mut tasks: Vec<Task>) -> Vec<Task> {
    tasks.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));
    tasks
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn insert_if_idle(&self, task: &Task) -> Result<bool, TaskRepositoryError> {
        let mut tasks = self.tasks.lock().await;
        let busy = tasks
            .values()
            .any(|t| t.target == task.target && t.is_running());
        if busy {
            return Ok(false);
        }
        tasks.insert(task.id, task.clone());
        Ok(true)
    }

    async fn complete(
        &self,
        task_id: Uuid,
        success: bool,
        description: &str,
        stop_date: DateTime<Utc>,
    ) -> Result<Task, TaskRepositoryError> {
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(&task_id)
            .ok_or(TaskRepositoryError::TaskNotFound(task_id))?;
        if !task.is_running() {
            return Err(TaskRepositoryError::AlreadyCompleted(task_id));
        }
        task.success = Some(success);
        task.stop_date = Some(stop_date);
        task.description = description.to_string();
        Ok(task.clone())
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<Task>, TaskRepositoryError> {
        Ok(self.tasks.lock().await.get(&task_id).cloned())
    }

    async fn list_for_target(&self, target: &TaskTarget) -> Result<Vec<Task>, TaskRepositoryError> {
        let tasks = self.tasks.lock().await;
        Ok(newest_first(
            tasks.values().filter(|t| &t.target == target).cloned().collect(),
        ))
    }

    async fn running_for_target(
        &self,
        target: &TaskTarget,
    ) -> Result<Option<Task>, TaskRepositoryError> {
        let tasks = self.tasks.lock().await;
        Ok(tasks
            .values()
            .find(|t| &t.target == target && t.is_running())
            .cloned())
    }

    async fn last_success(&self, target: &TaskTarget) -> Result<Option<Task>, TaskRepositoryError> {
        let tasks = self.tasks.lock().await;
        Ok(tasks
            .values()
            .filter(|t| &t.target == target && t.success == Some(true))
            .max_by_key(|t| t.stop_date)
            .cloned())
    }

    async fn find_stale(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskRepositoryError> {
        let tasks = self.tasks.lock().await;
        Ok(newest_first(
            tasks
                .values()
                .filter(|t| t.is_running() && t.start_date < started_before)
                .cloned()
                .collect(),
        ))
    }

    async fn discard(&self, task_id: Uuid) -> Result<bool, TaskRepositoryError> {
        Ok(self.tasks.lock().await.remove(&task_id).is_some())
    }

    async fn purge(&self, target: &TaskTarget) -> Result<u64, TaskRepositoryError> {
        let mut tasks = self.tasks.lock().await;
        let before = tasks.len();
        tasks.retain(|_, t| &t.target != target);
        Ok((before - tasks.len()) as u64)
    }
}
