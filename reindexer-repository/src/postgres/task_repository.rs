//! PostgreSQL-backed task repository.
//!
//! Tasks live in a `tasks` table. A partial unique index on
//! `(target_kind, target_id) WHERE success IS NULL` enforces the single running
//! task per target, so the idle check and the insert are one statement.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reindexer_shared::{Task, TaskTarget};
use sqlx::postgres::PgRow;
use sqlx::Row;
use uuid::Uuid;

use crate::errors::TaskRepositoryError;
use crate::interfaces::TaskRepository;

const TASK_COLUMNS: &str =
    "id, target_kind, target_id, user_name, start_date, stop_date, success, description";

/// PostgreSQL task repository.
pub struct PostgresTaskRepository {
    /// PostgreSQL connection pool
    pool: sqlx::PgPool,
}

impl PostgresTaskRepository {
    /// Creates a repository over an existing pool.
    ///
    /// The pool must point at a database with the `tasks` table; call
    /// [`PostgresTaskRepository::migrate`] once at startup to create it.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `url` and runs the embedded migrations.
    pub async fn connect(url: &str) -> Result<Self, TaskRepositoryError> {
        let pool = sqlx::PgPool::connect(url).await?;
        let repository = Self::new(pool);
        repository.migrate().await?;
        Ok(repository)
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), TaskRepositoryError> {
        sqlx::migrate!("src/postgres/migrations")
            .run(&self.pool)
            .await?;
        Ok(())
    }

    fn row_to_task(row: &PgRow) -> Result<Task, TaskRepositoryError> {
        let kind: String = row.try_get("target_kind")?;
        let target_id: Uuid = row.try_get("target_id")?;
        let target = TaskTarget::from_parts(&kind, target_id).ok_or_else(|| {
            TaskRepositoryError::CorruptRow(format!("unknown target kind '{}'", kind))
        })?;

        Ok(Task {
            id: row.try_get("id")?,
            target,
            user: row.try_get("user_name")?,
            start_date: row.try_get("start_date")?,
            stop_date: row.try_get("stop_date")?,
            success: row.try_get("success")?,
            description: row.try_get("description")?,
        })
    }

    fn rows_to_tasks(rows: &[PgRow]) -> Result<Vec<Task>, TaskRepositoryError> {
        rows.iter().map(Self::row_to_task).collect()
    }
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    async fn insert_if_idle(&self, task: &Task) -> Result<bool, TaskRepositoryError> {
        let result = sqlx::query(
            "INSERT INTO tasks (id, target_kind, target_id, user_name, start_date, stop_date, success, description) \
             VALUES ($1, $2, $3, $4, $5, NULL, NULL, $6) \
             ON CONFLICT (target_kind, target_id) WHERE success IS NULL DO NOTHING",
        )
        .bind(task.id)
        .bind(task.target.kind())
        .bind(task.target.id())
        .bind(task.user.as_deref())
        .bind(task.start_date)
        .bind(&task.description)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(
        &self,
        task_id: Uuid,
        success: bool,
        description: &str,
        stop_date: DateTime<Utc>,
    ) -> Result<Task, TaskRepositoryError> {
        let updated = sqlx::query(&format!(
            "UPDATE tasks SET success = $2, description = $3, stop_date = $4 \
             WHERE id = $1 AND success IS NULL RETURNING {}",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .bind(success)
        .bind(description)
        .bind(stop_date)
        .fetch_optional(&self.pool)
        .await?;

        match updated {
            Some(row) => Self::row_to_task(&row),
            None => match self.get(task_id).await? {
                Some(_) => Err(TaskRepositoryError::AlreadyCompleted(task_id)),
                None => Err(TaskRepositoryError::TaskNotFound(task_id)),
            },
        }
    }

    async fn get(&self, task_id: Uuid) -> Result<Option<Task>, TaskRepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM tasks WHERE id = $1", TASK_COLUMNS))
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn list_for_target(&self, target: &TaskTarget) -> Result<Vec<Task>, TaskRepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE target_kind = $1 AND target_id = $2 \
             ORDER BY start_date DESC, id DESC",
            TASK_COLUMNS
        ))
        .bind(target.kind())
        .bind(target.id())
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_tasks(&rows)
    }

    async fn running_for_target(
        &self,
        target: &TaskTarget,
    ) -> Result<Option<Task>, TaskRepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE target_kind = $1 AND target_id = $2 AND success IS NULL",
            TASK_COLUMNS
        ))
        .bind(target.kind())
        .bind(target.id())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn last_success(&self, target: &TaskTarget) -> Result<Option<Task>, TaskRepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE target_kind = $1 AND target_id = $2 AND success = TRUE \
             ORDER BY stop_date DESC LIMIT 1",
            TASK_COLUMNS
        ))
        .bind(target.kind())
        .bind(target.id())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_task).transpose()
    }

    async fn find_stale(
        &self,
        started_before: DateTime<Utc>,
    ) -> Result<Vec<Task>, TaskRepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tasks WHERE success IS NULL AND start_date < $1 \
             ORDER BY start_date DESC",
            TASK_COLUMNS
        ))
        .bind(started_before)
        .fetch_all(&self.pool)
        .await?;

        Self::rows_to_tasks(&rows)
    }

    async fn discard(&self, task_id: Uuid) -> Result<bool, TaskRepositoryError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
            .bind(task_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge(&self, target: &TaskTarget) -> Result<u64, TaskRepositoryError> {
        let result = sqlx::query("DELETE FROM tasks WHERE target_kind = $1 AND target_id = $2")
            .bind(target.kind())
            .bind(target.id())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
