//! Task store error types.

use thiserror::Error;
use uuid::Uuid;

/// Represents errors that can occur within the task repository.
#[derive(Debug, Error)]
pub enum TaskRepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("Task not found: {0}")]
    TaskNotFound(Uuid),

    /// The task already reached a terminal state.
    #[error("Task already completed: {0}")]
    AlreadyCompleted(Uuid),

    /// A stored row could not be mapped back to a task.
    #[error("Corrupt task row: {0}")]
    CorruptRow(String),
}
