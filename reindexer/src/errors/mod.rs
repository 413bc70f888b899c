//! Error types for the reindexer.
//!
//! Errors raised before a task exists (validation, naming conflicts, lock
//! contention, unknown references) are returned to the caller directly. Once a
//! task exists, failures are recorded on it instead.

use reindexer_repository::{SearchIndexError, TaskRepositoryError};
use reindexer_shared::{ModelError, TaskTarget};
use thiserror::Error;

/// Errors that can occur while preparing or running a reindex.
#[derive(Error, Debug)]
pub enum ReindexError {
    /// Malformed mapping or property input.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Duplicate name in a shared namespace.
    #[error("Conflict: {0}")]
    ConflictError(String),

    /// Another operation is already running for the target.
    #[error("Locked: a task is already running for {0}")]
    LockedError(TaskTarget),

    /// A referenced object does not exist.
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// The search engine is unreachable or rejected a request.
    #[error("Upstream error: {0}")]
    UpstreamError(#[from] SearchIndexError),

    /// A harvester failed to produce documents or resources.
    #[error("Harvest error: {0}")]
    HarvestError(String),

    /// The task store failed.
    #[error("Task store error: {0}")]
    TaskStoreError(#[from] TaskRepositoryError),

    /// A search template could not be rendered.
    #[error("Template error: {0}")]
    TemplateError(String),

    /// The job queue is no longer accepting work.
    #[error("Queue error: {0}")]
    QueueError(String),
}

impl ReindexError {
    /// Create a validation error.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationError(msg.into())
    }

    /// Create a conflict error.
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConflictError(msg.into())
    }

    /// Create a not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFoundError(msg.into())
    }

    /// Create a harvest error.
    pub fn harvest(msg: impl Into<String>) -> Self {
        Self::HarvestError(msg.into())
    }

    /// Create a template error.
    pub fn template(msg: impl Into<String>) -> Self {
        Self::TemplateError(msg.into())
    }

    /// Create a queue error.
    pub fn queue(msg: impl Into<String>) -> Self {
        Self::QueueError(msg.into())
    }

    /// HTTP-equivalent status code for the error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ValidationError(_) | Self::TemplateError(_) => 400,
            Self::NotFoundError(_) => 404,
            Self::ConflictError(_) => 409,
            Self::LockedError(_) => 423,
            Self::UpstreamError(_) | Self::HarvestError(_) => 502,
            Self::TaskStoreError(_) | Self::QueueError(_) => 500,
        }
    }
}

impl From<ModelError> for ReindexError {
    fn from(err: ModelError) -> Self {
        Self::ValidationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_codes() {
        assert_eq!(ReindexError::validation("x").status_code(), 400);
        assert_eq!(ReindexError::conflict("x").status_code(), 409);
        assert_eq!(
            ReindexError::LockedError(TaskTarget::Context(Uuid::new_v4())).status_code(),
            423
        );
        assert_eq!(ReindexError::not_found("x").status_code(), 404);
        assert_eq!(
            ReindexError::from(SearchIndexError::bulk_index("x")).status_code(),
            502
        );
    }

    #[test]
    fn test_model_errors_become_validation_errors() {
        let err: ReindexError = ModelError::InvalidProperty("no type".to_string()).into();
        assert!(matches!(err, ReindexError::ValidationError(_)));
    }
}
