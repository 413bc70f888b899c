//! PostgreSQL implementation of the task repository.

mod task_repository;

pub use task_repository::PostgresTaskRepository;
