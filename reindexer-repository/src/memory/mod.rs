//! In-memory implementations of the backend traits.
//!
//! Used when no database is configured and as the fake engine in tests.

mod search_engine;
mod task_repository;

pub use search_engine::{FailurePlan, InMemorySearchEngine};
pub use task_repository::InMemoryTaskRepository;
