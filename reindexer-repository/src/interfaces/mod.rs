//! Interface definitions for the reindexer backends.
//!
//! The traits here allow dependency injection of the search engine client and
//! the task store, so the engine can be exercised against in-memory fakes.

mod search_engine_provider;
mod task_repository;

pub use search_engine_provider::SearchEngineProvider;
pub use task_repository::TaskRepository;
