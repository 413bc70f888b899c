//! Error types for the reindexer repository.
//!
//! One error type per backend seam: the search engine and the task store.

mod search_index_error;
mod task_repository_error;

pub use search_index_error::SearchIndexError;
pub use task_repository_error::TaskRepositoryError;
