//! Search engine error types.

use thiserror::Error;

/// Errors from search engine operations.
///
/// Every variant means the engine was unreachable or rejected a request. They are
/// fatal to an in-progress build and never retried within it.
#[derive(Debug, Clone, Error)]
pub enum SearchIndexError {
    /// Failed to establish a connection to the engine.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Failed to create a physical index.
    #[error("Index creation error: {0}")]
    IndexCreationError(String),

    /// A bulk load was rejected, entirely or for some documents.
    #[error("Bulk index error: {0}")]
    BulkIndexError(String),

    /// Failed to read or update aliases.
    #[error("Alias error: {0}")]
    AliasError(String),

    /// Failed to delete a physical index.
    #[error("Delete error: {0}")]
    DeleteError(String),

    /// Failed to read or install an ingest pipeline.
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A server-side copy between indices failed.
    #[error("Reindex error: {0}")]
    ReindexError(String),

    /// A search request failed.
    #[error("Search error: {0}")]
    SearchError(String),

    /// Failed to parse a response from the engine.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The referenced index does not exist.
    #[error("Index not found: {0}")]
    IndexNotFound(String),
}

impl SearchIndexError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::ConnectionError(msg.into())
    }

    /// Create an index creation error.
    pub fn index_creation(msg: impl Into<String>) -> Self {
        Self::IndexCreationError(msg.into())
    }

    /// Create a bulk index error.
    pub fn bulk_index(msg: impl Into<String>) -> Self {
        Self::BulkIndexError(msg.into())
    }

    /// Create an alias error.
    pub fn alias(msg: impl Into<String>) -> Self {
        Self::AliasError(msg.into())
    }

    /// Create a delete error.
    pub fn delete(msg: impl Into<String>) -> Self {
        Self::DeleteError(msg.into())
    }

    /// Create a pipeline error.
    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::PipelineError(msg.into())
    }

    /// Create a reindex error.
    pub fn reindex(msg: impl Into<String>) -> Self {
        Self::ReindexError(msg.into())
    }

    /// Create a search error.
    pub fn search(msg: impl Into<String>) -> Self {
        Self::SearchError(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create an index not found error.
    pub fn index_not_found(index: impl Into<String>) -> Self {
        Self::IndexNotFound(index.into())
    }
}
