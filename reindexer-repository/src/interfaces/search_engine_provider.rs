//! Search engine provider trait definition.

use async_trait::async_trait;
use reindexer_shared::Document;
use serde_json::Value;

use crate::errors::SearchIndexError;
use crate::types::{AliasAction, BulkSummary, IngestPipeline};

/// Abstracts the search engine (OpenSearch, Elasticsearch, or an in-memory fake).
///
/// A single client is constructed at startup and shared by the build pipeline
/// and the alias switch. All methods map engine failures to
/// [`SearchIndexError`].
#[async_trait]
pub trait SearchEngineProvider: Send + Sync {
    /// Create a physical index from a `{mappings, settings}` body.
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchIndexError>;

    /// Whether a physical index exists.
    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError>;

    /// Delete a physical index.
    async fn delete_index(&self, index: &str) -> Result<(), SearchIndexError>;

    /// Load one batch of documents into an index in a single bulk request.
    ///
    /// When `pipeline` is set every document goes through that ingest pipeline.
    /// Any per-document rejection fails the whole call.
    async fn bulk_index(
        &self,
        index: &str,
        documents: &[Document],
        pipeline: Option<&str>,
    ) -> Result<BulkSummary, SearchIndexError>;

    /// Make recently loaded documents visible to searches.
    async fn refresh(&self, index: &str) -> Result<(), SearchIndexError>;

    /// Physical indices currently bound to an alias, sorted. Empty when the
    /// alias does not exist.
    async fn indices_for_alias(&self, alias: &str) -> Result<Vec<String>, SearchIndexError>;

    /// Aliases currently held by a physical index, sorted.
    async fn aliases_for_index(&self, index: &str) -> Result<Vec<String>, SearchIndexError>;

    /// Apply a batch of alias actions atomically.
    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchIndexError>;

    /// Install an ingest pipeline unless one with the same id already exists.
    ///
    /// Returns `true` when the pipeline was created by this call.
    async fn ensure_pipeline(&self, pipeline: &IngestPipeline) -> Result<bool, SearchIndexError>;

    /// Copy every document from `source` into `dest` on the server side.
    ///
    /// Returns the number of documents copied.
    async fn reindex(&self, source: &str, dest: &str) -> Result<u64, SearchIndexError>;

    /// Run a search request against the given indices or aliases.
    async fn search(&self, targets: &[String], body: &Value) -> Result<Value, SearchIndexError>;
}
