//! Batch loader.
//!
//! Buffers harvested documents and bulk-loads them into one physical index in
//! fixed-size batches.

use std::sync::Arc;

use futures::StreamExt;
use reindexer_repository::{SearchEngineProvider, SearchIndexError};
use reindexer_shared::Document;
use tracing::{debug, error, instrument};

use crate::errors::ReindexError;
use crate::harvest::DocumentStream;

/// Default number of documents per bulk request.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Configuration for the batch loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Number of documents to batch before flushing.
    pub batch_size: usize,
    /// Ingest pipeline applied to every document.
    pub pipeline: Option<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            pipeline: None,
        }
    }
}

/// Loader that indexes documents into a single index.
///
/// Any rejected batch is an error: a partially loaded index must never be
/// aliased.
pub struct BatchLoader {
    engine: Arc<dyn SearchEngineProvider>,
    index: String,
    config: LoaderConfig,
    pending: Vec<Document>,
    loaded: u64,
    batches: u64,
}

impl BatchLoader {
    pub fn new(engine: Arc<dyn SearchEngineProvider>, index: impl Into<String>) -> Self {
        Self::with_config(engine, index, LoaderConfig::default())
    }

    pub fn with_config(
        engine: Arc<dyn SearchEngineProvider>,
        index: impl Into<String>,
        config: LoaderConfig,
    ) -> Self {
        let config = LoaderConfig {
            batch_size: config.batch_size.max(1),
            ..config
        };
        Self {
            engine,
            index: index.into(),
            pending: Vec::with_capacity(config.batch_size),
            config,
            loaded: 0,
            batches: 0,
        }
    }

    /// Documents loaded so far.
    pub fn loaded(&self) -> u64 {
        self.loaded
    }

    /// Queue a document, flushing when the batch is full.
    pub async fn push(&mut self, document: Document) -> Result<(), ReindexError> {
        self.pending.push(document);
        if self.pending.len() >= self.config.batch_size {
            self.flush().await?;
        }
        Ok(())
    }

    /// Send every pending document.
    pub async fn flush(&mut self) -> Result<(), ReindexError> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let batch: Vec<Document> = self.pending.drain(..).collect();
        self.batches += 1;
        debug!(index = %self.index, batch = self.batches, count = batch.len(), "Flushing batch");

        let summary = self
            .engine
            .bulk_index(&self.index, &batch, self.config.pipeline.as_deref())
            .await
            .map_err(|e| {
                error!(index = %self.index, batch = self.batches, error = %e, "Bulk load failed");
                e
            })?;

        if summary.indexed < summary.total {
            error!(
                index = %self.index,
                batch = self.batches,
                indexed = summary.indexed,
                total = summary.total,
                "Bulk load rejected documents"
            );
            return Err(SearchIndexError::bulk_index(format!(
                "batch {} on {}: {} of {} documents indexed",
                self.batches, self.index, summary.indexed, summary.total
            ))
            .into());
        }
        self.loaded += summary.indexed as u64;
        Ok(())
    }

    /// Drain `stream` into the index and return the number of documents loaded.
    #[instrument(skip(self, stream), fields(index = %self.index))]
    pub async fn load_stream(mut self, mut stream: DocumentStream) -> Result<u64, ReindexError> {
        while let Some(document) = stream.next().await {
            self.push(document?).await?;
        }
        self.flush().await?;
        Ok(self.loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use reindexer_repository::{FailurePlan, InMemorySearchEngine};
    use serde_json::json;

    fn documents(n: usize) -> Vec<Result<Document, ReindexError>> {
        (0..n)
            .map(|i| Ok(Document::from_value(json!({ "id": format!("d{}", i) }))))
            .collect()
    }

    #[tokio::test]
    async fn test_load_stream_in_batches() {
        let engine = Arc::new(InMemorySearchEngine::new());
        engine.seed_index("target1", &[], vec![]);
        let loader = BatchLoader::with_config(
            engine.clone(),
            "target1",
            LoaderConfig {
                batch_size: 2,
                pipeline: None,
            },
        );

        let loaded = loader
            .load_stream(stream::iter(documents(5)).boxed())
            .await
            .unwrap();

        assert_eq!(loaded, 5);
        assert_eq!(engine.documents("target1").len(), 5);
    }

    #[tokio::test]
    async fn test_failing_batch_stops_the_load() {
        let engine = Arc::new(InMemorySearchEngine::new());
        engine.seed_index("target1", &[], vec![]);
        engine.fail_with(FailurePlan {
            bulk_from_call: Some(2),
            ..FailurePlan::default()
        });
        let loader = BatchLoader::with_config(
            engine.clone(),
            "target1",
            LoaderConfig {
                batch_size: 2,
                pipeline: None,
            },
        );

        let result = loader.load_stream(stream::iter(documents(5)).boxed()).await;

        assert!(matches!(result, Err(ReindexError::UpstreamError(_))));
        assert_eq!(engine.documents("target1").len(), 2);
    }

    #[tokio::test]
    async fn test_rejected_items_are_an_upstream_error() {
        let engine = Arc::new(InMemorySearchEngine::new());
        engine.seed_index("target1", &[], vec![]);
        engine.fail_with(FailurePlan {
            bulk_rejected_items: 1,
            ..FailurePlan::default()
        });
        let loader = BatchLoader::with_config(
            engine.clone(),
            "target1",
            LoaderConfig {
                batch_size: 3,
                pipeline: None,
            },
        );

        let result = loader.load_stream(stream::iter(documents(3)).boxed()).await;

        match result {
            Err(ReindexError::UpstreamError(e)) => {
                assert!(e.to_string().contains("2 of 3 documents indexed"), "{}", e)
            }
            other => panic!("expected an upstream error, got {:?}", other),
        }
        assert_eq!(engine.documents("target1").len(), 2);
    }

    #[tokio::test]
    async fn test_harvest_error_stops_the_load() {
        let engine = Arc::new(InMemorySearchEngine::new());
        engine.seed_index("target1", &[], vec![]);
        let mut items = documents(1);
        items.push(Err(ReindexError::harvest("broken record")));

        let result = BatchLoader::new(engine, "target1")
            .load_stream(stream::iter(items).boxed())
            .await;

        assert!(matches!(result, Err(ReindexError::HarvestError(_))));
    }
}
