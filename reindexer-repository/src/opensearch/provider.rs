//! OpenSearch provider implementation.
//!
//! This module provides the concrete implementation of `SearchEngineProvider`
//! using the OpenSearch Rust crate.

use async_trait::async_trait;
use opensearch::{
    http::{
        request::JsonBody,
        response::Response,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    indices::{
        IndicesCreateParts, IndicesDeleteParts, IndicesExistsParts, IndicesGetAliasParts,
        IndicesRefreshParts,
    },
    ingest::{IngestGetPipelineParts, IngestPutPipelineParts},
    BulkParts, OpenSearch, SearchParts,
};
use reindexer_shared::Document;
use serde_json::Value;
use tracing::{debug, error, info};
use url::Url;

use crate::config::ProviderConfig;
use crate::errors::SearchIndexError;
use crate::interfaces::SearchEngineProvider;
use crate::opensearch::wire;
use crate::types::{alias_actions_body, AliasAction, BulkSummary, IngestPipeline};

/// OpenSearch provider implementation.
///
/// Wraps one `OpenSearch` client. Construct it once at startup and share it
/// behind an `Arc<dyn SearchEngineProvider>`.
///
/// # Example
///
/// ```ignore
/// use reindexer_repository::{OpenSearchProvider, ProviderConfig};
///
/// let provider = OpenSearchProvider::new("http://localhost:9200", ProviderConfig::default())?;
/// provider.check_ready().await?;
/// ```
pub struct OpenSearchProvider {
    client: OpenSearch,
    config: ProviderConfig,
}

impl OpenSearchProvider {
    /// Create a new OpenSearch provider connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    /// * `config` - Wire format options
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchProvider)` - A new provider instance
    /// * `Err(SearchIndexError)` - If the URL is invalid or the transport cannot be built
    pub fn new(url: &str, config: ProviderConfig) -> Result<Self, SearchIndexError> {
        let parsed_url =
            Url::parse(url).map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let transport = TransportBuilder::new(conn_pool)
            .disable_proxy()
            .build()
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(
            url = %url,
            document_type = ?config.document_type,
            "Created OpenSearch provider"
        );

        Ok(Self { client, config })
    }

    /// Ping the cluster.
    pub async fn check_ready(&self) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .ping()
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;
        Self::expect_success(response, "Ping", SearchIndexError::ConnectionError).await?;
        Ok(())
    }

    /// Turn a non-2xx response into an error carrying the status and body.
    async fn expect_success(
        response: Response,
        operation: &str,
        make_error: fn(String) -> SearchIndexError,
    ) -> Result<Response, SearchIndexError> {
        let status = response.status_code();
        if status.is_success() {
            return Ok(response);
        }
        let error_body = response.text().await.unwrap_or_default();
        error!(status = %status, body = %error_body, operation, "Request failed");
        Err(make_error(format!(
            "{} failed with status {}: {}",
            operation, status, error_body
        )))
    }

    async fn json(response: Response) -> Result<Value, SearchIndexError> {
        response
            .json::<Value>()
            .await
            .map_err(|e| SearchIndexError::parse(e.to_string()))
    }
}

#[async_trait]
impl SearchEngineProvider for OpenSearchProvider {
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(body.clone())
            .send()
            .await
            .map_err(|e| SearchIndexError::index_creation(e.to_string()))?;

        Self::expect_success(response, "Create index", SearchIndexError::IndexCreationError).await?;
        debug!(index = %index, "Index created");
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError> {
        let response = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        Ok(response.status_code().is_success())
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .delete(IndicesDeleteParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::delete(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::index_not_found(index));
        }
        Self::expect_success(response, "Delete index", SearchIndexError::DeleteError).await?;
        debug!(index = %index, "Index deleted");
        Ok(())
    }

    async fn bulk_index(
        &self,
        index: &str,
        documents: &[Document],
        pipeline: Option<&str>,
    ) -> Result<BulkSummary, SearchIndexError> {
        if documents.is_empty() {
            return Ok(BulkSummary::default());
        }

        let body: Vec<JsonBody<Value>> =
            wire::bulk_lines(index, self.config.document_type.as_deref(), documents)
                .into_iter()
                .map(JsonBody::new)
                .collect();

        let mut request = self.client.bulk(BulkParts::None).body(body);
        if let Some(pipeline) = pipeline {
            request = request.pipeline(pipeline);
        }

        let response = request
            .send()
            .await
            .map_err(|e| SearchIndexError::bulk_index(e.to_string()))?;
        let response = Self::expect_success(response, "Bulk", SearchIndexError::BulkIndexError).await?;
        let result = Self::json(response).await?;

        if let Some(failure) = wire::bulk_failure(&result) {
            return Err(SearchIndexError::bulk_index(failure));
        }

        let summary = BulkSummary {
            total: documents.len(),
            indexed: wire::bulk_indexed(&result),
        };
        debug!(index = %index, indexed = summary.indexed, "Bulk batch loaded");
        Ok(summary)
    }

    async fn refresh(&self, index: &str) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .refresh(IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::connection(e.to_string()))?;

        Self::expect_success(response, "Refresh", SearchIndexError::ConnectionError).await?;
        Ok(())
    }

    async fn indices_for_alias(&self, alias: &str) -> Result<Vec<String>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_alias(IndicesGetAliasParts::Name(&[alias]))
            .send()
            .await
            .map_err(|e| SearchIndexError::alias(e.to_string()))?;

        // 404 means the alias is not bound to anything yet
        if response.status_code().as_u16() == 404 {
            return Ok(Vec::new());
        }
        let response = Self::expect_success(response, "Get alias", SearchIndexError::AliasError).await?;
        Ok(wire::indices_in_alias_response(&Self::json(response).await?))
    }

    async fn aliases_for_index(&self, index: &str) -> Result<Vec<String>, SearchIndexError> {
        let response = self
            .client
            .indices()
            .get_alias(IndicesGetAliasParts::Index(&[index]))
            .send()
            .await
            .map_err(|e| SearchIndexError::alias(e.to_string()))?;

        if response.status_code().as_u16() == 404 {
            return Err(SearchIndexError::index_not_found(index));
        }
        let response =
            Self::expect_success(response, "Get index aliases", SearchIndexError::AliasError).await?;
        Ok(wire::aliases_in_alias_response(
            &Self::json(response).await?,
            index,
        ))
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchIndexError> {
        let response = self
            .client
            .indices()
            .update_aliases()
            .body(alias_actions_body(actions))
            .send()
            .await
            .map_err(|e| SearchIndexError::alias(e.to_string()))?;

        Self::expect_success(response, "Update aliases", SearchIndexError::AliasError).await?;
        debug!(action_count = actions.len(), "Alias actions applied");
        Ok(())
    }

    async fn ensure_pipeline(&self, pipeline: &IngestPipeline) -> Result<bool, SearchIndexError> {
        let existing = self
            .client
            .ingest()
            .get_pipeline(IngestGetPipelineParts::Id(&pipeline.id))
            .send()
            .await
            .map_err(|e| SearchIndexError::pipeline(e.to_string()))?;

        if existing.status_code().is_success() {
            debug!(pipeline = %pipeline.id, "Ingest pipeline already present");
            return Ok(false);
        }

        let response = self
            .client
            .ingest()
            .put_pipeline(IngestPutPipelineParts::Id(&pipeline.id))
            .body(pipeline.body.clone())
            .send()
            .await
            .map_err(|e| SearchIndexError::pipeline(e.to_string()))?;

        Self::expect_success(response, "Put pipeline", SearchIndexError::PipelineError).await?;
        info!(pipeline = %pipeline.id, "Ingest pipeline created");
        Ok(true)
    }

    async fn reindex(&self, source: &str, dest: &str) -> Result<u64, SearchIndexError> {
        let timeout = format!("{}s", self.config.reindex_timeout.as_secs());
        let response = self
            .client
            .reindex()
            .wait_for_completion(true)
            .timeout(&timeout)
            .body(serde_json::json!({
                "source": { "index": source },
                "dest": { "index": dest }
            }))
            .send()
            .await
            .map_err(|e| SearchIndexError::reindex(e.to_string()))?;

        let response = Self::expect_success(response, "Reindex", SearchIndexError::ReindexError).await?;
        let copied = wire::reindex_outcome(&Self::json(response).await?)
            .map_err(SearchIndexError::reindex)?;
        debug!(source = %source, dest = %dest, copied, "Server-side copy finished");
        Ok(copied)
    }

    async fn search(&self, targets: &[String], body: &Value) -> Result<Value, SearchIndexError> {
        let targets: Vec<&str> = targets.iter().map(String::as_str).collect();
        let response = self
            .client
            .search(SearchParts::Index(&targets))
            .body(body.clone())
            .send()
            .await
            .map_err(|e| SearchIndexError::search(e.to_string()))?;

        let response = Self::expect_success(response, "Search", SearchIndexError::SearchError).await?;
        Self::json(response).await
    }
}
