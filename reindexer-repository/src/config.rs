//! Configuration types for the search engine providers.

use std::time::Duration;

/// Configuration for a [`crate::SearchEngineProvider`] implementation.
///
/// Controls details of the wire format sent to the engine that differ between
/// engine versions.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Legacy mapping type written as `_type` in bulk action lines.
    ///
    /// Engines from before typeless indices require it; leave `None` for
    /// OpenSearch and Elasticsearch 7+.
    pub document_type: Option<String>,

    /// Timeout applied to server-side copies between indices.
    ///
    /// Defaults to 30 minutes.
    pub reindex_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            document_type: None,
            reindex_timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl ProviderConfig {
    /// Create a config that writes the given legacy `_type` in bulk loads.
    pub fn with_document_type(document_type: impl Into<String>) -> Self {
        Self {
            document_type: Some(document_type.into()),
            ..Self::default()
        }
    }
}
