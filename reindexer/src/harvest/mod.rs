//! Harvesting seams.
//!
//! The engine does not know how documents are extracted from a source; it asks
//! a [`SourceCatalog`] which resources a source offers and a
//! [`DocumentHarvester`] for the documents of one resource.

mod discovery;
mod ndjson;

pub use discovery::DirectorySourceCatalog;
pub use ndjson::NdjsonHarvester;

use async_trait::async_trait;
use futures::stream::BoxStream;
use reindexer_shared::{Document, Resource, Source};

use crate::errors::ReindexError;

/// Lazy, finite stream of harvested documents.
pub type DocumentStream = BoxStream<'static, Result<Document, ReindexError>>;

/// Lists the resources a source offers.
#[async_trait]
pub trait SourceCatalog: Send + Sync {
    async fn discover(&self, source: &Source) -> Result<Vec<Resource>, ReindexError>;
}

/// Produces the documents of a resource.
#[async_trait]
pub trait DocumentHarvester: Send + Sync {
    async fn collect(
        &self,
        source: &Source,
        resource: &Resource,
    ) -> Result<DocumentStream, ReindexError>;
}
