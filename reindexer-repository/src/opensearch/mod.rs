//! OpenSearch implementation of the search engine provider.
//!
//! This module provides a concrete implementation of `SearchEngineProvider`
//! using the OpenSearch Rust crate, plus the request bodies and response
//! parsing shared with the in-memory engine.

mod index_config;
mod provider;
pub mod wire;

pub use index_config::{index_body, IndexSettings};
pub use provider::OpenSearchProvider;
