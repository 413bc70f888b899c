//! # Reindexer Repository
//!
//! This crate provides the traits the reindexer talks to and their concrete
//! implementations:
//!
//! - [`SearchEngineProvider`]: physical indices, bulk loads, aliases and ingest
//!   pipelines, implemented for OpenSearch and in memory.
//! - [`TaskRepository`]: task records with an atomic single-flight insert,
//!   implemented for PostgreSQL and in memory.

pub mod config;
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod opensearch;
pub mod postgres;
pub mod types;

pub use config::ProviderConfig;
pub use errors::{SearchIndexError, TaskRepositoryError};
pub use interfaces::{SearchEngineProvider, TaskRepository};
pub use memory::{FailurePlan, InMemorySearchEngine, InMemoryTaskRepository};
pub use opensearch::OpenSearchProvider;
pub use postgres::PostgresTaskRepository;
pub use types::{AliasAction, BulkSummary, IngestPipeline};
