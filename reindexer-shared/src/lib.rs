//! # Reindexer Shared
//!
//! This crate defines the domain types shared across the reindexer ecosystem:
//! data sources and their discovered resources, indexation contexts with their
//! column properties, the analysis objects (analyzers, filters, tokenizers)
//! composed into index settings, search models, tasks and documents.

pub mod errors;
pub mod types;

pub use errors::ModelError;
pub use types::analysis::{Analyzer, Filter, Tokenizer};
pub use types::context::{ColumnProperty, Context, Frequency};
pub use types::document::Document;
pub use types::search_model::SearchModel;
pub use types::source::{Column, Resource, Source, SourceMode};
pub use types::task::{Task, TaskTarget};
