//! # Reindexer
//!
//! Builds search indices from indexation contexts and swaps stable aliases
//! onto them, so readers never see a half-built index.
//!
//! ## Architecture
//!
//! A build runs in a fixed order:
//!
//! 1. **Analysis**: resolve the context's analyzers into index settings
//! 2. **Mapping**: generate the index mapping from the context properties
//! 3. **Builder**: create a fresh physical index and load it, from a harvest or
//!    from the current index
//! 4. **Alias**: atomically move the context alias onto the new index and drop
//!    the old one
//!
//! Every build runs under a per-target task lock and is executed by the worker
//! pool; the scheduler and the stale-task reaper run alongside it.
//!
//! ## Modules
//!
//! - [`catalog`]: Sources, resources, contexts, search models and analysis objects
//! - [`analysis`]: Analyzer resolution
//! - [`mapping`]: Mapping generation
//! - [`harvest`]: Resource discovery and document harvesting
//! - [`builder`]: The index build pipeline
//! - [`alias`]: Atomic alias switching
//! - [`tracker`]: Task locks, history and the stale-task reaper
//! - [`worker`]: Background job execution
//! - [`scheduler`]: Frequency-driven rebuilds
//! - [`plugins`]: Search query templates and result shaping
//! - [`service`]: Public operations
//! - [`orchestrator`]: Process lifecycle
//! - [`config`]: Settings and dependency initialization
//! - [`errors`]: Error types

pub mod alias;
pub mod analysis;
pub mod builder;
pub mod catalog;
pub mod config;
pub mod errors;
pub mod harvest;
pub mod mapping;
pub mod orchestrator;
pub mod plugins;
pub mod scheduler;
pub mod service;
pub mod tracker;
pub mod worker;

pub use config::{Dependencies, Settings};
pub use errors::ReindexError;
pub use service::{BuildKind, ReindexService};

use thiserror::Error;

/// Errors that can occur during process initialization or execution.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Reindex error.
    #[error("Reindex error: {0}")]
    ReindexError(#[from] ReindexError),
}

impl ServiceError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
