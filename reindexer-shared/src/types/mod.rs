//! This module defines the core data structures used across the reindexer.

pub mod analysis;
pub mod context;
pub mod document;
pub mod search_model;
pub mod source;
pub mod task;
