//! Errors raised while validating domain objects.

use thiserror::Error;

/// Validation failures on domain objects, independent of any backend.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ModelError {
    /// The source URI is not valid for its mode.
    #[error("Invalid URI '{uri}' for mode {mode}: {reason}")]
    InvalidUri {
        uri: String,
        mode: String,
        reason: String,
    },

    /// The source mode is not one the system knows how to harvest.
    #[error("Unknown source mode: {0}")]
    UnknownMode(String),

    /// The frequency label is not one of daily, weekly or monthly.
    #[error("Unknown reindex frequency: {0}")]
    UnknownFrequency(String),

    /// A column property lacks a required attribute.
    #[error("Invalid property: {0}")]
    InvalidProperty(String),
}
