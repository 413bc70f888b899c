//! Request and response types for search engine operations.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One action of an atomic alias update.
///
/// Serializes to the engine's action shape, e.g.
/// `{"add": {"index": "e4f5g6h", "alias": "idx42"}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AliasAction {
    Add { index: String, alias: String },
    Remove { index: String, alias: String },
}

impl AliasAction {
    pub fn add(index: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Add {
            index: index.into(),
            alias: alias.into(),
        }
    }

    pub fn remove(index: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::Remove {
            index: index.into(),
            alias: alias.into(),
        }
    }
}

/// Build the body of an alias update request.
pub fn alias_actions_body(actions: &[AliasAction]) -> Value {
    json!({ "actions": actions })
}

/// Outcome of one bulk request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkSummary {
    /// Number of documents sent.
    pub total: usize,
    /// Number of documents the engine accepted.
    pub indexed: usize,
}

/// An ingest pipeline definition, installed once and referenced by id.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestPipeline {
    pub id: String,
    pub body: Value,
}

impl IngestPipeline {
    /// Identifier of the attachment extraction pipeline.
    pub const ATTACHMENT: &'static str = "attachment";

    /// Pipeline that extracts text and metadata from base64 encoded files.
    ///
    /// Reads the `data` member of each document, writes the extracted content
    /// under `attachment` and drops the raw payload.
    pub fn attachment() -> Self {
        Self {
            id: Self::ATTACHMENT.to_string(),
            body: json!({
                "description": "Extract text content from attached files",
                "processors": [
                    {
                        "attachment": {
                            "field": "data",
                            "ignore_missing": true
                        }
                    },
                    {
                        "remove": {
                            "field": "data",
                            "ignore_missing": true
                        }
                    }
                ]
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_actions_body_shape() {
        let body = alias_actions_body(&[
            AliasAction::remove("a1b2c3d", "idx42"),
            AliasAction::add("e4f5g6h", "idx42"),
        ]);

        assert_eq!(
            body,
            json!({
                "actions": [
                    {"remove": {"index": "a1b2c3d", "alias": "idx42"}},
                    {"add": {"index": "e4f5g6h", "alias": "idx42"}}
                ]
            })
        );
    }

    #[test]
    fn test_attachment_pipeline() {
        let pipeline = IngestPipeline::attachment();
        assert_eq!(pipeline.id, "attachment");
        assert_eq!(pipeline.body["processors"][0]["attachment"]["field"], "data");
    }
}
