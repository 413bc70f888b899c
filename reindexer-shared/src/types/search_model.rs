//! Search models: named query configurations over one or more contexts.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// A search configuration exposed to consumers.
///
/// Shares its naming namespace with [`crate::Context`]: no search model may
/// carry the name of a context and vice versa.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchModel {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub contexts: Vec<Uuid>,
    /// Registered plugin used to shape queries and results, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    /// Query body with `%param%` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_template: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl SearchModel {
    pub fn new(name: impl Into<String>, contexts: Vec<Uuid>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            contexts,
            plugin: None,
            query_template: None,
            user: None,
        }
    }
}
