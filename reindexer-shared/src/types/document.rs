//! Documents produced by harvesters and loaded into an index.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A harvested document ready for bulk loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id in the index; the engine assigns one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub body: Value,
}

impl Document {
    pub fn new(id: Option<String>, body: Value) -> Self {
        Self { id, body }
    }

    /// Build a document from a JSON object, taking its id from the `id` member.
    ///
    /// String and numeric ids are accepted; the member stays in the body.
    pub fn from_value(body: Value) -> Self {
        let id = match body.get("id") {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self { id, body }
    }
}
