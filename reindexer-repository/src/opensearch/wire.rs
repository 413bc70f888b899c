//! Bulk bodies and response parsing for the engine's REST API.

use reindexer_shared::Document;
use serde_json::{json, Map, Value};

/// Build the newline-delimited bulk body for one batch.
///
/// Each document becomes an `{"index": {"_index", "_type"?, "_id"?}}` action
/// line followed by the document itself. `_type` is only written for legacy
/// engines and `_id` only when the document has one.
pub fn bulk_lines(index: &str, document_type: Option<&str>, documents: &[Document]) -> Vec<Value> {
    let mut lines = Vec::with_capacity(documents.len() * 2);
    for document in documents {
        let mut meta = Map::new();
        meta.insert("_index".to_string(), json!(index));
        if let Some(doc_type) = document_type {
            meta.insert("_type".to_string(), json!(doc_type));
        }
        if let Some(ref id) = document.id {
            meta.insert("_id".to_string(), json!(id));
        }
        lines.push(json!({ "index": Value::Object(meta) }));
        lines.push(document.body.clone());
    }
    lines
}

/// Describe the first rejected item of a bulk response, if any.
///
/// Returns `None` when the response reports no errors.
pub fn bulk_failure(response: &Value) -> Option<String> {
    if !response["errors"].as_bool().unwrap_or(false) {
        return None;
    }

    let items = response["items"].as_array()?;
    let failed: Vec<&Value> = items
        .iter()
        .filter_map(|item| item.as_object()?.values().next())
        .filter(|result| result.get("error").is_some())
        .collect();

    let first = failed.first()?;
    let reason = first["error"]["reason"]
        .as_str()
        .unwrap_or("unknown reason")
        .to_string();
    Some(format!(
        "{} of {} documents rejected, first: id={} {}",
        failed.len(),
        items.len(),
        first["_id"].as_str().unwrap_or("-"),
        reason
    ))
}

/// Count the documents a bulk response reports as stored.
pub fn bulk_indexed(response: &Value) -> usize {
    response["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_object()?.values().next())
                .filter(|result| result.get("error").is_none())
                .count()
        })
        .unwrap_or(0)
}

/// Indices listed in a get-alias response, sorted.
///
/// The response is keyed by physical index:
/// `{"a1b2c3d": {"aliases": {"idx42": {}}}}`.
pub fn indices_in_alias_response(response: &Value) -> Vec<String> {
    let mut indices: Vec<String> = response
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    indices.sort();
    indices
}

/// Aliases held by `index` in a get-alias response, sorted.
pub fn aliases_in_alias_response(response: &Value, index: &str) -> Vec<String> {
    let mut aliases: Vec<String> = response[index]["aliases"]
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default();
    aliases.sort();
    aliases
}

/// Number of documents written by a reindex response, or the failure reason.
///
/// A copy that timed out or accounted for fewer documents than it saw is a
/// failure even without reported `failures`.
pub fn reindex_outcome(response: &Value) -> Result<u64, String> {
    if let Some(failures) = response["failures"].as_array() {
        if let Some(first) = failures.first() {
            return Err(format!(
                "{} failures, first: {}",
                failures.len(),
                first["cause"]["reason"].as_str().unwrap_or("unknown reason")
            ));
        }
    }
    let created = response["created"].as_u64().unwrap_or(0);
    let updated = response["updated"].as_u64().unwrap_or(0);
    let conflicts = response["version_conflicts"].as_u64().unwrap_or(0);

    if response["timed_out"].as_bool().unwrap_or(false) {
        return Err(format!(
            "timed out after {} documents",
            created + updated
        ));
    }
    if let Some(total) = response["total"].as_u64() {
        if created + updated + conflicts < total {
            return Err(format!(
                "partial copy: {} of {} documents written",
                created + updated,
                total
            ));
        }
    }
    Ok(created + updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bulk_lines_with_and_without_id() {
        let docs = vec![
            Document::new(Some("1".to_string()), json!({"title": "a"})),
            Document::new(None, json!({"title": "b"})),
        ];

        let lines = bulk_lines("e4f5g6h", None, &docs);

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], json!({"index": {"_index": "e4f5g6h", "_id": "1"}}));
        assert_eq!(lines[1], json!({"title": "a"}));
        assert_eq!(lines[2], json!({"index": {"_index": "e4f5g6h"}}));
        assert_eq!(lines[3], json!({"title": "b"}));
    }

    #[test]
    fn test_bulk_lines_with_legacy_type() {
        let docs = vec![Document::new(Some("7".to_string()), json!({}))];
        let lines = bulk_lines("idx", Some("_doc"), &docs);
        assert_eq!(
            lines[0],
            json!({"index": {"_index": "idx", "_type": "_doc", "_id": "7"}})
        );
    }

    #[test]
    fn test_bulk_failure_reports_first_error() {
        let response = json!({
            "errors": true,
            "items": [
                {"index": {"_id": "1", "status": 201}},
                {"index": {"_id": "2", "status": 400, "error": {"type": "mapper_parsing_exception", "reason": "failed to parse field [lanes]"}}}
            ]
        });

        let failure = bulk_failure(&response).unwrap();
        assert!(failure.starts_with("1 of 2 documents rejected"));
        assert!(failure.contains("id=2"));
        assert!(failure.contains("failed to parse field [lanes]"));
        assert_eq!(bulk_indexed(&response), 1);
    }

    #[test]
    fn test_bulk_without_errors() {
        let response = json!({
            "errors": false,
            "items": [{"index": {"_id": "1", "status": 201}}]
        });
        assert!(bulk_failure(&response).is_none());
        assert_eq!(bulk_indexed(&response), 1);
    }

    #[test]
    fn test_alias_response_parsing() {
        let response = json!({
            "b2": {"aliases": {"idx42": {}}},
            "a1": {"aliases": {"idx42": {}, "public": {}}}
        });

        assert_eq!(indices_in_alias_response(&response), vec!["a1", "b2"]);
        assert_eq!(
            aliases_in_alias_response(&response, "a1"),
            vec!["idx42", "public"]
        );
        assert!(aliases_in_alias_response(&response, "zz").is_empty());
    }

    #[test]
    fn test_reindex_outcome() {
        assert_eq!(
            reindex_outcome(&json!({"created": 10, "updated": 2, "failures": []})),
            Ok(12)
        );
        let failed = reindex_outcome(&json!({
            "created": 1,
            "failures": [{"cause": {"reason": "mapping conflict"}}]
        }));
        assert!(failed.unwrap_err().contains("mapping conflict"));
        assert_eq!(
            reindex_outcome(&json!({"total": 5, "created": 3, "updated": 0, "version_conflicts": 2})),
            Ok(3)
        );
    }

    #[test]
    fn test_reindex_timeout_is_a_failure() {
        let outcome = reindex_outcome(&json!({
            "timed_out": true,
            "total": 100,
            "created": 40,
            "updated": 0,
            "failures": []
        }));
        assert!(outcome.unwrap_err().contains("timed out"));
    }

    #[test]
    fn test_reindex_short_copy_is_a_failure() {
        let outcome = reindex_outcome(&json!({
            "timed_out": false,
            "total": 100,
            "created": 60,
            "updated": 30,
            "failures": []
        }));
        assert!(outcome.unwrap_err().contains("90 of 100"));
    }
}
