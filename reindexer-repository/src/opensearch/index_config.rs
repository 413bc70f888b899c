//! Index creation bodies.
//!
//! A physical index is created from the generated field mappings and the
//! resolved analysis settings.

use serde_json::{json, Map, Value};

/// Optional sharding settings added next to `analysis`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSettings {
    pub number_of_shards: Option<u32>,
    pub number_of_replicas: Option<u32>,
}

/// Build the index-create body `{mappings, settings: {analysis}}`.
///
/// Shard and replica counts are only written when set, so with default
/// settings the body carries exactly the mappings and the analysis block.
pub fn index_body(mappings: &Value, analysis: &Value, settings: &IndexSettings) -> Value {
    let mut settings_map = Map::new();
    settings_map.insert("analysis".to_string(), analysis.clone());
    if let Some(shards) = settings.number_of_shards {
        settings_map.insert("number_of_shards".to_string(), json!(shards));
    }
    if let Some(replicas) = settings.number_of_replicas {
        settings_map.insert("number_of_replicas".to_string(), json!(replicas));
    }

    json!({
        "mappings": mappings,
        "settings": Value::Object(settings_map)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_body_structure() {
        let mappings = json!({"properties": {"title": {"type": "text"}}});
        let analysis = json!({"analyzer": {}, "filter": {}, "tokenizer": {}});

        let body = index_body(&mappings, &analysis, &IndexSettings::default());

        assert_eq!(body["mappings"], mappings);
        assert_eq!(body["settings"]["analysis"], analysis);
        assert!(body["settings"].get("number_of_shards").is_none());
        assert_eq!(body["settings"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_index_body_with_sharding() {
        let settings = IndexSettings {
            number_of_shards: Some(1),
            number_of_replicas: Some(0),
        };
        let body = index_body(&json!({}), &json!({}), &settings);

        assert_eq!(body["settings"]["number_of_shards"], 1);
        assert_eq!(body["settings"]["number_of_replicas"], 0);
    }
}
