//! Resource discovery over a directory of NDJSON files.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reindexer_shared::{Column, Resource, Source};
use serde_json::Value;
use tracing::{debug, warn};

use super::ndjson::parse_line;
use super::{NdjsonHarvester, SourceCatalog};
use crate::errors::ReindexError;

/// Treats every `*.ndjson` file of a source directory as one resource and
/// infers its column schema from the records.
#[derive(Debug, Clone)]
pub struct DirectorySourceCatalog {
    harvester: NdjsonHarvester,
}

impl DirectorySourceCatalog {
    pub fn new(harvester: NdjsonHarvester) -> Self {
        Self { harvester }
    }
}

#[derive(Default)]
struct ColumnStats {
    column_type: Option<&'static str>,
    count: u64,
    max: u32,
}

fn value_type(value: &Value) -> Option<&'static str> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some("boolean"),
        Value::Number(n) if n.is_i64() || n.is_u64() => Some("integer"),
        Value::Number(_) => Some("double"),
        Value::String(_) => Some("string"),
        Value::Array(items) => items.iter().find_map(value_type),
        Value::Object(map) if map.contains_key("type") && map.contains_key("coordinates") => {
            Some("geometry")
        }
        Value::Object(_) => Some("object"),
    }
}

/// Infer a column schema from parsed records.
fn infer_columns<'a>(records: impl Iterator<Item = &'a Value>) -> Vec<Column> {
    let mut stats: BTreeMap<String, ColumnStats> = BTreeMap::new();
    let mut total = 0u64;

    for record in records {
        total += 1;
        let Some(map) = record.as_object() else {
            continue;
        };
        for (key, value) in map {
            if value.is_null() {
                continue;
            }
            let entry = stats.entry(key.clone()).or_default();
            entry.count += 1;
            if entry.column_type.is_none() {
                entry.column_type = value_type(value);
            }
            let occurrences = match value {
                Value::Array(items) => items.len() as u32,
                _ => 1,
            };
            entry.max = entry.max.max(occurrences);
        }
    }

    stats
        .into_iter()
        .map(|(name, s)| {
            let mut column = Column::new(name, s.column_type.unwrap_or("string"));
            column.count = s.count;
            column.occurs = [u32::from(s.count == total), s.max.max(1)];
            column
        })
        .collect()
}

#[async_trait]
impl SourceCatalog for DirectorySourceCatalog {
    async fn discover(&self, source: &Source) -> Result<Vec<Resource>, ReindexError> {
        let dir = self.harvester.directory_for(source);
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| ReindexError::harvest(format!("cannot list {}: {}", dir.display(), e)))?;

        let mut resources = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ReindexError::harvest(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("ndjson") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| ReindexError::harvest(format!("cannot read {}: {}", path.display(), e)))?;
            let mut records = Vec::new();
            for (n, line) in raw.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match parse_line(line) {
                    Ok(document) => records.push(document.body),
                    Err(e) => warn!(path = %path.display(), line = n + 1, error = %e, "Skipping malformed record"),
                }
            }

            let columns = infer_columns(records.iter());
            debug!(resource = %name, columns = columns.len(), records = records.len(), "Resource discovered");
            resources.push(Resource::new(name, source.id, columns));
        }

        resources.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reindexer_shared::SourceMode;
    use serde_json::json;

    #[test]
    fn test_infer_columns() {
        let records = [
            json!({"id": 1, "name": "A1", "tags": ["x", "y"], "geom": {"type": "Point", "coordinates": [1, 2]}}),
            json!({"id": 2, "name": null, "ratio": 0.5}),
        ];

        let columns = infer_columns(records.iter());
        let by_name: BTreeMap<_, _> = columns.iter().map(|c| (c.name.as_str(), c)).collect();

        assert_eq!(by_name["id"].column_type, "integer");
        assert_eq!(by_name["id"].occurs, [1, 1]);
        assert_eq!(by_name["name"].count, 1);
        assert_eq!(by_name["name"].occurs, [0, 1]);
        assert_eq!(by_name["tags"].occurs, [0, 2]);
        assert_eq!(by_name["geom"].column_type, "geometry");
        assert_eq!(by_name["ratio"].column_type, "double");
    }

    #[tokio::test]
    async fn test_discover_lists_ndjson_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.ndjson"), "{\"title\": \"x\"}\n").unwrap();
        std::fs::write(dir.path().join("a.ndjson"), "{\"n\": 1}\nnot json\n").unwrap();
        std::fs::write(dir.path().join("readme.txt"), "ignored").unwrap();

        let source = Source::new(
            "pdfs",
            dir.path().to_string_lossy(),
            SourceMode::Pdf,
            "alice",
        );
        let catalog = DirectorySourceCatalog::new(NdjsonHarvester::new("/unused"));
        let resources = catalog.discover(&source).await.unwrap();

        let names: Vec<_> = resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(resources[0].columns[0].name, "n");
        assert!(resources.iter().all(|r| r.source_id == source.id));
    }
}
