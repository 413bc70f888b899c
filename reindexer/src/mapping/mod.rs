//! Mapping generation.
//!
//! Derives the `mappings` section of an index from a context's column
//! properties.

use std::collections::BTreeMap;

use reindexer_shared::{ColumnProperty, Context, SourceMode};
use serde::Serialize;
use serde_json::{json, Value};

use crate::errors::ReindexError;

/// Field types that accept `analyzer` and `search_analyzer`.
const ANALYZED_TYPES: &[&str] = &["text", "search_as_you_type"];

/// Field written by the attachment ingest pipeline.
pub const ATTACHMENT_FIELD: &str = "attachment";

/// Generated `mappings` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingDocument {
    pub properties: BTreeMap<String, Value>,
}

impl MappingDocument {
    pub fn to_value(&self) -> Value {
        json!({ "properties": self.properties })
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }
}

/// Build the mapping for `context`.
///
/// Rejected properties are left out. Each remaining property is keyed by its
/// alias, or its name when it has none. Analyzers only apply to searchable
/// text fields; non-searchable fields are stored but not indexed. For sources
/// read through the attachment pipeline, the extracted `attachment` object is
/// mapped too unless a property already uses that key.
pub fn generate_mapping(
    context: &Context,
    mode: Option<SourceMode>,
) -> Result<MappingDocument, ReindexError> {
    let mut properties = BTreeMap::new();

    for property in context.properties.iter().filter(|p| !p.rejected) {
        property.validate()?;
        let key = property.field_name().to_string();
        if properties.contains_key(&key) {
            return Err(ReindexError::validation(format!(
                "duplicate field '{}' in context '{}'",
                key, context.name
            )));
        }
        properties.insert(key, field_mapping(property));
    }

    if mode.is_some_and(|m| m.requires_attachment_pipeline()) {
        properties
            .entry(ATTACHMENT_FIELD.to_string())
            .or_insert_with(attachment_mapping);
    }

    Ok(MappingDocument { properties })
}

fn field_mapping(property: &ColumnProperty) -> Value {
    let field_type = property
        .property_type
        .as_deref()
        .map(str::trim)
        .unwrap_or_default();

    let mut field = json!({ "type": field_type });

    if property.searchable {
        if ANALYZED_TYPES.contains(&field_type) {
            if let Some(analyzer) = non_blank(&property.analyzer) {
                field["analyzer"] = json!(analyzer);
            }
            if let Some(search_analyzer) = non_blank(&property.search_analyzer) {
                field["search_analyzer"] = json!(search_analyzer);
            }
        }
        if let Some(weight) = property.weight {
            field["boost"] = json!(weight);
        }
    } else {
        field["index"] = json!(false);
    }

    if field_type == "date" {
        if let Some(pattern) = non_blank(&property.pattern) {
            field["format"] = json!(pattern);
        }
    }

    field
}

fn attachment_mapping() -> Value {
    json!({
        "properties": {
            "author": { "type": "text" },
            "content": { "type": "text" },
            "content_length": { "type": "long" },
            "content_type": { "type": "keyword" },
            "date": { "type": "date" },
            "language": { "type": "keyword" },
            "title": { "type": "text" }
        }
    })
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn property(name: &str, ty: &str) -> ColumnProperty {
        ColumnProperty::new(name, ty)
    }

    fn context(properties: Vec<ColumnProperty>) -> Context {
        Context::new("roads", Uuid::new_v4(), properties)
    }

    #[test]
    fn test_rejected_properties_are_excluded() {
        let mut hidden = property("secret", "keyword");
        hidden.rejected = true;
        let ctx = context(vec![property("name", "text"), hidden]);

        let mapping = generate_mapping(&ctx, None).unwrap();

        assert!(mapping.field("name").is_some());
        assert!(mapping.field("secret").is_none());
        assert!(!mapping.to_value().to_string().contains("secret"));
    }

    #[test]
    fn test_output_is_deterministic() {
        let mut title = property("title", "text");
        title.analyzer = Some("french".to_string());
        title.weight = Some(2.0);
        let ctx = context(vec![property("z", "keyword"), title, property("a", "long")]);

        let first = serde_json::to_vec(&generate_mapping(&ctx, None).unwrap().to_value()).unwrap();
        let second = serde_json::to_vec(&generate_mapping(&ctx, None).unwrap().to_value()).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_field_options() {
        let mut title = property("title", "text");
        title.alias = Some("label".to_string());
        title.analyzer = Some("french".to_string());
        title.search_analyzer = Some("french_search".to_string());
        title.weight = Some(3.0);

        let mut created = property("created", "date");
        created.pattern = Some("yyyy-MM-dd".to_string());

        let mut code = property("code", "keyword");
        code.analyzer = Some("french".to_string());

        let mut notes = property("notes", "text");
        notes.searchable = false;
        notes.analyzer = Some("french".to_string());

        let ctx = context(vec![title, created, code, notes]);
        let mapping = generate_mapping(&ctx, None).unwrap();

        assert_eq!(
            mapping.field("label").unwrap(),
            &json!({
                "type": "text",
                "analyzer": "french",
                "search_analyzer": "french_search",
                "boost": 3.0
            })
        );
        assert_eq!(
            mapping.field("created").unwrap(),
            &json!({"type": "date", "format": "yyyy-MM-dd"})
        );
        assert_eq!(mapping.field("code").unwrap(), &json!({"type": "keyword"}));
        assert_eq!(
            mapping.field("notes").unwrap(),
            &json!({"type": "text", "index": false})
        );
    }

    #[test]
    fn test_blank_alias_falls_back_to_name() {
        let mut p = property("name", "text");
        p.alias = Some("".to_string());
        let mapping = generate_mapping(&context(vec![p]), None).unwrap();
        assert!(mapping.field("name").is_some());
    }

    #[test]
    fn test_invalid_properties_are_rejected() {
        let mut untyped = property("x", "text");
        untyped.property_type = None;
        assert!(matches!(
            generate_mapping(&context(vec![untyped]), None),
            Err(ReindexError::ValidationError(_))
        ));

        let mut clash = property("other", "text");
        clash.alias = Some("name".to_string());
        assert!(matches!(
            generate_mapping(&context(vec![property("name", "text"), clash]), None),
            Err(ReindexError::ValidationError(_))
        ));
    }

    #[test]
    fn test_rejected_duplicates_do_not_clash() {
        let mut clash = property("name", "text");
        clash.rejected = true;
        let ctx = context(vec![property("name", "keyword"), clash]);
        assert!(generate_mapping(&ctx, None).is_ok());
    }

    #[test]
    fn test_pdf_mapping_includes_attachment() {
        let ctx = context(vec![property("name", "text")]);

        let mapping = generate_mapping(&ctx, Some(SourceMode::Pdf)).unwrap();
        assert_eq!(
            mapping.field(ATTACHMENT_FIELD).unwrap()["properties"]["content"]["type"],
            "text"
        );

        let mapping = generate_mapping(&ctx, Some(SourceMode::Wfs)).unwrap();
        assert!(mapping.field(ATTACHMENT_FIELD).is_none());
    }
}
