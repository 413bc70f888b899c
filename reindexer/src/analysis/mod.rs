//! Analyzer resolution.
//!
//! Turns the analyzer names a context references into the `settings.analysis`
//! section of an index: every analyzer, plus the filters and tokenizers those
//! analyzers link to.

use std::collections::{BTreeMap, BTreeSet};

use reindexer_shared::types::analysis::has_config;
use reindexer_shared::{Analyzer, Context, Filter, Tokenizer};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::ReindexError;

/// Read access to the analysis objects known to the system.
pub trait AnalysisCatalog {
    fn analyzer(&self, name: &str) -> Option<&Analyzer>;
    fn filter(&self, name: &str) -> Option<&Filter>;
    fn tokenizer(&self, name: &str) -> Option<&Tokenizer>;
}

/// Resolved analysis settings.
///
/// Maps are ordered so the rendered settings are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisSettings {
    pub analyzer: BTreeMap<String, Value>,
    pub filter: BTreeMap<String, Value>,
    pub tokenizer: BTreeMap<String, Value>,
}

impl AnalysisSettings {
    pub fn is_empty(&self) -> bool {
        self.analyzer.is_empty() && self.filter.is_empty() && self.tokenizer.is_empty()
    }

    pub fn to_value(&self) -> Value {
        json!({
            "analyzer": self.analyzer,
            "filter": self.filter,
            "tokenizer": self.tokenizer,
        })
    }
}

/// Analyzer names referenced by a context's properties.
pub fn analyzer_names(context: &Context) -> BTreeSet<String> {
    context
        .properties
        .iter()
        .flat_map(|p| [p.analyzer.as_deref(), p.search_analyzer.as_deref()])
        .flatten()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve `names` into analysis settings.
///
/// - An analyzer with its own configuration is emitted as-is.
/// - A reserved analyzer that is not fully linked is built in to the engine
///   and therefore omitted.
/// - Any other analyzer becomes a `custom` analyzer over its tokenizer and
///   filters; a linked filter or tokenizer is emitted only when it carries
///   configuration of its own. Such an analyzer must name a tokenizer, or it
///   is a `ValidationError`.
///
/// A name that does not resolve is a `NotFoundError`.
pub fn resolve_analysis<C>(
    names: &BTreeSet<String>,
    catalog: &C,
) -> Result<AnalysisSettings, ReindexError>
where
    C: AnalysisCatalog + ?Sized,
{
    let mut settings = AnalysisSettings::default();

    for name in names {
        let analyzer = catalog
            .analyzer(name)
            .ok_or_else(|| ReindexError::not_found(format!("analyzer {}", name)))?;

        if has_config(&analyzer.config) {
            if let Some(config) = analyzer.config.clone() {
                settings.analyzer.insert(analyzer.name.clone(), config);
            }
            continue;
        }

        if analyzer.reserved && !analyzer.is_fully_linked() {
            debug!(analyzer = %analyzer.name, "Skipping built-in analyzer");
            continue;
        }

        let tokenizer_name = analyzer.tokenizer.as_deref().ok_or_else(|| {
            ReindexError::validation(format!(
                "analyzer '{}' has neither a tokenizer nor a configuration",
                analyzer.name
            ))
        })?;
        let tokenizer = catalog
            .tokenizer(tokenizer_name)
            .ok_or_else(|| ReindexError::not_found(format!("tokenizer {}", tokenizer_name)))?;
        if let (true, Some(config)) = (has_config(&tokenizer.config), tokenizer.config.clone()) {
            settings.tokenizer.insert(tokenizer.name.clone(), config);
        }
        let mut definition = json!({ "type": "custom", "tokenizer": tokenizer.name });

        let mut filters = Vec::with_capacity(analyzer.filters.len());
        for filter_name in &analyzer.filters {
            let filter = catalog
                .filter(filter_name)
                .ok_or_else(|| ReindexError::not_found(format!("filter {}", filter_name)))?;
            filters.push(filter.name.clone());
            if let (true, Some(config)) = (has_config(&filter.config), filter.config.clone()) {
                settings.filter.insert(filter.name.clone(), config);
            }
        }
        definition["filter"] = json!(filters);

        settings.analyzer.insert(analyzer.name.clone(), definition);
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reindexer_shared::ColumnProperty;
    use std::collections::HashMap;
    use uuid::Uuid;

    #[derive(Default)]
    struct Fixture {
        analyzers: HashMap<String, Analyzer>,
        filters: HashMap<String, Filter>,
        tokenizers: HashMap<String, Tokenizer>,
    }

    impl Fixture {
        fn analyzer(mut self, analyzer: Analyzer) -> Self {
            self.analyzers.insert(analyzer.name.clone(), analyzer);
            self
        }

        fn filter(mut self, filter: Filter) -> Self {
            self.filters.insert(filter.name.clone(), filter);
            self
        }

        fn tokenizer(mut self, tokenizer: Tokenizer) -> Self {
            self.tokenizers.insert(tokenizer.name.clone(), tokenizer);
            self
        }
    }

    impl AnalysisCatalog for Fixture {
        fn analyzer(&self, name: &str) -> Option<&Analyzer> {
            self.analyzers.get(name)
        }

        fn filter(&self, name: &str) -> Option<&Filter> {
            self.filters.get(name)
        }

        fn tokenizer(&self, name: &str) -> Option<&Tokenizer> {
            self.tokenizers.get(name)
        }
    }

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_custom_analyzer_without_configured_links() {
        let catalog = Fixture::default()
            .analyzer(
                Analyzer::new("custom1")
                    .with_tokenizer("standard")
                    .with_filters(["lower", "stop"]),
            )
            .filter(Filter::new("lower"))
            .filter(Filter::new("stop"))
            .tokenizer(Tokenizer::new("standard"));

        let settings = resolve_analysis(&names(&["custom1"]), &catalog).unwrap();

        assert_eq!(
            settings.to_value(),
            json!({
                "analyzer": {
                    "custom1": {
                        "type": "custom",
                        "tokenizer": "standard",
                        "filter": ["lower", "stop"]
                    }
                },
                "filter": {},
                "tokenizer": {}
            })
        );
    }

    #[test]
    fn test_configured_links_are_emitted() {
        let catalog = Fixture::default()
            .analyzer(
                Analyzer::new("french")
                    .with_tokenizer("edge")
                    .with_filters(["elision", "lowercase"]),
            )
            .filter(Filter::new("elision").with_config(json!({"type": "elision", "articles": ["l"]})))
            .filter(Filter::new("lowercase").with_config(json!({})))
            .tokenizer(Tokenizer::new("edge").with_config(json!({"type": "edge_ngram"})));

        let settings = resolve_analysis(&names(&["french"]), &catalog).unwrap();

        assert_eq!(settings.filter.len(), 1);
        assert_eq!(settings.filter["elision"]["type"], "elision");
        assert_eq!(settings.tokenizer["edge"], json!({"type": "edge_ngram"}));
        assert_eq!(
            settings.analyzer["french"]["filter"],
            json!(["elision", "lowercase"])
        );
    }

    #[test]
    fn test_explicit_config_is_emitted_verbatim() {
        let config = json!({"type": "pattern", "pattern": "\\W+"});
        let catalog = Fixture::default().analyzer(
            Analyzer::new("pat")
                .with_tokenizer("ignored")
                .with_config(config.clone()),
        );

        let settings = resolve_analysis(&names(&["pat"]), &catalog).unwrap();

        assert_eq!(settings.analyzer["pat"], config);
        assert!(settings.tokenizer.is_empty());
    }

    #[test]
    fn test_reserved_builtin_is_omitted() {
        let catalog = Fixture::default().analyzer(Analyzer::new("standard").reserved());

        let settings = resolve_analysis(&names(&["standard"]), &catalog).unwrap();

        assert!(settings.is_empty());
    }

    #[test]
    fn test_unknown_names_are_not_found() {
        let catalog = Fixture::default()
            .analyzer(
                Analyzer::new("a")
                    .with_tokenizer("standard")
                    .with_filters(["missing"]),
            )
            .tokenizer(Tokenizer::new("standard"));

        assert!(matches!(
            resolve_analysis(&names(&["nope"]), &catalog),
            Err(ReindexError::NotFoundError(_))
        ));
        assert!(matches!(
            resolve_analysis(&names(&["a"]), &catalog),
            Err(ReindexError::NotFoundError(_))
        ));
    }

    #[test]
    fn test_analyzer_without_tokenizer_is_rejected() {
        let catalog = Fixture::default()
            .analyzer(Analyzer::new("bare").with_filters(["lower"]))
            .filter(Filter::new("lower"));

        match resolve_analysis(&names(&["bare"]), &catalog) {
            Err(ReindexError::ValidationError(msg)) => assert!(msg.contains("'bare'"), "{}", msg),
            other => panic!("expected a validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_analyzer_names_collects_both_roles() {
        let mut title = ColumnProperty::new("title", "text");
        title.analyzer = Some("french".to_string());
        title.search_analyzer = Some("french_search".to_string());
        let mut body = ColumnProperty::new("body", "text");
        body.analyzer = Some("french".to_string());
        body.search_analyzer = Some("  ".to_string());
        let context = Context::new("c", Uuid::new_v4(), vec![title, body]);

        assert_eq!(
            analyzer_names(&context),
            names(&["french", "french_search"])
        );
    }
}
