//! Search result plugins.
//!
//! A plugin turns search parameters into an engine query and the raw engine
//! response into the response handed back to callers. Plugins are looked up by
//! the search model's plugin name, then by the model name, and fall back to
//! [`DefaultPlugin`].

pub mod template;

pub use template::{render, ParamValue, Params};

use std::collections::HashMap;
use std::sync::Arc;

use reindexer_shared::SearchModel;
use serde_json::{json, Value};

use crate::errors::ReindexError;

/// Default number of hits per page.
pub const DEFAULT_PAGE_SIZE: i64 = 10;

pub trait SearchResultPlugin: Send + Sync {
    /// Build the engine query.
    fn input(&self, model: &SearchModel, params: &Params) -> Result<Value, ReindexError>;

    /// Shape the engine response.
    fn output(&self, model: &SearchModel, raw: Value) -> Result<Value, ReindexError>;
}

/// Template-driven query, flat result list.
///
/// Without a template, `q` is a query-string query (everything when absent),
/// `page` is 1-based and `size` defaults to [`DEFAULT_PAGE_SIZE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPlugin;

impl DefaultPlugin {
    fn int_param(params: &Params, name: &str, default: i64) -> Result<i64, ReindexError> {
        match params.get(name) {
            None => Ok(default),
            Some(ParamValue::Int(i)) => Ok(*i),
            Some(other) => Err(ReindexError::template(format!(
                "parameter '{}' must be an integer, got {}",
                name, other
            ))),
        }
    }
}

impl SearchResultPlugin for DefaultPlugin {
    fn input(&self, model: &SearchModel, params: &Params) -> Result<Value, ReindexError> {
        if let Some(ref template) = model.query_template {
            return render(template, params);
        }

        let query = match params.get("q") {
            Some(ParamValue::Text(q)) if !q.trim().is_empty() => {
                json!({ "query_string": { "query": q } })
            }
            Some(ParamValue::Text(_)) | None => json!({ "match_all": {} }),
            Some(other) => json!({ "query_string": { "query": other.to_string() } }),
        };
        let size = Self::int_param(params, "size", DEFAULT_PAGE_SIZE)?.max(0);
        let page = Self::int_param(params, "page", 1)?.max(1);

        Ok(json!({
            "query": query,
            "from": (page - 1) * size,
            "size": size,
        }))
    }

    fn output(&self, _model: &SearchModel, raw: Value) -> Result<Value, ReindexError> {
        let hits = raw["hits"]["hits"]
            .as_array()
            .ok_or_else(|| ReindexError::template("search response has no hits"))?;
        let total = raw["hits"]["total"]["value"]
            .as_u64()
            .or_else(|| raw["hits"]["total"].as_u64())
            .unwrap_or(hits.len() as u64);

        let results: Vec<Value> = hits
            .iter()
            .map(|hit| {
                json!({
                    "id": hit["_id"],
                    "score": hit["_score"],
                    "source": hit["_source"],
                })
            })
            .collect();

        Ok(json!({ "total": total, "results": results }))
    }
}

/// Plugins by name.
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn SearchResultPlugin>>,
    default: Arc<dyn SearchResultPlugin>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self {
            plugins: HashMap::new(),
            default: Arc::new(DefaultPlugin),
        }
    }
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, plugin: Arc<dyn SearchResultPlugin>) {
        self.plugins.insert(name.into(), plugin);
    }

    /// Plugin for `model`.
    pub fn resolve(&self, model: &SearchModel) -> Arc<dyn SearchResultPlugin> {
        model
            .plugin
            .as_deref()
            .and_then(|name| self.plugins.get(name))
            .or_else(|| self.plugins.get(&model.name))
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}
