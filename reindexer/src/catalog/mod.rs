//! Configuration catalog.
//!
//! Holds the objects the engine reads its configuration from: sources and their
//! resources, contexts, search models and the analysis objects. Every mutation
//! goes through here so the naming and ownership invariants hold whatever the
//! caller: context and search model names share one namespace, analysis object
//! names are unique, and reserved analysis objects are read-only for API
//! consumers.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use reindexer_shared::{Analyzer, Context, Filter, Resource, SearchModel, Source, Tokenizer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::analysis::AnalysisCatalog;
use crate::errors::ReindexError;

/// Who is asking for a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOrigin {
    /// An API consumer; reserved objects are protected.
    Api,
    /// The system itself, e.g. while seeding built-ins.
    Internal,
}

/// Serialized form of a catalog, as loaded from disk.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogData {
    pub tokenizers: Vec<Tokenizer>,
    pub filters: Vec<Filter>,
    pub analyzers: Vec<Analyzer>,
    pub sources: Vec<Source>,
    pub resources: Vec<Resource>,
    pub contexts: Vec<Context>,
    pub search_models: Vec<SearchModel>,
}

/// Objects removed by a cascading source deletion.
#[derive(Debug, Clone)]
pub struct RemovedSource {
    pub source: Source,
    pub resources: Vec<Resource>,
    pub contexts: Vec<Context>,
}

/// Plain catalog contents.
#[derive(Debug, Clone, Default)]
pub struct CatalogState {
    sources: BTreeMap<Uuid, Source>,
    resources: BTreeMap<Uuid, Resource>,
    contexts: BTreeMap<Uuid, Context>,
    search_models: BTreeMap<Uuid, SearchModel>,
    analyzers: BTreeMap<String, Analyzer>,
    filters: BTreeMap<String, Filter>,
    tokenizers: BTreeMap<String, Tokenizer>,
}

impl CatalogState {
    pub fn source(&self, id: Uuid) -> Option<&Source> {
        self.sources.get(&id)
    }

    pub fn resource(&self, id: Uuid) -> Option<&Resource> {
        self.resources.get(&id)
    }

    pub fn context(&self, id: Uuid) -> Option<&Context> {
        self.contexts.get(&id)
    }

    pub fn contexts(&self) -> impl Iterator<Item = &Context> {
        self.contexts.values()
    }

    pub fn search_model_by_name(&self, name: &str) -> Option<&SearchModel> {
        self.search_models.values().find(|m| m.name == name)
    }

    pub fn resources_of(&self, source_id: Uuid) -> impl Iterator<Item = &Resource> {
        self.resources
            .values()
            .filter(move |r| r.source_id == source_id)
    }

    /// Ids of the contexts built over any resource of a source.
    pub fn contexts_of_source(&self, source_id: Uuid) -> Vec<Uuid> {
        self.contexts
            .values()
            .filter(|c| {
                self.resource(c.resource_id)
                    .is_some_and(|r| r.source_id == source_id)
            })
            .map(|c| c.id)
            .collect()
    }

    /// Ids of the contexts that replacing the resources of a source with
    /// `discovered` would drop, matching resources by name.
    pub fn contexts_dropped_by(&self, source_id: Uuid, discovered: &[Resource]) -> Vec<Uuid> {
        let gone: Vec<Uuid> = self
            .resources_of(source_id)
            .filter(|r| !discovered.iter().any(|d| d.name == r.name))
            .map(|r| r.id)
            .collect();
        self.contexts
            .values()
            .filter(|c| gone.contains(&c.resource_id))
            .map(|c| c.id)
            .collect()
    }

    fn unlink_context(&mut self, context_id: Uuid) {
        for model in self.search_models.values_mut() {
            model.contexts.retain(|c| *c != context_id);
        }
    }
}

impl AnalysisCatalog for CatalogState {
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

/// Shared, lock-protected catalog.
#[derive(Debug, Default)]
pub struct Catalog {
    state: RwLock<CatalogState>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog by replaying `data` through the checked mutations.
    pub fn from_data(data: CatalogData) -> Result<Self, ReindexError> {
        let catalog = Self::new();
        for tokenizer in data.tokenizers {
            catalog.create_tokenizer(tokenizer)?;
        }
        for filter in data.filters {
            catalog.create_filter(filter)?;
        }
        for analyzer in data.analyzers {
            catalog.create_analyzer(analyzer)?;
        }
        for source in data.sources {
            catalog.add_source(source)?;
        }
        for resource in data.resources {
            catalog.add_resource(resource)?;
        }
        for context in data.contexts {
            catalog.save_context(context)?;
        }
        for model in data.search_models {
            catalog.save_search_model(model)?;
        }
        Ok(catalog)
    }

    /// Load a JSON catalog file.
    pub async fn load(path: &Path) -> Result<Self, ReindexError> {
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            ReindexError::validation(format!("cannot read catalog {}: {}", path.display(), e))
        })?;
        let data: CatalogData = serde_json::from_str(&raw).map_err(|e| {
            ReindexError::validation(format!("invalid catalog {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_data(data)?;
        info!(path = %path.display(), "Catalog loaded");
        Ok(catalog)
    }

    /// Run `f` against a consistent view of the catalog.
    pub fn read<R>(&self, f: impl FnOnce(&CatalogState) -> R) -> R {
        f(&self.read_guard())
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn context(&self, id: Uuid) -> Result<Context, ReindexError> {
        self.read(|s| s.context(id).cloned())
            .ok_or_else(|| ReindexError::not_found(format!("context {}", id)))
    }

    pub fn contexts(&self) -> Vec<Context> {
        self.read(|s| s.contexts().cloned().collect())
    }

    pub fn resource(&self, id: Uuid) -> Result<Resource, ReindexError> {
        self.read(|s| s.resource(id).cloned())
            .ok_or_else(|| ReindexError::not_found(format!("resource {}", id)))
    }

    pub fn source(&self, id: Uuid) -> Result<Source, ReindexError> {
        self.read(|s| s.source(id).cloned())
            .ok_or_else(|| ReindexError::not_found(format!("source {}", id)))
    }

    pub fn search_model(&self, name: &str) -> Result<SearchModel, ReindexError> {
        self.read(|s| s.search_model_by_name(name).cloned())
            .ok_or_else(|| ReindexError::not_found(format!("search model {}", name)))
    }

    // ------------------------------------------------------------------
    // Sources and resources
    // ------------------------------------------------------------------

    /// Register a source after checking its URI against its mode.
    pub fn add_source(&self, source: Source) -> Result<(), ReindexError> {
        source.verify_uri()?;
        let mut state = self.write_guard();
        if state.sources.contains_key(&source.id) {
            return Err(ReindexError::conflict(format!(
                "source {} already exists",
                source.id
            )));
        }
        debug!(source_id = %source.id, mode = %source.mode, "Source registered");
        state.sources.insert(source.id, source);
        Ok(())
    }

    fn add_resource(&self, resource: Resource) -> Result<(), ReindexError> {
        let mut state = self.write_guard();
        if !state.sources.contains_key(&resource.source_id) {
            return Err(ReindexError::not_found(format!(
                "source {}",
                resource.source_id
            )));
        }
        state.resources.insert(resource.id, resource);
        Ok(())
    }

    /// Replace the resources of a source with a fresh discovery result.
    ///
    /// A discovered resource whose name matches an existing one keeps the
    /// existing id, so contexts bound to it survive; its schema is replaced.
    /// Resources that disappeared are dropped along with their contexts.
    pub fn replace_resources(
        &self,
        source_id: Uuid,
        discovered: Vec<Resource>,
    ) -> Result<Vec<Context>, ReindexError> {
        let mut state = self.write_guard();
        if !state.sources.contains_key(&source_id) {
            return Err(ReindexError::not_found(format!("source {}", source_id)));
        }

        let existing: BTreeMap<String, Uuid> = state
            .resources_of(source_id)
            .map(|r| (r.name.clone(), r.id))
            .collect();

        let mut kept = Vec::with_capacity(discovered.len());
        for mut resource in discovered {
            resource.source_id = source_id;
            if let Some(id) = existing.get(&resource.name) {
                resource.id = *id;
            }
            kept.push(resource);
        }

        let kept_ids: Vec<Uuid> = kept.iter().map(|r| r.id).collect();
        let gone: Vec<Uuid> = existing
            .values()
            .filter(|id| !kept_ids.contains(id))
            .copied()
            .collect();

        for id in &gone {
            state.resources.remove(id);
        }
        let orphaned: Vec<Context> = state
            .contexts
            .values()
            .filter(|c| gone.contains(&c.resource_id))
            .cloned()
            .collect();
        for context in &orphaned {
            state.contexts.remove(&context.id);
            state.unlink_context(context.id);
        }
        for resource in kept {
            state.resources.insert(resource.id, resource);
        }
        Ok(orphaned)
    }

    /// Delete a source with its resources and their contexts.
    pub fn remove_source(&self, source_id: Uuid) -> Result<RemovedSource, ReindexError> {
        let mut state = self.write_guard();
        let source = state
            .sources
            .remove(&source_id)
            .ok_or_else(|| ReindexError::not_found(format!("source {}", source_id)))?;

        let resource_ids: Vec<Uuid> = state.resources_of(source_id).map(|r| r.id).collect();
        let resources: Vec<Resource> = resource_ids
            .iter()
            .filter_map(|id| state.resources.remove(id))
            .collect();
        let context_ids: Vec<Uuid> = state
            .contexts
            .values()
            .filter(|c| resource_ids.contains(&c.resource_id))
            .map(|c| c.id)
            .collect();
        let contexts: Vec<Context> = context_ids
            .iter()
            .filter_map(|id| state.contexts.remove(id))
            .collect();
        for id in &context_ids {
            state.unlink_context(*id);
        }

        Ok(RemovedSource {
            source,
            resources,
            contexts,
        })
    }

    // ------------------------------------------------------------------
    // Contexts and search models
    // ------------------------------------------------------------------

    /// Create or update a context.
    ///
    /// Fails with a conflict when a search model, or another context, already
    /// carries the same name.
    pub fn save_context(&self, context: Context) -> Result<(), ReindexError> {
        if context.name.trim().is_empty() {
            return Err(ReindexError::validation("context name is required"));
        }
        let mut state = self.write_guard();
        if !state.resources.contains_key(&context.resource_id) {
            return Err(ReindexError::not_found(format!(
                "resource {}",
                context.resource_id
            )));
        }
        if state.search_models.values().any(|m| m.name == context.name) {
            return Err(ReindexError::conflict(format!(
                "a search model named '{}' exists",
                context.name
            )));
        }
        if state
            .contexts
            .values()
            .any(|c| c.name == context.name && c.id != context.id)
        {
            return Err(ReindexError::conflict(format!(
                "a context named '{}' exists",
                context.name
            )));
        }
        state.contexts.insert(context.id, context);
        Ok(())
    }

    /// Delete a context and unlink it from the search models using it.
    pub fn remove_context(&self, id: Uuid) -> Result<Context, ReindexError> {
        let mut state = self.write_guard();
        let context = state
            .contexts
            .remove(&id)
            .ok_or_else(|| ReindexError::not_found(format!("context {}", id)))?;
        state.unlink_context(id);
        Ok(context)
    }

    /// Create or update a search model.
    ///
    /// Fails with a conflict when a context, or another search model, already
    /// carries the same name.
    pub fn save_search_model(&self, model: SearchModel) -> Result<(), ReindexError> {
        if model.name.trim().is_empty() {
            return Err(ReindexError::validation("search model name is required"));
        }
        let mut state = self.write_guard();
        if state.contexts.values().any(|c| c.name == model.name) {
            return Err(ReindexError::conflict(format!(
                "a context named '{}' exists",
                model.name
            )));
        }
        if state
            .search_models
            .values()
            .any(|m| m.name == model.name && m.id != model.id)
        {
            return Err(ReindexError::conflict(format!(
                "a search model named '{}' exists",
                model.name
            )));
        }
        if let Some(missing) = model
            .contexts
            .iter()
            .find(|id| !state.contexts.contains_key(id))
        {
            return Err(ReindexError::not_found(format!("context {}", missing)));
        }
        state.search_models.insert(model.id, model);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Analysis objects
    // ------------------------------------------------------------------

    pub fn create_tokenizer(&self, tokenizer: Tokenizer) -> Result<(), ReindexError> {
        let mut state = self.write_guard();
        if state.tokenizers.contains_key(&tokenizer.name) {
            return Err(ReindexError::conflict(format!(
                "tokenizer '{}' already exists",
                tokenizer.name
            )));
        }
        state.tokenizers.insert(tokenizer.name.clone(), tokenizer);
        Ok(())
    }

    pub fn create_filter(&self, filter: Filter) -> Result<(), ReindexError> {
        let mut state = self.write_guard();
        if state.filters.contains_key(&filter.name) {
            return Err(ReindexError::conflict(format!(
                "filter '{}' already exists",
                filter.name
            )));
        }
        state.filters.insert(filter.name.clone(), filter);
        Ok(())
    }

    pub fn create_analyzer(&self, analyzer: Analyzer) -> Result<(), ReindexError> {
        let mut state = self.write_guard();
        if state.analyzers.contains_key(&analyzer.name) {
            return Err(ReindexError::conflict(format!(
                "analyzer '{}' already exists",
                analyzer.name
            )));
        }
        check_analyzer_links(&state, &analyzer)?;
        state.analyzers.insert(analyzer.name.clone(), analyzer);
        Ok(())
    }

    /// Replace an analyzer definition.
    ///
    /// API consumers cannot alter a reserved analyzer unless it is fully linked
    /// (has both filters and a tokenizer).
    pub fn update_analyzer(&self, analyzer: Analyzer, origin: EditOrigin) -> Result<(), ReindexError> {
        let mut state = self.write_guard();
        let existing = state
            .analyzers
            .get(&analyzer.name)
            .ok_or_else(|| ReindexError::not_found(format!("analyzer {}", analyzer.name)))?;
        if origin == EditOrigin::Api && !existing.is_editable() {
            return Err(ReindexError::validation(format!(
                "analyzer '{}' is reserved",
                analyzer.name
            )));
        }
        // Consumers cannot grant or drop the reserved flag
        let reserved = existing.reserved;
        check_analyzer_links(&state, &analyzer)?;
        let mut analyzer = analyzer;
        if origin == EditOrigin::Api {
            analyzer.reserved = reserved;
        }
        state.analyzers.insert(analyzer.name.clone(), analyzer);
        Ok(())
    }

    pub fn delete_analyzer(&self, name: &str, origin: EditOrigin) -> Result<Analyzer, ReindexError> {
        let mut state = self.write_guard();
        let existing = state
            .analyzers
            .get(name)
            .ok_or_else(|| ReindexError::not_found(format!("analyzer {}", name)))?;
        if origin == EditOrigin::Api && existing.reserved {
            return Err(ReindexError::validation(format!(
                "analyzer '{}' is reserved",
                name
            )));
        }
        let in_use = state.contexts.values().any(|c| {
            c.properties.iter().any(|p| {
                p.analyzer.as_deref() == Some(name) || p.search_analyzer.as_deref() == Some(name)
            })
        });
        if in_use {
            return Err(ReindexError::conflict(format!(
                "analyzer '{}' is used by a context",
                name
            )));
        }
        state
            .analyzers
            .remove(name)
            .ok_or_else(|| ReindexError::not_found(format!("analyzer {}", name)))
    }

    pub fn delete_filter(&self, name: &str, origin: EditOrigin) -> Result<Filter, ReindexError> {
        let mut state = self.write_guard();
        let existing = state
            .filters
            .get(name)
            .ok_or_else(|| ReindexError::not_found(format!("filter {}", name)))?;
        if origin == EditOrigin::Api && existing.reserved {
            return Err(ReindexError::validation(format!("filter '{}' is reserved", name)));
        }
        if state
            .analyzers
            .values()
            .any(|a| a.filters.iter().any(|f| f == name))
        {
            return Err(ReindexError::conflict(format!(
                "filter '{}' is used by an analyzer",
                name
            )));
        }
        state
            .filters
            .remove(name)
            .ok_or_else(|| ReindexError::not_found(format!("filter {}", name)))
    }

    pub fn delete_tokenizer(&self, name: &str, origin: EditOrigin) -> Result<Tokenizer, ReindexError> {
        let mut state = self.write_guard();
        let existing = state
            .tokenizers
            .get(name)
            .ok_or_else(|| ReindexError::not_found(format!("tokenizer {}", name)))?;
        if origin == EditOrigin::Api && existing.reserved {
            return Err(ReindexError::validation(format!(
                "tokenizer '{}' is reserved",
                name
            )));
        }
        if state
            .analyzers
            .values()
            .any(|a| a.tokenizer.as_deref() == Some(name))
        {
            return Err(ReindexError::conflict(format!(
                "tokenizer '{}' is used by an analyzer",
                name
            )));
        }
        state
            .tokenizers
            .remove(name)
            .ok_or_else(|| ReindexError::not_found(format!("tokenizer {}", name)))
    }
}

fn check_analyzer_links(state: &CatalogState, analyzer: &Analyzer) -> Result<(), ReindexError> {
    if let Some(ref tokenizer) = analyzer.tokenizer {
        if !state.tokenizers.contains_key(tokenizer) {
            return Err(ReindexError::not_found(format!("tokenizer {}", tokenizer)));
        }
    }
    if let Some(missing) = analyzer
        .filters
        .iter()
        .find(|f| !state.filters.contains_key(*f))
    {
        return Err(ReindexError::not_found(format!("filter {}", missing)));
    }
    Ok(())
}
