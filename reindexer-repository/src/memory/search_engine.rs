//! In-memory search engine.
//!
//! Mirrors the engine behaviour the reindexer relies on: indices with documents,
//! aliases updated in atomic batches, ingest pipelines and server-side copies.
//! A [`FailurePlan`] makes individual operations fail on demand.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;
use reindexer_shared::Document;
use serde_json::{json, Value};

use crate::errors::SearchIndexError;
use crate::interfaces::SearchEngineProvider;
use crate::opensearch::wire;
use crate::types::{AliasAction, BulkSummary, IngestPipeline};

/// Operations to fail on purpose.
#[derive(Debug, Clone, Default)]
pub struct FailurePlan {
    /// Reject every index creation.
    pub create_index: bool,
    /// Reject the n-th bulk request (1-based) and every one after it.
    pub bulk_from_call: Option<usize>,
    /// Report the last n documents of every bulk request as rejected items.
    pub bulk_rejected_items: usize,
    /// Reject every alias update batch.
    pub update_aliases: bool,
    /// Reject deletion of these indices.
    pub delete_indices: BTreeSet<String>,
    /// Reject every server-side copy.
    pub reindex: bool,
    /// Stop server-side copies after this many documents, as a timed out
    /// copy does.
    pub reindex_timeout_after: Option<usize>,
}

#[derive(Debug, Default)]
struct IndexState {
    body: Value,
    documents: BTreeMap<String, Value>,
    aliases: BTreeSet<String>,
    next_auto_id: u64,
}

#[derive(Debug, Default)]
struct EngineState {
    indices: BTreeMap<String, IndexState>,
    pipelines: BTreeMap<String, Value>,
    alias_batches: Vec<Vec<AliasAction>>,
    bulk_calls: usize,
    deleted: Vec<String>,
}

/// Search engine held in process memory.
#[derive(Default)]
pub struct InMemorySearchEngine {
    state: Mutex<EngineState>,
    failures: Mutex<FailurePlan>,
}

impl InMemorySearchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the failure plan.
    pub fn fail_with(&self, plan: FailurePlan) {
        *self.failures.lock().unwrap_or_else(|e| e.into_inner()) = plan;
    }

    /// Seed an index bound to the given aliases.
    pub fn seed_index(&self, index: &str, aliases: &[&str], documents: Vec<Document>) {
        let mut state = self.lock();
        let entry = state.indices.entry(index.to_string()).or_default();
        entry.aliases.extend(aliases.iter().map(|a| a.to_string()));
        for document in documents {
            let id = document.id.unwrap_or_else(|| {
                entry.next_auto_id += 1;
                format!("auto-{}", entry.next_auto_id)
            });
            entry.documents.insert(id, document.body);
        }
    }

    /// Names of all physical indices, sorted.
    pub fn index_names(&self) -> Vec<String> {
        self.lock().indices.keys().cloned().collect()
    }

    /// Creation body of an index.
    pub fn index_body(&self, index: &str) -> Option<Value> {
        self.lock().indices.get(index).map(|i| i.body.clone())
    }

    /// Stored documents of an index, keyed by id.
    pub fn documents(&self, index: &str) -> BTreeMap<String, Value> {
        self.lock()
            .indices
            .get(index)
            .map(|i| i.documents.clone())
            .unwrap_or_default()
    }

    /// Every alias update batch applied so far, in order.
    pub fn alias_batches(&self) -> Vec<Vec<AliasAction>> {
        self.lock().alias_batches.clone()
    }

    /// Indices deleted so far, in order.
    pub fn deleted_indices(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }

    /// Installed ingest pipeline ids.
    pub fn pipeline_ids(&self) -> Vec<String> {
        self.lock().pipelines.keys().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn plan(&self) -> FailurePlan {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn resolve_targets(state: &EngineState, targets: &[String]) -> BTreeSet<String> {
        let mut resolved = BTreeSet::new();
        for target in targets {
            if state.indices.contains_key(target) {
                resolved.insert(target.clone());
            }
            for (name, index) in &state.indices {
                if index.aliases.contains(target) {
                    resolved.insert(name.clone());
                }
            }
        }
        resolved
    }

    /// Apply the attachment processor: `data` moves under `attachment.content`.
    fn run_pipeline(pipeline: &str, mut body: Value) -> Value {
        if pipeline == IngestPipeline::ATTACHMENT {
            if let Some(map) = body.as_object_mut() {
                if let Some(data) = map.remove("data") {
                    map.insert("attachment".to_string(), json!({ "content": data }));
                }
            }
        }
        body
    }
}

#[async_trait]
impl SearchEngineProvider for InMemorySearchEngine {
    async fn create_index(&self, index: &str, body: &Value) -> Result<(), SearchIndexError> {
        if self.plan().create_index {
            return Err(SearchIndexError::index_creation(format!(
                "injected failure creating {}",
                index
            )));
        }
        let mut state = self.lock();
        if state.indices.contains_key(index) {
            return Err(SearchIndexError::index_creation(format!(
                "resource_already_exists_exception: {}",
                index
            )));
        }
        if state.indices.values().any(|i| i.aliases.contains(index)) {
            return Err(SearchIndexError::index_creation(format!(
                "invalid_index_name_exception: an alias named {} exists",
                index
            )));
        }
        state.indices.insert(
            index.to_string(),
            IndexState {
                body: body.clone(),
                ..IndexState::default()
            },
        );
        Ok(())
    }

    async fn index_exists(&self, index: &str) -> Result<bool, SearchIndexError> {
        Ok(self.lock().indices.contains_key(index))
    }

    async fn delete_index(&self, index: &str) -> Result<(), SearchIndexError> {
        if self.plan().delete_indices.contains(index) {
            return Err(SearchIndexError::delete(format!(
                "injected failure deleting {}",
                index
            )));
        }
        let mut state = self.lock();
        if state.indices.remove(index).is_none() {
            return Err(SearchIndexError::index_not_found(index));
        }
        state.deleted.push(index.to_string());
        Ok(())
    }

    async fn bulk_index(
        &self,
        index: &str,
        documents: &[Document],
        pipeline: Option<&str>,
    ) -> Result<BulkSummary, SearchIndexError> {
        let plan = self.plan();
        let mut state = self.lock();
        state.bulk_calls += 1;
        if let Some(from) = plan.bulk_from_call {
            if state.bulk_calls >= from {
                return Err(SearchIndexError::bulk_index(format!(
                    "injected failure on bulk call {}",
                    state.bulk_calls
                )));
            }
        }
        if let Some(pipeline) = pipeline {
            if !state.pipelines.contains_key(pipeline) {
                return Err(SearchIndexError::bulk_index(format!(
                    "pipeline with id [{}] does not exist",
                    pipeline
                )));
            }
        }
        let target = state
            .indices
            .get_mut(index)
            .ok_or_else(|| SearchIndexError::index_not_found(index))?;

        let accepted = documents.len().saturating_sub(plan.bulk_rejected_items);
        for document in &documents[..accepted] {
            let id = document.id.clone().unwrap_or_else(|| {
                target.next_auto_id += 1;
                format!("auto-{}", target.next_auto_id)
            });
            let body = match pipeline {
                Some(p) => Self::run_pipeline(p, document.body.clone()),
                None => document.body.clone(),
            };
            target.documents.insert(id, body);
        }

        Ok(BulkSummary {
            total: documents.len(),
            indexed: accepted,
        })
    }

    async fn refresh(&self, index: &str) -> Result<(), SearchIndexError> {
        if self.lock().indices.contains_key(index) {
            Ok(())
        } else {
            Err(SearchIndexError::index_not_found(index))
        }
    }

    async fn indices_for_alias(&self, alias: &str) -> Result<Vec<String>, SearchIndexError> {
        Ok(self
            .lock()
            .indices
            .iter()
            .filter(|(_, i)| i.aliases.contains(alias))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn aliases_for_index(&self, index: &str) -> Result<Vec<String>, SearchIndexError> {
        self.lock()
            .indices
            .get(index)
            .map(|i| i.aliases.iter().cloned().collect())
            .ok_or_else(|| SearchIndexError::index_not_found(index))
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> Result<(), SearchIndexError> {
        if self.plan().update_aliases {
            return Err(SearchIndexError::alias("injected alias update failure"));
        }
        let mut state = self.lock();

        // Validate the whole batch before touching anything
        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    if !state.indices.contains_key(index) {
                        return Err(SearchIndexError::index_not_found(index.clone()));
                    }
                    if state.indices.contains_key(alias) {
                        return Err(SearchIndexError::alias(format!(
                            "an index named {} exists",
                            alias
                        )));
                    }
                }
                AliasAction::Remove { index, alias } => {
                    let holds = state
                        .indices
                        .get(index)
                        .map(|i| i.aliases.contains(alias))
                        .unwrap_or(false);
                    if !holds {
                        return Err(SearchIndexError::alias(format!(
                            "aliases [{}] missing on index [{}]",
                            alias, index
                        )));
                    }
                }
            }
        }

        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    if let Some(i) = state.indices.get_mut(index) {
                        i.aliases.insert(alias.clone());
                    }
                }
                AliasAction::Remove { index, alias } => {
                    if let Some(i) = state.indices.get_mut(index) {
                        i.aliases.remove(alias);
                    }
                }
            }
        }
        state.alias_batches.push(actions.to_vec());
        Ok(())
    }

    async fn ensure_pipeline(&self, pipeline: &IngestPipeline) -> Result<bool, SearchIndexError> {
        let mut state = self.lock();
        if state.pipelines.contains_key(&pipeline.id) {
            return Ok(false);
        }
        state
            .pipelines
            .insert(pipeline.id.clone(), pipeline.body.clone());
        Ok(true)
    }

    async fn reindex(&self, source: &str, dest: &str) -> Result<u64, SearchIndexError> {
        let plan = self.plan();
        if plan.reindex {
            return Err(SearchIndexError::reindex("injected reindex failure"));
        }
        let mut state = self.lock();
        let documents = state
            .indices
            .get(source)
            .map(|i| i.documents.clone())
            .ok_or_else(|| SearchIndexError::index_not_found(source))?;
        let target = state
            .indices
            .get_mut(dest)
            .ok_or_else(|| SearchIndexError::index_not_found(dest))?;
        let total = documents.len();
        let written = plan.reindex_timeout_after.map_or(total, |n| n.min(total));
        target.documents.extend(documents.into_iter().take(written));

        // Same acceptance rules as a real engine response
        let response = json!({
            "timed_out": written < total,
            "total": total,
            "created": written,
            "updated": 0,
            "version_conflicts": 0,
            "failures": []
        });
        wire::reindex_outcome(&response).map_err(SearchIndexError::reindex)
    }

    async fn search(&self, targets: &[String], _body: &Value) -> Result<Value, SearchIndexError> {
        let state = self.lock();
        let mut hits = Vec::new();
        for index in Self::resolve_targets(&state, targets) {
            if let Some(i) = state.indices.get(&index) {
                for (id, source) in &i.documents {
                    hits.push(json!({
                        "_index": index,
                        "_id": id,
                        "_score": 1.0,
                        "_source": source
                    }));
                }
            }
        }
        Ok(json!({
            "took": 0,
            "hits": {
                "total": { "value": hits.len(), "relation": "eq" },
                "hits": hits
            }
        }))
    }
}
