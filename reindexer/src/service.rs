//! The reindex service.
//!
//! Entry point for every operation that touches indices or tasks. Work is split
//! in two phases:
//!
//! 1. A synchronous phase that validates input and computes everything the work
//!    needs (mapping, analysis settings, index id). Errors here are returned to
//!    the caller and no task is created.
//! 2. The target's lock is taken and the work is queued. From here on, every
//!    outcome is recorded on the task and the caller only gets a ticket.

use std::sync::Arc;

use reindexer_repository::{IngestPipeline, SearchEngineProvider};
use reindexer_shared::{Context, Source, Task, TaskTarget};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::analysis::{analyzer_names, resolve_analysis};
use crate::builder::{new_index_id, BuildPlan, BuildState, IndexBuilder, PopulateStrategy};
use crate::catalog::Catalog;
use crate::errors::ReindexError;
use crate::harvest::SourceCatalog;
use crate::mapping::generate_mapping;
use crate::plugins::{Params, PluginRegistry};
use crate::tracker::{describe, TaskHandle, TaskTicket, TaskTracker};
use crate::worker::{Job, JobQueue};

/// Which population strategy a build request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildKind {
    Rebuild,
    Reindex,
}

pub struct ReindexService {
    catalog: Arc<Catalog>,
    tracker: Arc<TaskTracker>,
    builder: Arc<IndexBuilder>,
    sources: Arc<dyn SourceCatalog>,
    queue: JobQueue,
    plugins: PluginRegistry,
}

impl ReindexService {
    pub fn new(
        catalog: Arc<Catalog>,
        tracker: Arc<TaskTracker>,
        builder: Arc<IndexBuilder>,
        sources: Arc<dyn SourceCatalog>,
        queue: JobQueue,
    ) -> Self {
        Self {
            catalog,
            tracker,
            builder,
            sources,
            queue,
            plugins: PluginRegistry::default(),
        }
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Self {
        self.plugins = plugins;
        self
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn tracker(&self) -> &Arc<TaskTracker> {
        &self.tracker
    }

    fn engine(&self) -> &Arc<dyn SearchEngineProvider> {
        self.builder.engine()
    }

    // ------------------------------------------------------------------
    // Builds
    // ------------------------------------------------------------------

    /// Compute the build plan for a context without side effects on indices.
    pub async fn plan_build(
        &self,
        context_id: Uuid,
        kind: BuildKind,
    ) -> Result<BuildPlan, ReindexError> {
        let (context, resource, source, analysis) = self.catalog.read(|state| {
            let context = state
                .context(context_id)
                .cloned()
                .ok_or_else(|| ReindexError::not_found(format!("context {}", context_id)))?;
            let resource = state.resource(context.resource_id).cloned().ok_or_else(|| {
                ReindexError::not_found(format!("resource {}", context.resource_id))
            })?;
            let source = state.source(resource.source_id).cloned().ok_or_else(|| {
                ReindexError::not_found(format!("source {}", resource.source_id))
            })?;
            let analysis = resolve_analysis(&analyzer_names(&context), state)?;
            Ok::<_, ReindexError>((context, resource, source, analysis))
        })?;

        let mapping = generate_mapping(&context, Some(source.mode))?;
        let pipeline = source
            .mode
            .requires_attachment_pipeline()
            .then(IngestPipeline::attachment);
        let alias = context.alias();

        let strategy = match kind {
            BuildKind::Rebuild => PopulateStrategy::Rebuild { source, resource },
            BuildKind::Reindex => {
                let current = self.engine().indices_for_alias(&alias).await?;
                if current.len() > 1 {
                    warn!(alias = %alias, indices = ?current, "Alias bound to several indices");
                }
                let from_index = current.into_iter().next().ok_or_else(|| {
                    ReindexError::validation(format!(
                        "context '{}' has no index to reindex from",
                        context.name
                    ))
                })?;
                PopulateStrategy::Reindex { from_index }
            }
        };

        Ok(BuildPlan {
            context_id: context.id,
            context_name: context.name,
            alias,
            index_id: new_index_id(),
            mapping,
            analysis,
            pipeline,
            strategy,
        })
    }

    /// Rebuild a context from a fresh harvest.
    pub async fn rebuild_context(
        &self,
        context_id: Uuid,
        user: Option<String>,
    ) -> Result<TaskTicket, ReindexError> {
        self.submit_build(context_id, user, BuildKind::Rebuild).await
    }

    /// Rebuild a context by copying its current index into a new one.
    pub async fn reindex_context(
        &self,
        context_id: Uuid,
        user: Option<String>,
    ) -> Result<TaskTicket, ReindexError> {
        self.submit_build(context_id, user, BuildKind::Reindex).await
    }

    #[instrument(skip(self, user))]
    async fn submit_build(
        &self,
        context_id: Uuid,
        user: Option<String>,
        kind: BuildKind,
    ) -> Result<TaskTicket, ReindexError> {
        let plan = self.plan_build(context_id, kind).await?;
        let strategy = plan.strategy.name();
        let handle = self
            .tracker
            .acquire(
                TaskTarget::Context(context_id),
                user,
                describe(&plan.index_id, format!("{} queued", strategy)),
            )
            .await?;
        // The context may have been deleted between planning and locking
        if self.catalog.context(context_id).is_err() {
            self.tracker.discard(handle).await?;
            return Err(ReindexError::not_found(format!("context {}", context_id)));
        }

        info!(
            context = %plan.context_name,
            index = %plan.index_id,
            strategy = strategy,
            state = %BuildState::Pending,
            "Build state"
        );

        let index_id = plan.index_id.clone();
        let builder = self.builder.clone();
        let job = Job::new(handle, format!("{} {}", strategy, plan.context_name), async move {
            builder.build_index(&plan).await.map(|report| report.summary())
        })
        .for_index(index_id);

        self.queue.submit(job).await
    }

    // ------------------------------------------------------------------
    // Contexts
    // ------------------------------------------------------------------

    /// Delete a context, its index and its task history.
    ///
    /// Refused with `LockedError` while the context has a running task.
    pub async fn delete_context(
        &self,
        context_id: Uuid,
        user: Option<String>,
    ) -> Result<Context, ReindexError> {
        self.catalog.context(context_id)?;
        let target = TaskTarget::Context(context_id);
        // Keeps builds out; purged with the rest of the history
        let lock = self.tracker.acquire(target, user, "delete").await?;

        let context = match self.catalog.remove_context(context_id) {
            Ok(context) => context,
            Err(e) => {
                self.tracker
                    .complete(lock, false, format!("delete failed: {}", e))
                    .await?;
                return Err(e);
            }
        };
        drop_context_index(self.engine().as_ref(), &context).await;
        self.tracker.purge(&target).await?;
        info!(context = %context.name, "Context deleted");
        Ok(context)
    }

    pub async fn context_tasks(&self, context_id: Uuid) -> Result<Vec<Task>, ReindexError> {
        self.catalog.context(context_id)?;
        self.tracker.tasks(&TaskTarget::Context(context_id)).await
    }

    pub async fn context_task(&self, context_id: Uuid, task_id: Uuid) -> Result<Task, ReindexError> {
        self.tracker
            .task(&TaskTarget::Context(context_id), task_id)
            .await
    }

    // ------------------------------------------------------------------
    // Sources
    // ------------------------------------------------------------------

    /// Register a source and start discovering its resources.
    pub async fn add_source(
        &self,
        source: Source,
        user: Option<String>,
    ) -> Result<TaskTicket, ReindexError> {
        let source_id = source.id;
        self.catalog.add_source(source)?;
        self.discover_source(source_id, user).await
    }

    /// Re-discover the resources of a source as a tracked task.
    pub async fn discover_source(
        &self,
        source_id: Uuid,
        user: Option<String>,
    ) -> Result<TaskTicket, ReindexError> {
        let source = self.catalog.source(source_id)?;
        let handle = self
            .tracker
            .acquire(TaskTarget::Source(source_id), user, "discovery queued")
            .await?;

        let sources = self.sources.clone();
        let catalog = self.catalog.clone();
        let tracker = self.tracker.clone();
        let engine = self.engine().clone();
        let job = Job::new(handle, format!("discover {}", source.name), async move {
            let resources = sources.discover(&source).await?;
            let count = resources.len();
            let doomed = catalog.read(|state| state.contexts_dropped_by(source.id, &resources));
            let locks = lock_contexts(&tracker, &doomed, "dropped by discovery").await?;

            let dropped = match catalog.replace_resources(source.id, resources) {
                Ok(dropped) => dropped,
                Err(e) => {
                    release_contexts(&tracker, locks).await;
                    return Err(e);
                }
            };
            for context in &dropped {
                warn!(context = %context.name, "Context dropped with its resource");
                drop_context_index(engine.as_ref(), context).await;
                tracker.purge(&TaskTarget::Context(context.id)).await?;
            }
            let kept: Vec<TaskHandle> = locks
                .into_iter()
                .filter(|h| !dropped.iter().any(|c| h.target() == TaskTarget::Context(c.id)))
                .collect();
            release_contexts(&tracker, kept).await;
            Ok(format!(
                "{} resources discovered, {} contexts dropped",
                count,
                dropped.len()
            ))
        });

        self.queue.submit(job).await
    }

    /// Delete a source with its resources, contexts, indices and tasks.
    pub async fn delete_source(
        &self,
        source_id: Uuid,
        user: Option<String>,
    ) -> Result<Source, ReindexError> {
        let target = TaskTarget::Source(source_id);
        let lock = self.tracker.acquire(target, user, "delete").await?;

        let contexts = self.catalog.read(|state| state.contexts_of_source(source_id));
        let locks = match lock_contexts(&self.tracker, &contexts, "deleted with source").await {
            Ok(locks) => locks,
            Err(e) => {
                self.tracker
                    .complete(lock, false, format!("delete refused: {}", e))
                    .await?;
                return Err(e);
            }
        };

        let removed = match self.catalog.remove_source(source_id) {
            Ok(removed) => removed,
            Err(e) => {
                release_contexts(&self.tracker, locks).await;
                self.tracker
                    .complete(lock, false, format!("delete failed: {}", e))
                    .await?;
                return Err(e);
            }
        };
        // Context locks go with the purged histories
        drop(locks);
        for context in &removed.contexts {
            drop_context_index(self.engine().as_ref(), context).await;
            self.tracker.purge(&TaskTarget::Context(context.id)).await?;
        }
        self.tracker.purge(&target).await?;
        info!(
            source = %removed.source.name,
            resources = removed.resources.len(),
            contexts = removed.contexts.len(),
            "Source deleted"
        );
        Ok(removed.source)
    }

    pub async fn source_tasks(&self, source_id: Uuid) -> Result<Vec<Task>, ReindexError> {
        self.catalog.source(source_id)?;
        self.tracker.tasks(&TaskTarget::Source(source_id)).await
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Run the search model `name` with `params`.
    pub async fn search(&self, name: &str, params: &Params) -> Result<Value, ReindexError> {
        let model = self.catalog.search_model(name)?;
        let targets = model
            .contexts
            .iter()
            .map(|id| self.catalog.context(*id).map(|c| c.alias()))
            .collect::<Result<Vec<_>, _>>()?;

        let plugin = self.plugins.resolve(&model);
        let body = plugin.input(&model, params)?;
        debug!(model = %model.name, targets = ?targets, "Searching");
        let raw = self.engine().search(&targets, &body).await?;
        plugin.output(&model, raw)
    }
}

/// Lock every context in `ids`, or none of them.
///
/// The first busy context fails the whole call with its `LockedError`, after
/// the locks already taken are released.
async fn lock_contexts(
    tracker: &TaskTracker,
    ids: &[Uuid],
    description: &str,
) -> Result<Vec<TaskHandle>, ReindexError> {
    let mut locks = Vec::with_capacity(ids.len());
    for id in ids {
        match tracker
            .acquire(TaskTarget::Context(*id), None, description)
            .await
        {
            Ok(lock) => locks.push(lock),
            Err(e) => {
                release_contexts(tracker, locks).await;
                return Err(e);
            }
        }
    }
    Ok(locks)
}

async fn release_contexts(tracker: &TaskTracker, locks: Vec<TaskHandle>) {
    for lock in locks {
        let target = lock.target();
        if let Err(e) = tracker.discard(lock).await {
            warn!(target = %target, error = %e, "Cannot release context lock");
        }
    }
}

/// Delete every index behind a context's alias. Failures leave orphans.
async fn drop_context_index(engine: &dyn SearchEngineProvider, context: &Context) {
    let alias = context.alias();
    let indices = match engine.indices_for_alias(&alias).await {
        Ok(indices) => indices,
        Err(e) => {
            warn!(alias = %alias, error = %e, "Orphan index: cannot resolve context alias");
            return;
        }
    };
    for index in indices {
        if let Err(e) = engine.delete_index(&index).await {
            warn!(index = %index, alias = %alias, error = %e, "Orphan index: delete failed");
        }
    }
}
