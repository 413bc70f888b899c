//! Index build pipeline.
//!
//! Builds a new physical index for a context and swaps the context alias onto
//! it:
//!
//! ```text
//! PENDING -> CREATING_INDEX -> (INGESTING_PIPELINE) -> LOADING_DOCUMENTS
//!         -> SWITCHING_ALIAS -> SUCCEEDED | FAILED
//! ```
//!
//! Nothing visible to readers changes before the alias switch: a build that
//! fails earlier leaves at most an un-aliased index behind.

mod loader;

pub use loader::{BatchLoader, LoaderConfig, DEFAULT_BATCH_SIZE};

use std::fmt;
use std::sync::Arc;

use reindexer_repository::opensearch::{index_body, IndexSettings};
use reindexer_repository::{IngestPipeline, SearchEngineProvider};
use reindexer_shared::{Resource, Source};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::alias::{AliasSwitcher, SwitchReport};
use crate::analysis::AnalysisSettings;
use crate::errors::ReindexError;
use crate::harvest::DocumentHarvester;
use crate::mapping::MappingDocument;

/// Length of a physical index id.
const INDEX_ID_LEN: usize = 7;

/// A fresh physical index id: 7 lowercase hex characters of a random UUID.
pub fn new_index_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(INDEX_ID_LEN);
    id
}

/// Lifecycle of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Pending,
    CreatingIndex,
    IngestingPipeline,
    LoadingDocuments,
    SwitchingAlias,
    Succeeded,
    Failed,
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::CreatingIndex => "CREATING_INDEX",
            Self::IngestingPipeline => "INGESTING_PIPELINE",
            Self::LoadingDocuments => "LOADING_DOCUMENTS",
            Self::SwitchingAlias => "SWITCHING_ALIAS",
            Self::Succeeded => "SUCCEEDED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// How the new index gets its documents.
#[derive(Debug, Clone)]
pub enum PopulateStrategy {
    /// Harvest the resource again.
    Rebuild { source: Source, resource: Resource },
    /// Copy the documents of the index currently behind the alias.
    Reindex { from_index: String },
}

impl PopulateStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rebuild { .. } => "rebuild",
            Self::Reindex { .. } => "reindex",
        }
    }
}

/// Everything a build needs, computed before the task is created.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub context_id: Uuid,
    pub context_name: String,
    pub alias: String,
    pub index_id: String,
    pub mapping: MappingDocument,
    pub analysis: AnalysisSettings,
    pub pipeline: Option<IngestPipeline>,
    pub strategy: PopulateStrategy,
}

/// Outcome of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub index_id: String,
    pub documents: u64,
    pub switch: SwitchReport,
}

impl BuildReport {
    /// One-line summary for the task description.
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} documents loaded, alias {} switched",
            self.documents, self.switch.alias
        );
        if !self.switch.previous.is_empty() {
            summary.push_str(&format!(" from {}", self.switch.previous.join(",")));
        }
        if !self.switch.orphaned.is_empty() {
            summary.push_str(&format!(
                "; orphaned indices: {}",
                self.switch.orphaned.join(",")
            ));
        }
        summary
    }
}

/// Configuration for the index builder.
#[derive(Debug, Clone, Default)]
pub struct BuilderConfig {
    pub loader: LoaderConfig,
    pub index_settings: IndexSettings,
}

impl BuilderConfig {
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            loader: LoaderConfig {
                batch_size,
                ..LoaderConfig::default()
            },
            ..Self::default()
        }
    }
}

pub struct IndexBuilder {
    engine: Arc<dyn SearchEngineProvider>,
    harvester: Arc<dyn DocumentHarvester>,
    switcher: AliasSwitcher,
    config: BuilderConfig,
}

impl IndexBuilder {
    pub fn new(
        engine: Arc<dyn SearchEngineProvider>,
        harvester: Arc<dyn DocumentHarvester>,
    ) -> Self {
        Self::with_config(engine, harvester, BuilderConfig::default())
    }

    pub fn with_config(
        engine: Arc<dyn SearchEngineProvider>,
        harvester: Arc<dyn DocumentHarvester>,
        config: BuilderConfig,
    ) -> Self {
        Self {
            switcher: AliasSwitcher::new(engine.clone()),
            engine,
            harvester,
            config,
        }
    }

    pub fn engine(&self) -> &Arc<dyn SearchEngineProvider> {
        &self.engine
    }

    fn enter(&self, plan: &BuildPlan, state: BuildState) {
        info!(
            context = %plan.context_name,
            index = %plan.index_id,
            strategy = plan.strategy.name(),
            state = %state,
            "Build state"
        );
    }

    /// Run the build described by `plan`.
    #[instrument(skip(self, plan), fields(context = %plan.context_name, index = %plan.index_id))]
    pub async fn build_index(&self, plan: &BuildPlan) -> Result<BuildReport, ReindexError> {
        let result = self.run(plan).await;
        match result {
            Ok(ref report) => {
                self.enter(plan, BuildState::Succeeded);
                info!(documents = report.documents, "Build finished");
            }
            Err(ref e) => {
                self.enter(plan, BuildState::Failed);
                warn!(error = %e, "Build failed");
            }
        }
        result
    }

    async fn run(&self, plan: &BuildPlan) -> Result<BuildReport, ReindexError> {
        self.enter(plan, BuildState::CreatingIndex);
        let body = index_body(
            &plan.mapping.to_value(),
            &plan.analysis.to_value(),
            &self.config.index_settings,
        );
        self.engine.create_index(&plan.index_id, &body).await?;

        if let Some(ref pipeline) = plan.pipeline {
            self.enter(plan, BuildState::IngestingPipeline);
            if self.engine.ensure_pipeline(pipeline).await? {
                info!(pipeline = %pipeline.id, "Ingest pipeline installed");
            }
        }

        self.enter(plan, BuildState::LoadingDocuments);
        let documents = match plan.strategy {
            PopulateStrategy::Rebuild {
                ref source,
                ref resource,
            } => {
                let stream = self.harvester.collect(source, resource).await?;
                let config = LoaderConfig {
                    pipeline: plan.pipeline.as_ref().map(|p| p.id.clone()),
                    ..self.config.loader.clone()
                };
                BatchLoader::with_config(self.engine.clone(), plan.index_id.clone(), config)
                    .load_stream(stream)
                    .await?
            }
            PopulateStrategy::Reindex { ref from_index } => {
                self.engine.reindex(from_index, &plan.index_id).await?
            }
        };

        self.enter(plan, BuildState::SwitchingAlias);
        let switch = self.switcher.switch_alias(&plan.index_id, &plan.alias).await?;

        if let Err(e) = self.engine.refresh(&plan.index_id).await {
            warn!(index = %plan.index_id, error = %e, "Refresh after switch failed");
        }

        Ok(BuildReport {
            index_id: plan.index_id.clone(),
            documents,
            switch,
        })
    }
}
