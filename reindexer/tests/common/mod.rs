//! Shared fixtures for the integration tests.
//!
//! A [`Harness`] wires the real service, tracker and worker pool to the
//! in-memory engine and task store, with NDJSON documents in a temp dir.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reindexer::builder::{BuilderConfig, IndexBuilder};
use reindexer::catalog::{Catalog, CatalogData};
use reindexer::errors::ReindexError;
use reindexer::harvest::{DirectorySourceCatalog, DocumentHarvester, DocumentStream, NdjsonHarvester};
use reindexer::tracker::{TaskHandle, TaskTracker};
use reindexer::worker::{Job, JobQueue, WorkerPool};
use reindexer::ReindexService;
use reindexer_repository::{InMemorySearchEngine, InMemoryTaskRepository};
use reindexer_shared::{
    Analyzer, Column, ColumnProperty, Context, Filter, Resource, SearchModel, Source, SourceMode,
    Task, TaskTarget, Tokenizer,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::sync::{broadcast, oneshot, watch};
use uuid::Uuid;

pub const SEARCH_MODEL: &str = "roads_search";

pub struct Fixture {
    pub source: Source,
    pub resource: Resource,
    pub context: Context,
}

/// Holds every harvest until the gate is open.
#[derive(Clone)]
pub struct GatedHarvester {
    inner: NdjsonHarvester,
    gate: watch::Receiver<bool>,
    parked: Arc<AtomicUsize>,
}

#[async_trait]
impl DocumentHarvester for GatedHarvester {
    async fn collect(
        &self,
        source: &Source,
        resource: &Resource,
    ) -> Result<DocumentStream, ReindexError> {
        self.parked.fetch_add(1, Ordering::SeqCst);
        let mut gate = self.gate.clone();
        let _ = gate.wait_for(|open| *open).await;
        self.parked.fetch_sub(1, Ordering::SeqCst);
        self.inner.collect(source, resource).await
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub engine: Arc<InMemorySearchEngine>,
    pub repository: Arc<InMemoryTaskRepository>,
    pub tracker: Arc<TaskTracker>,
    pub catalog: Arc<Catalog>,
    pub service: Arc<ReindexService>,
    pub queue: JobQueue,
    pub pool: Option<WorkerPool>,
    pub shutdown: broadcast::Sender<()>,
    pub gate: watch::Sender<bool>,
    pub parked: Arc<AtomicUsize>,
    pub fixture: Fixture,
}

impl Harness {
    /// A `wfs` source with a `roads` resource, a context over it and a search
    /// model, served by a single worker.
    pub async fn new() -> Self {
        Self::with_mode(SourceMode::Wfs).await
    }

    pub async fn with_mode(mode: SourceMode) -> Self {
        Self::build(mode, 1).await
    }

    /// A `wfs` fixture served by `workers` workers.
    pub async fn with_workers(workers: usize) -> Self {
        Self::build(SourceMode::Wfs, workers).await
    }

    async fn build(mode: SourceMode, workers: usize) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let uri = match mode {
            SourceMode::Pdf => dir.path().to_string_lossy().to_string(),
            _ => "https://geo.example.org/wfs".to_string(),
        };
        let source = Source::new("geo", uri, mode, "alice");
        let resource = Resource::new(
            "roads",
            source.id,
            vec![Column::new("name", "string"), Column::new("lanes", "integer")],
        );

        let mut name = ColumnProperty::new("name", "text");
        name.analyzer = Some("roads_text".to_string());
        name.weight = Some(2.0);
        let mut context = Context::new(
            "roads",
            resource.id,
            vec![name, ColumnProperty::new("lanes", "long")],
        );
        if mode == SourceMode::Pdf {
            context.properties.push(ColumnProperty::new("data", "keyword"));
        }

        let mut model = SearchModel::new(SEARCH_MODEL, vec![context.id]);
        model.user = Some("alice".to_string());

        let data = CatalogData {
            tokenizers: vec![Tokenizer::new("standard").reserved()],
            filters: vec![
                Filter::new("lowercase").reserved(),
                Filter::new("roads_stop")
                    .with_config(json!({"type": "stop", "stopwords": ["the", "of"]})),
            ],
            analyzers: vec![Analyzer::new("roads_text")
                .with_tokenizer("standard")
                .with_filters(["lowercase", "roads_stop"])],
            sources: vec![source.clone()],
            resources: vec![resource.clone()],
            contexts: vec![context.clone()],
            search_models: vec![model],
        };
        let catalog = Arc::new(Catalog::from_data(data).expect("valid catalog"));

        let engine = Arc::new(InMemorySearchEngine::new());
        let repository = Arc::new(InMemoryTaskRepository::new());
        let tracker = Arc::new(TaskTracker::new(repository.clone()));
        let harvester = NdjsonHarvester::new(dir.path());
        let (gate, gate_rx) = watch::channel(true);
        let parked = Arc::new(AtomicUsize::new(0));
        let gated = GatedHarvester {
            inner: harvester.clone(),
            gate: gate_rx,
            parked: parked.clone(),
        };
        let builder = Arc::new(IndexBuilder::with_config(
            engine.clone(),
            Arc::new(gated),
            BuilderConfig::with_batch_size(2),
        ));

        let (shutdown, _) = broadcast::channel(1);
        let (queue, pool) = WorkerPool::start(tracker.clone(), workers, 16, &shutdown);
        let service = Arc::new(ReindexService::new(
            catalog.clone(),
            tracker.clone(),
            builder,
            Arc::new(DirectorySourceCatalog::new(harvester)),
            queue.clone(),
        ));

        let harness = Self {
            dir,
            engine,
            repository,
            tracker,
            catalog,
            service,
            queue,
            pool: Some(pool),
            shutdown,
            gate,
            parked,
            fixture: Fixture {
                source,
                resource,
                context,
            },
        };
        harness.write_documents(
            "roads",
            &[
                json!({"id": "r1", "name": "Avenue of the Republic", "lanes": 4}),
                json!({"id": "r2", "name": "Harbour Road", "lanes": 2}),
                json!({"id": "r3", "name": "Old Mill Lane", "lanes": 1}),
            ],
        );
        harness
    }

    pub fn context_id(&self) -> Uuid {
        self.fixture.context.id
    }

    pub fn alias(&self) -> String {
        self.fixture.context.alias()
    }

    pub fn context_target(&self) -> TaskTarget {
        TaskTarget::Context(self.context_id())
    }

    /// Directory the harvester reads the fixture source's files from.
    pub fn documents_dir(&self) -> PathBuf {
        match self.fixture.source.mode {
            SourceMode::Pdf => self.dir.path().to_path_buf(),
            _ => self.dir.path().join(self.fixture.source.id.to_string()),
        }
    }

    /// Write `<name>.ndjson` with one record per line.
    pub fn write_documents(&self, name: &str, records: &[Value]) {
        let dir = self.documents_dir();
        std::fs::create_dir_all(&dir).expect("documents dir");
        let lines: Vec<String> = records.iter().map(|r| r.to_string()).collect();
        std::fs::write(dir.join(format!("{}.ndjson", name)), lines.join("\n") + "\n")
            .expect("write documents");
    }

    /// Hold every harvest until [`Harness::open_gate`].
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Wait until a build is held inside its harvest.
    pub async fn wait_until_parked(&self) {
        for _ in 0..400 {
            if self.parked.load(Ordering::SeqCst) > 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no build reached the harvest");
    }

    /// Wait until the task leaves the running state.
    pub async fn wait_for(&self, target: TaskTarget, task_id: Uuid) -> Task {
        for _ in 0..400 {
            let task = self.tracker.task(&target, task_id).await.expect("task");
            if !task.is_running() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {} did not finish", task_id);
    }

    /// Occupy the single worker until the returned sender fires.
    pub async fn block_worker(&self) -> oneshot::Sender<()> {
        let (release, wait) = oneshot::channel::<()>();
        let handle: TaskHandle = self
            .tracker
            .acquire(TaskTarget::Source(Uuid::new_v4()), None, "blocker")
            .await
            .expect("blocker lock");
        let job = Job::new(handle, "blocker", async move {
            let _ = wait.await;
            Ok("released".to_string())
        });
        self.queue.submit(job).await.expect("blocker queued");
        release
    }

    /// Stop the worker pool and wait for it.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown.send(());
        if let Some(pool) = self.pool.take() {
            pool.join().await;
        }
    }
}
