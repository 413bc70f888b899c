//! Build worker pool.
//!
//! Accepted work is queued on a bounded channel and executed by a fixed number
//! of workers. The lock on the target is taken before a job is queued, so a job
//! always carries the [`TaskHandle`] it must complete. Whatever happens to the
//! job (success, error, panic, shutdown before it started) the task is
//! completed.
//!
//! Submission never waits: a full queue refuses the job. On shutdown the queue
//! is closed before it is drained, so no job can slip in behind the drain.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::ReindexError;
use crate::tracker::{describe, TaskHandle, TaskTicket, TaskTracker};

/// Default size of the job queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// A unit of work bound to a running task.
pub struct Job {
    handle: TaskHandle,
    label: String,
    index_id: Option<String>,
    work: BoxFuture<'static, Result<String, ReindexError>>,
}

impl Job {
    /// Wrap `work`; its `Ok` message becomes the task description.
    pub fn new<F>(handle: TaskHandle, label: impl Into<String>, work: F) -> Self
    where
        F: Future<Output = Result<String, ReindexError>> + Send + 'static,
    {
        Self {
            handle,
            label: label.into(),
            index_id: None,
            work: work.boxed(),
        }
    }

    /// Tag every description recorded for this job with a physical index id.
    pub fn for_index(mut self, index_id: impl Into<String>) -> Self {
        self.index_id = Some(index_id.into());
        self
    }

    fn describe(&self, message: &str) -> String {
        match self.index_id {
            Some(ref id) => describe(id, message),
            None => message.to_string(),
        }
    }
}

/// Sending side of the pool.
#[derive(Clone)]
pub struct JobQueue {
    sender: mpsc::Sender<Job>,
    tracker: Arc<TaskTracker>,
}

impl JobQueue {
    /// Queue `job` and return its ticket.
    ///
    /// When the queue is full or the pool no longer accepts work, the job's
    /// task is failed and a `QueueError` is returned.
    pub async fn submit(&self, job: Job) -> Result<TaskTicket, ReindexError> {
        let ticket = job.handle.ticket();
        debug!(task_id = %ticket.task_id, label = %job.label, "Queueing job");
        let (job, reason) = match self.sender.try_send(job) {
            Ok(()) => return Ok(ticket),
            Err(TrySendError::Full(job)) => (job, "job queue is full"),
            Err(TrySendError::Closed(job)) => (job, "worker pool is shut down"),
        };
        warn!(task_id = %ticket.task_id, label = %job.label, reason = reason, "Job refused");
        let description = job.describe(&format!("not started: {}", reason));
        self.tracker.complete(job.handle, false, description).await?;
        Err(ReindexError::queue(reason))
    }

    /// Whether the pool stopped accepting work.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Receiving side of the pool.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` workers. They stop taking jobs once `shutdown` fires;
    /// jobs already running are finished.
    pub fn start(
        tracker: Arc<TaskTracker>,
        workers: usize,
        capacity: usize,
        shutdown: &broadcast::Sender<()>,
    ) -> (JobQueue, WorkerPool) {
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));

        let handles = (0..workers.max(1))
            .map(|worker| {
                let tracker = tracker.clone();
                let receiver = receiver.clone();
                let shutdown = shutdown.subscribe();
                tokio::spawn(work_loop(worker, tracker, receiver, shutdown))
            })
            .collect();

        info!(workers = workers.max(1), capacity = capacity.max(1), "Worker pool started");
        (JobQueue { sender, tracker }, WorkerPool { workers: handles })
    }

    /// Wait for every worker to exit.
    pub async fn join(self) {
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Worker exited abnormally");
            }
        }
    }
}

async fn work_loop(
    worker: usize,
    tracker: Arc<TaskTracker>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    mut shutdown: broadcast::Receiver<()>,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = shutdown.recv() => None,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = next else {
            break;
        };
        run_job(worker, &tracker, job).await;
    }

    // Jobs still queued hold their target's lock; release them
    receiver.lock().await.close();
    while let Ok(job) = receiver.lock().await.try_recv() {
        let description = job.describe("not started: worker pool shut down");
        if let Err(e) = tracker.complete(job.handle, false, description).await {
            error!(error = %e, "Failed to release queued task");
        }
    }
    debug!(worker = worker, "Worker stopped");
}

async fn run_job(worker: usize, tracker: &TaskTracker, job: Job) {
    let Job {
        handle,
        label,
        index_id,
        work,
    } = job;
    let task_id = handle.id();
    debug!(worker = worker, task_id = %task_id, label = %label, "Job started");

    let (success, message) = match tokio::spawn(work).await {
        Ok(Ok(message)) => (true, message),
        Ok(Err(e)) => (false, format!("failed: {}", e)),
        Err(e) if e.is_panic() => {
            error!(task_id = %task_id, label = %label, "Job panicked");
            (false, "failed: job panicked".to_string())
        }
        Err(e) => (false, format!("failed: {}", e)),
    };

    let description = match index_id {
        Some(ref id) => describe(id, &message),
        None => message,
    };
    if let Err(e) = tracker.complete(handle, success, description).await {
        warn!(task_id = %task_id, error = %e, "Failed to record job outcome");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reindexer_repository::InMemoryTaskRepository;
    use reindexer_shared::TaskTarget;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use uuid::Uuid;

    fn tracker() -> Arc<TaskTracker> {
        Arc::new(TaskTracker::new(Arc::new(InMemoryTaskRepository::new())))
    }

    async fn wait_until_done(tracker: &TaskTracker, target: TaskTarget, task_id: Uuid) -> reindexer_shared::Task {
        for _ in 0..200 {
            let task = tracker.task(&target, task_id).await.unwrap();
            if !task.is_running() {
                return task;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {} did not finish", task_id);
    }

    #[tokio::test]
    async fn test_job_outcomes_are_recorded() {
        let tracker = tracker();
        let (shutdown, _) = broadcast::channel(1);
        let (queue, _pool) = WorkerPool::start(tracker.clone(), 2, 8, &shutdown);

        let ok_target = TaskTarget::Context(Uuid::new_v4());
        let handle = tracker.acquire(ok_target, None, "queued").await.unwrap();
        let ok = queue
            .submit(Job::new(handle, "ok", async { Ok("done".to_string()) }).for_index("abc1234"))
            .await
            .unwrap();

        let err_target = TaskTarget::Context(Uuid::new_v4());
        let handle = tracker.acquire(err_target, None, "queued").await.unwrap();
        let failed = queue
            .submit(Job::new(handle, "err", async {
                Err(ReindexError::harvest("source offline"))
            }))
            .await
            .unwrap();

        let task = wait_until_done(&tracker, ok_target, ok.task_id).await;
        assert_eq!(task.success, Some(true));
        assert_eq!(task.description, "[index=abc1234] done");

        let task = wait_until_done(&tracker, err_target, failed.task_id).await;
        assert_eq!(task.success, Some(false));
        assert!(task.description.contains("source offline"));
    }

    #[tokio::test]
    async fn test_panicking_job_is_recorded_as_failed() {
        let tracker = tracker();
        let (shutdown, _) = broadcast::channel(1);
        let (queue, _pool) = WorkerPool::start(tracker.clone(), 1, 8, &shutdown);

        let target = TaskTarget::Context(Uuid::new_v4());
        let handle = tracker.acquire(target, None, "queued").await.unwrap();
        let ticket = queue
            .submit(Job::new(handle, "boom", async {
                if true {
                    panic!("boom");
                }
                Ok(String::new())
            }))
            .await
            .unwrap();

        let task = wait_until_done(&tracker, target, ticket.task_id).await;
        assert_eq!(task.success, Some(false));
        assert!(task.description.contains("panicked"));

        // The worker survived and the target is free again
        assert!(tracker.acquire(target, None, "again").await.is_ok());
    }

    /// A job that reports when it starts and runs until released.
    async fn start_blocker(tracker: &TaskTracker, queue: &JobQueue) -> (TaskTarget, Uuid, oneshot::Sender<()>) {
        let (started_tx, started) = oneshot::channel::<()>();
        let (release, wait) = oneshot::channel::<()>();
        let target = TaskTarget::Source(Uuid::new_v4());
        let handle = tracker.acquire(target, None, "blocker").await.unwrap();
        let ticket = queue
            .submit(Job::new(handle, "blocker", async move {
                let _ = started_tx.send(());
                let _ = wait.await;
                Ok("released".to_string())
            }))
            .await
            .unwrap();
        started.await.unwrap();
        (target, ticket.task_id, release)
    }

    #[tokio::test]
    async fn test_full_queue_refuses_without_waiting() {
        let tracker = tracker();
        let (shutdown, _) = broadcast::channel(1);
        let (queue, _pool) = WorkerPool::start(tracker.clone(), 1, 1, &shutdown);
        let (_, _, release) = start_blocker(&tracker, &queue).await;

        let queued_target = TaskTarget::Context(Uuid::new_v4());
        let handle = tracker.acquire(queued_target, None, "queued").await.unwrap();
        let queued = queue
            .submit(Job::new(handle, "fits", async { Ok("done".to_string()) }))
            .await
            .unwrap();

        let target = TaskTarget::Context(Uuid::new_v4());
        let handle = tracker.acquire(target, None, "queued").await.unwrap();
        let task_id = handle.id();
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            queue.submit(Job::new(handle, "overflow", async { Ok(String::new()) }).for_index("abc1234")),
        )
        .await
        .expect("submit must not wait for room");

        assert!(matches!(result, Err(ReindexError::QueueError(_))));
        let task = tracker.task(&target, task_id).await.unwrap();
        assert_eq!(task.success, Some(false));
        assert_eq!(task.description, "[index=abc1234] not started: job queue is full");
        assert!(tracker.acquire(target, None, "retry").await.is_ok());

        release.send(()).unwrap();
        let task = wait_until_done(&tracker, queued_target, queued.task_id).await;
        assert_eq!(task.success, Some(true));
    }

    #[tokio::test]
    async fn test_queue_closes_when_shutdown_fires() {
        let tracker = tracker();
        let (shutdown, _) = broadcast::channel(1);
        let (queue, pool) = WorkerPool::start(tracker.clone(), 2, 8, &shutdown);
        let (blocker_target, blocker_id, release) = start_blocker(&tracker, &queue).await;

        shutdown.send(()).unwrap();
        for _ in 0..200 {
            if queue.is_closed() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(queue.is_closed());

        // Refused up front while the running job still holds its worker
        let target = TaskTarget::Context(Uuid::new_v4());
        let handle = tracker.acquire(target, None, "queued").await.unwrap();
        let task_id = handle.id();
        let result = queue
            .submit(Job::new(handle, "late", async { Ok(String::new()) }))
            .await;
        assert!(matches!(result, Err(ReindexError::QueueError(_))));
        let task = tracker.task(&target, task_id).await.unwrap();
        assert_eq!(task.success, Some(false));
        assert!(task.description.contains("shut down"), "{}", task.description);

        release.send(()).unwrap();
        pool.join().await;
        let blocker = tracker.task(&blocker_target, blocker_id).await.unwrap();
        assert_eq!(blocker.success, Some(true));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_fails_the_task() {
        let tracker = tracker();
        let (shutdown, _) = broadcast::channel(1);
        let (queue, pool) = WorkerPool::start(tracker.clone(), 1, 8, &shutdown);
        shutdown.send(()).unwrap();
        pool.join().await;
        drop(shutdown);

        let target = TaskTarget::Context(Uuid::new_v4());
        let handle = tracker.acquire(target, None, "queued").await.unwrap();
        let task_id = handle.id();
        let result = queue
            .submit(Job::new(handle, "late", async { Ok(String::new()) }))
            .await;

        assert!(matches!(result, Err(ReindexError::QueueError(_))));
        assert_eq!(tracker.task(&target, task_id).await.unwrap().success, Some(false));
    }
}
