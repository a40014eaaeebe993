//! Task submission and the worker pool
//!
//! `submit` moves the staged upload into place, records a Queued task and
//! enqueues it, then returns. A fixed number of workers pull jobs from the
//! shared queue, so at most `workers` pipelines (and model invocations) run
//! at once.

use crate::inference::ModelContext;
use crate::models::{Task, TaskId};
use crate::services::pipeline::{Job, TaskPipeline};
use crate::services::task_store::TaskStore;
use ssep_common::time;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Extension used when an upload has none
pub const DEFAULT_EXTENSION: &str = "wav";

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Failed to store upload at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker pool is shut down")]
    ShutDown,
}

/// Where inputs and outputs live on disk
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub upload_dir: PathBuf,
    pub result_dir: PathBuf,
}

impl StorageLayout {
    pub fn new(upload_dir: impl Into<PathBuf>, result_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            result_dir: result_dir.into(),
        }
    }

    /// `{upload_dir}/{task_id}_input.{ext}`
    pub fn input_path(&self, task_id: &str, extension: &str) -> PathBuf {
        self.upload_dir.join(format!("{}_input.{}", task_id, extension))
    }

    /// `{result_dir}/{task_id}_output.wav`
    pub fn output_path(&self, task_id: &str) -> PathBuf {
        self.result_dir.join(format!("{}_output.wav", task_id))
    }

    /// Unique temporary path for an upload still being received
    pub fn staging_path(&self, extension: &str) -> PathBuf {
        self.upload_dir
            .join(format!("incoming-{}.{}", Uuid::new_v4(), extension))
    }
}

/// Handle used by the HTTP layer to submit work
#[derive(Clone)]
pub struct TaskScheduler {
    store: TaskStore,
    layout: StorageLayout,
    queue: UnboundedSender<Job>,
}

impl TaskScheduler {
    /// Start `workers` workers and return the submission handle plus the pool
    pub fn start(
        store: TaskStore,
        models: Arc<ModelContext>,
        layout: StorageLayout,
        workers: usize,
        token: CancellationToken,
    ) -> (TaskScheduler, WorkerPool) {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));
        let pipeline = Arc::new(TaskPipeline::new(store.clone(), models));

        let handles = (0..workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&rx),
                    Arc::clone(&pipeline),
                    token.clone(),
                ))
            })
            .collect();

        info!(workers = workers.max(1), "Worker pool started");

        let scheduler = TaskScheduler {
            store: store.clone(),
            layout,
            queue: tx,
        };
        let pool = WorkerPool {
            handles,
            queue: rx,
            store,
            token,
        };

        (scheduler, pool)
    }

    pub fn layout(&self) -> &StorageLayout {
        &self.layout
    }

    /// Register a staged upload as a new task and queue it
    ///
    /// On success the staged file has been moved to the task's input path.
    /// On failure no task exists afterwards.
    pub async fn submit(
        &self,
        staged: &Path,
        original_filename: &str,
        file_size: u64,
    ) -> Result<TaskId, SchedulerError> {
        let task_id = Uuid::new_v4().to_string();
        let extension = staged
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or(DEFAULT_EXTENSION);

        let input_file = self.layout.input_path(&task_id, extension);
        let output_file = self.layout.output_path(&task_id);

        tokio::fs::rename(staged, &input_file)
            .await
            .map_err(|source| SchedulerError::Storage {
                path: input_file.clone(),
                source,
            })?;

        let task = Task::new(
            task_id.clone(),
            input_file.clone(),
            original_filename.to_string(),
            file_size,
            time::now(),
        );
        self.store.insert(task).await;

        let job = Job {
            task_id: task_id.clone(),
            input_file: input_file.clone(),
            output_file,
        };

        if self.queue.send(job).is_err() {
            self.store.remove(&task_id).await;
            if let Err(e) = tokio::fs::remove_file(&input_file).await {
                warn!(path = %input_file.display(), error = %e, "Failed to remove orphaned upload");
            }
            return Err(SchedulerError::ShutDown);
        }

        info!(
            task_id = %task_id,
            filename = %original_filename,
            file_size = file_size,
            "Task submitted"
        );

        Ok(task_id)
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<UnboundedReceiver<Job>>>,
    pipeline: Arc<TaskPipeline>,
    token: CancellationToken,
) {
    debug!(worker_id = worker_id, "Worker started");

    loop {
        let job = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            job = async { queue.lock().await.recv().await } => match job {
                Some(job) => job,
                None => break,
            },
        };

        debug!(worker_id = worker_id, task_id = %job.task_id, "Worker picked up task");
        pipeline.run(job).await;
    }

    debug!(worker_id = worker_id, "Worker stopped");
}

/// Running workers; stop them with [`WorkerPool::shutdown`]
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    queue: Arc<Mutex<UnboundedReceiver<Job>>>,
    store: TaskStore,
    token: CancellationToken,
}

impl WorkerPool {
    /// Stop taking jobs, wait for in-flight tasks, and fail whatever is still queued
    pub async fn shutdown(self) {
        self.token.cancel();

        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker terminated abnormally");
            }
        }

        let mut queue = self.queue.lock().await;
        queue.close();
        let mut abandoned = 0usize;
        while let Ok(job) = queue.try_recv() {
            self.store
                .update(&job.task_id, |t| t.fail("Service shut down before processing"))
                .await;
            abandoned += 1;
        }

        info!(abandoned_tasks = abandoned, "Worker pool stopped");
    }
}
