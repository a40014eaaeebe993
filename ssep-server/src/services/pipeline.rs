//! Per-task processing pipeline
//!
//! **Stages** (progress checkpoint in brackets):
//! 1. Load input [10]
//! 2. Normalize to stereo 44.1 kHz [20]
//! 3. Separation model [30]
//! 4. Quality of separated output and original mixture [80]
//! 5. Write output WAV [90]
//! 6. Complete [100]
//!
//! CPU-bound stages run on the blocking pool. Any stage error fails the task
//! with the error's description; nothing is retried.

use crate::audio::{decode_audio_file, write_wav, AudioLoadError, AudioPreprocessor, ResampleError};
use crate::inference::{InferenceError, ModelContext};
use crate::models::{QualityReport, TaskId};
use crate::services::quality_assessor::QualityAssessor;
use crate::services::task_store::TaskStore;
use ssep_common::time;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Why a task failed
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Separation model is not loaded")]
    ModelUnavailable,

    #[error(transparent)]
    AudioLoad(#[from] AudioLoadError),

    #[error("Preprocessing failed: {0}")]
    Preprocess(#[from] ResampleError),

    #[error("Separation failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("File system error at {path}: {source}")]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Worker failed: {0}")]
    Worker(String),
}

impl ProcessingError {
    pub(crate) fn output_write(path: &Path, error: hound::Error) -> Self {
        let source = match error {
            hound::Error::IoError(e) => e,
            other => std::io::Error::new(std::io::ErrorKind::Other, other.to_string()),
        };
        ProcessingError::FileSystem {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One queued unit of work
#[derive(Debug, Clone)]
pub struct Job {
    pub task_id: TaskId,
    pub input_file: PathBuf,
    pub output_file: PathBuf,
}

struct Completion {
    report: QualityReport,
    audio_duration: f64,
}

/// Runs jobs against the shared models, recording progress in the store
pub struct TaskPipeline {
    store: TaskStore,
    models: Arc<ModelContext>,
    preprocessor: AudioPreprocessor,
    assessor: QualityAssessor,
}

impl TaskPipeline {
    pub fn new(store: TaskStore, models: Arc<ModelContext>) -> Self {
        let assessor = QualityAssessor::new(models.quality.clone());
        Self {
            store,
            models,
            preprocessor: AudioPreprocessor::default(),
            assessor,
        }
    }

    /// Drive one task from Queued to a terminal state
    pub async fn run(&self, job: Job) {
        let task_id = job.task_id.clone();

        match self.store.update(&task_id, |t| t.start("Loading audio file")).await {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                warn!(task_id = %task_id, error = %e, "Task not startable, skipping");
                return;
            }
            None => {
                warn!(task_id = %task_id, "Task removed before processing, skipping");
                return;
            }
        }

        info!(task_id = %task_id, input = %job.input_file.display(), "Task processing started");

        match self.execute(&job).await {
            Ok(completion) => {
                let main_improvement = completion.report.main_improvement;
                let recorded = self
                    .store
                    .update(&task_id, |t| {
                        t.complete(
                            job.output_file.clone(),
                            completion.report,
                            completion.audio_duration,
                            time::now(),
                        )?;
                        Ok::<_, crate::models::TaskStateError>(t.processing_time)
                    })
                    .await;

                match recorded {
                    Some(Ok(processing_time)) => info!(
                        task_id = %task_id,
                        processing_time = ?processing_time,
                        main_improvement = main_improvement,
                        "Task completed"
                    ),
                    Some(Err(e)) => warn!(task_id = %task_id, error = %e, "Completion not recorded"),
                    None => warn!(task_id = %task_id, "Task removed while processing"),
                }
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Task failed");

                // A failed write may leave a partial file behind
                if matches!(e, ProcessingError::FileSystem { .. }) {
                    remove_partial_output(&job.output_file).await;
                }

                let message = e.to_string();
                if let Some(Err(e)) = self.store.update(&task_id, |t| t.fail(message)).await {
                    warn!(task_id = %task_id, error = %e, "Failure not recorded");
                }
            }
        }
    }

    async fn execute(&self, job: &Job) -> Result<Completion, ProcessingError> {
        let separator = self
            .models
            .separator
            .clone()
            .ok_or(ProcessingError::ModelUnavailable)?;

        let input_file = job.input_file.clone();
        let decoded = run_blocking(move || decode_audio_file(&input_file)).await?;
        debug!(
            task_id = %job.task_id,
            sample_rate = decoded.sample_rate,
            channels = decoded.channel_count(),
            frames = decoded.frames(),
            "Input decoded"
        );

        self.checkpoint(&job.task_id, 20, "Preprocessing audio").await;
        let preprocessor = self.preprocessor.clone();
        let mixture = Arc::new(run_blocking(move || preprocessor.normalize(decoded)).await?);

        self.checkpoint(&job.task_id, 30, "Running separation model").await;
        let labels = self.models.conditioning_vector();
        let model_input = Arc::clone(&mixture);
        let predicted = run_blocking(move || separator.separate(&model_input, &labels)).await?;

        if predicted.channel_count() != 2 {
            return Err(InferenceError::InvalidOutput(format!(
                "expected 2 output channels, got {}",
                predicted.channel_count()
            ))
            .into());
        }
        if predicted.frames() != mixture.frames() {
            warn!(
                task_id = %job.task_id,
                input_frames = mixture.frames(),
                output_frames = predicted.frames(),
                "Separated output length differs from input"
            );
        }
        let predicted = Arc::new(predicted);

        self.checkpoint(&job.task_id, 80, "Assessing audio quality").await;
        let assessor = self.assessor.clone();
        let (pred, mix) = (Arc::clone(&predicted), Arc::clone(&mixture));
        let report = run_blocking(move || {
            Ok::<_, ProcessingError>(QualityReport::new(assessor.score(&pred), assessor.score(&mix)))
        })
        .await?;

        self.checkpoint(&job.task_id, 90, "Saving separated audio").await;
        let output_file = job.output_file.clone();
        let output = Arc::clone(&predicted);
        run_blocking(move || {
            write_wav(&output_file, &output).map_err(|e| ProcessingError::output_write(&output_file, e))
        })
        .await?;

        Ok(Completion {
            report,
            audio_duration: predicted.duration_seconds(),
        })
    }

    async fn checkpoint(&self, task_id: &str, progress: u8, message: &str) {
        debug!(task_id = %task_id, stage = message, progress = progress, "Stage checkpoint");
        if let Some(Err(e)) = self.store.update(task_id, |t| t.advance(progress, message)).await {
            warn!(task_id = %task_id, error = %e, "Checkpoint not recorded");
        }
    }
}

/// Delete a partially written output file; absence is fine
async fn remove_partial_output(path: &Path) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed partial output");
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove partial output");
            false
        }
    }
}

/// Run a fallible CPU-bound closure on the blocking pool
async fn run_blocking<T, E, F>(f: F) -> Result<T, ProcessingError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ProcessingError> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ProcessingError::Worker(e.to_string()))?
        .map_err(Into::into)
}
