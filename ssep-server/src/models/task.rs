//! Separation task state machine
//!
//! Queued → Processing → Completed, or → Failed from either non-terminal
//! state. Terminal tasks are immutable until the retention sweeper removes
//! them.

use super::round_to;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ssep_common::time::elapsed_seconds;
use std::path::PathBuf;
use thiserror::Error;

/// Opaque task identifier (UUID v4 string)
pub type TaskId = String;

/// Task lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Accepted, waiting for a worker
    Queued,
    /// A worker is running the pipeline
    Processing,
    /// Output written and scored
    Completed,
    /// A pipeline stage failed
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskStateError {
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: TaskStatus, to: TaskStatus },
}

/// One set of speech quality scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScoreSet {
    /// Short-time objective intelligibility, [0, 1]
    pub stoi: f64,
    /// Perceptual speech quality, [1, 4.5]
    pub pesq: f64,
    /// Scale-invariant signal-to-distortion ratio (dB)
    pub si_sdr: f64,
    /// Mean opinion score estimate, [1, 5]
    pub mos: f64,
}

impl QualityScoreSet {
    /// Element-wise `self - other`
    pub fn difference(&self, other: &QualityScoreSet) -> QualityScoreSet {
        QualityScoreSet {
            stoi: self.stoi - other.stoi,
            pesq: self.pesq - other.pesq,
            si_sdr: self.si_sdr - other.si_sdr,
            mos: self.mos - other.mos,
        }
    }
}

/// Before/after quality comparison for a completed task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    /// Scores of the separated output
    pub pred: QualityScoreSet,
    /// Scores of the original mixture
    pub mix: QualityScoreSet,
    /// `pred - mix`
    pub improvements: QualityScoreSet,
    /// MOS improvement, rounded to 3 decimals
    pub main_improvement: f64,
}

impl QualityReport {
    pub fn new(pred: QualityScoreSet, mix: QualityScoreSet) -> Self {
        let improvements = pred.difference(&mix);
        Self {
            pred,
            mix,
            improvements,
            main_improvement: round_to(improvements.mos, 3),
        }
    }
}

/// A submitted separation job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub status: TaskStatus,
    /// 0-100, never decreases
    pub progress: u8,
    /// Current stage description
    pub message: String,
    pub start_time: DateTime<Utc>,
    pub input_file: PathBuf,
    /// Set only once Completed
    pub output_file: Option<PathBuf>,
    /// Filename as uploaded
    pub original_filename: String,
    pub file_size: u64,
    /// Set only once Completed
    pub quality_scores: Option<QualityReport>,
    /// Set only once Failed
    pub error: Option<String>,
    /// Seconds of separated audio, rounded to 0.1
    pub audio_duration: Option<f64>,
    /// Seconds from submission to completion, rounded to 0.01
    pub processing_time: Option<f64>,
}

impl Task {
    /// New task in the Queued state
    pub fn new(
        id: TaskId,
        input_file: PathBuf,
        original_filename: String,
        file_size: u64,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            status: TaskStatus::Queued,
            progress: 0,
            message: "Task queued".to_string(),
            start_time,
            input_file,
            output_file: None,
            original_filename,
            file_size,
            quality_scores: None,
            error: None,
            audio_duration: None,
            processing_time: None,
        }
    }

    /// Queued → Processing
    pub fn start(&mut self, message: impl Into<String>) -> Result<(), TaskStateError> {
        if self.status != TaskStatus::Queued {
            return Err(self.invalid(TaskStatus::Processing));
        }
        self.status = TaskStatus::Processing;
        self.progress = self.progress.max(10);
        self.message = message.into();
        Ok(())
    }

    /// Record a stage checkpoint while Processing
    ///
    /// Progress never moves backwards; a lower value only updates the message.
    pub fn advance(&mut self, progress: u8, message: impl Into<String>) -> Result<(), TaskStateError> {
        if self.status != TaskStatus::Processing {
            return Err(self.invalid(TaskStatus::Processing));
        }
        self.progress = self.progress.max(progress.min(99));
        self.message = message.into();
        Ok(())
    }

    /// Processing → Completed
    pub fn complete(
        &mut self,
        output_file: PathBuf,
        quality: QualityReport,
        audio_duration: f64,
        now: DateTime<Utc>,
    ) -> Result<(), TaskStateError> {
        if self.status != TaskStatus::Processing {
            return Err(self.invalid(TaskStatus::Completed));
        }
        self.status = TaskStatus::Completed;
        self.progress = 100;
        self.message = "Separation complete".to_string();
        self.output_file = Some(output_file);
        self.quality_scores = Some(quality);
        self.audio_duration = Some(round_to(audio_duration, 1));
        self.processing_time = Some(round_to(elapsed_seconds(self.start_time, now), 2));
        Ok(())
    }

    /// Queued or Processing → Failed
    ///
    /// Queued tasks only fail when the worker pool shuts down before reaching
    /// them. Progress keeps its last value.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), TaskStateError> {
        if self.status.is_terminal() {
            return Err(self.invalid(TaskStatus::Failed));
        }
        let error = error.into();
        self.status = TaskStatus::Failed;
        self.message = format!("Processing failed: {}", error);
        self.error = Some(error);
        Ok(())
    }

    /// Remaining seconds extrapolated from elapsed time and progress
    ///
    /// Only defined while Processing with progress strictly between 0 and 100.
    pub fn estimated_time(&self, now: DateTime<Utc>) -> Option<u64> {
        if self.status != TaskStatus::Processing || self.progress == 0 || self.progress >= 100 {
            return None;
        }
        let elapsed = elapsed_seconds(self.start_time, now);
        let progress = f64::from(self.progress);
        Some((elapsed / progress * (100.0 - progress)) as u64)
    }

    fn invalid(&self, to: TaskStatus) -> TaskStateError {
        TaskStateError::InvalidTransition {
            from: self.status,
            to,
        }
    }
}
