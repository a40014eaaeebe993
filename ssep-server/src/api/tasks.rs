//! Task status, result download and task listing
//!
//! GET /status/{task_id}, GET /download/{task_id}, GET /tasks

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use ssep_common::time;
use tokio_util::io::ReaderStream;

use crate::api::upload::sanitize_filename;
use crate::error::{ApiError, ApiResult};
use crate::models::{QualityScoreSet, Task, TaskId, TaskStatus};
use crate::AppState;

/// GET /status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: String,
    /// Seconds remaining, while processing
    pub estimated_time: Option<u64>,
    pub original_filename: String,
    pub file_size: u64,
    #[serde(flatten)]
    pub completion: Option<CompletionDetails>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Extra status fields once a task has completed
#[derive(Debug, Serialize)]
pub struct CompletionDetails {
    pub audio_duration: Option<f64>,
    pub processing_time: Option<f64>,
    pub download_url: String,
    /// MOS improvement of the separated output over the mixture
    pub quality_improvement: f64,
    pub detailed_scores: DetailedScores,
}

#[derive(Debug, Serialize)]
pub struct DetailedScores {
    pub mos_improvement: f64,
    pub stoi_improvement: f64,
    pub pesq_improvement: f64,
    pub si_sdr_improvement: f64,
    pub pred_quality: QualityScoreSet,
    pub mix_quality: QualityScoreSet,
}

impl StatusResponse {
    pub fn from_task(task: Task, now: DateTime<Utc>) -> Self {
        let estimated_time = task.estimated_time(now);

        let completion = match (task.status, &task.quality_scores) {
            (TaskStatus::Completed, Some(report)) => Some(CompletionDetails {
                audio_duration: task.audio_duration,
                processing_time: task.processing_time,
                download_url: download_url(&task.id),
                quality_improvement: report.main_improvement,
                detailed_scores: DetailedScores {
                    mos_improvement: report.improvements.mos,
                    stoi_improvement: report.improvements.stoi,
                    pesq_improvement: report.improvements.pesq,
                    si_sdr_improvement: report.improvements.si_sdr,
                    pred_quality: report.pred,
                    mix_quality: report.mix,
                },
            }),
            _ => None,
        };

        let error = match task.status {
            TaskStatus::Failed => task.error,
            _ => None,
        };

        Self {
            task_id: task.id,
            status: task.status,
            progress: task.progress,
            message: task.message,
            estimated_time,
            original_filename: task.original_filename,
            file_size: task.file_size,
            completion,
            error,
        }
    }
}

/// Download path for a task's output
pub fn download_url(task_id: &str) -> String {
    format!("/api/download/{}", task_id)
}

/// One entry of GET /tasks
#[derive(Debug, Serialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub progress: u8,
    pub original_filename: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_improvement: Option<f64>,
}

impl From<Task> for TaskSummary {
    fn from(task: Task) -> Self {
        let main_improvement = match task.status {
            TaskStatus::Completed => task.quality_scores.as_ref().map(|q| q.main_improvement),
            _ => None,
        };
        Self {
            task_id: task.id,
            status: task.status,
            progress: task.progress,
            original_filename: task.original_filename,
            start_time: task.start_time,
            main_improvement,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskSummary>,
}

/// GET /status/{task_id}
pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let task = state
        .store
        .get(&task_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Task {}", task_id)))?;

    Ok(Json(StatusResponse::from_task(task, time::now())))
}

/// Attachment name for a task's output: `{original-stem}_separated.wav`
pub fn download_filename(original_filename: &str) -> String {
    let stem = std::path::Path::new(original_filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .map(sanitize_filename)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "audio".to_string());
    format!("{}_separated.wav", stem)
}

/// GET /download/{task_id}
pub async fn download(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> ApiResult<Response> {
    let task = state
        .store
        .get(&task_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("Task {}", task_id)))?;

    if task.status != TaskStatus::Completed {
        return Err(ApiError::BadRequest(format!(
            "Task {} is not completed (status: {})",
            task_id, task.status
        )));
    }

    let output_file = task
        .output_file
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Result file".to_string()))?;

    let file = match tokio::fs::File::open(output_file).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("Result file".to_string()))
        }
        Err(e) => return Err(e.into()),
    };
    let length = file.metadata().await?.len();

    let disposition = format!(
        "attachment; filename=\"{}\"",
        download_filename(&task.original_filename)
    );

    Ok((
        [
            (header::CONTENT_TYPE, "audio/wav".to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// GET /tasks
pub async fn list_tasks(State(state): State<AppState>) -> Json<TaskListResponse> {
    let tasks = state
        .store
        .list()
        .await
        .into_iter()
        .map(TaskSummary::from)
        .collect();

    Json(TaskListResponse { tasks })
}

/// Build task routes
pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/status/:task_id", get(get_status))
        .route("/download/:task_id", get(download))
        .route("/tasks", get(list_tasks))
}
