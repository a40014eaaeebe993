//! POST /upload
//!
//! Receives the multipart field `audio_file`, streams it to a staging file
//! under the upload directory while enforcing the size limit, and hands it
//! to the scheduler.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::{ApiError, ApiResult};
use crate::models::{TaskId, TaskStatus};
use crate::services::scheduler::DEFAULT_EXTENSION;
use crate::AppState;

/// Multipart field carrying the audio file
pub const UPLOAD_FIELD: &str = "audio_file";

/// Accepted file extensions (lowercase)
pub const ALLOWED_EXTENSIONS: [&str; 5] = ["wav", "mp3", "flac", "ogg", "m4a"];

/// Multipart framing allowance on top of the file size limit
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub message: String,
    pub file_size: u64,
    pub original_filename: String,
}

/// Lowercased extension after the last '.', if any
fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

/// Whether `filename` carries one of [`ALLOWED_EXTENSIONS`]
pub fn allowed_file(filename: &str) -> bool {
    extension_of(filename)
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

/// Reduce a client-supplied filename to a safe basename
///
/// Drops any directory part, turns whitespace into `_`, keeps only
/// `[A-Za-z0-9._-]` and trims leading/trailing `.` and `_`.
pub fn sanitize_filename(filename: &str) -> String {
    let basename = filename.rsplit(['/', '\\']).next().unwrap_or("");

    let cleaned: String = basename
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();

    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Extension to store the upload under
///
/// Prefers the sanitized name, then the raw name, then `wav`.
pub fn storage_extension(sanitized: &str, raw: &str) -> String {
    extension_of(sanitized)
        .filter(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
        .or_else(|| extension_of(raw))
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

fn multipart_error(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(e.body_text())
    } else {
        ApiError::BadRequest(format!("Failed to read upload: {}", e.body_text()))
    }
}

/// POST /upload
pub async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    let max_file_size = state.config.max_file_size;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let raw_filename = field.file_name().unwrap_or("").to_string();
        if raw_filename.is_empty() {
            return Err(ApiError::BadRequest("No file selected".to_string()));
        }
        if !allowed_file(&raw_filename) {
            return Err(ApiError::BadRequest(format!(
                "Unsupported file format. Supported formats: {}",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        let filename = sanitize_filename(&raw_filename);
        let extension = storage_extension(&filename, &raw_filename);
        let staging = state.scheduler.layout().staging_path(&extension);

        let file_size = match stream_to_file(&mut field, &staging, max_file_size).await {
            Ok(size) => size,
            Err(e) => {
                discard(&staging).await;
                return Err(e);
            }
        };

        debug!(filename = %raw_filename, file_size = file_size, "Upload received");

        let task_id = match state.scheduler.submit(&staging, &raw_filename, file_size).await {
            Ok(task_id) => task_id,
            Err(e) => {
                discard(&staging).await;
                return Err(ApiError::Internal(e.to_string()));
            }
        };

        return Ok(Json(UploadResponse {
            task_id,
            status: TaskStatus::Queued,
            message: "File uploaded, processing will start shortly".to_string(),
            file_size,
            original_filename: filename,
        }));
    }

    Err(ApiError::BadRequest(format!(
        "No file part named '{}' in request",
        UPLOAD_FIELD
    )))
}

async fn stream_to_file(
    field: &mut axum::extract::multipart::Field<'_>,
    path: &Path,
    max_file_size: u64,
) -> ApiResult<u64> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written: u64 = 0;

    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        written += chunk.len() as u64;
        if written > max_file_size {
            return Err(ApiError::PayloadTooLarge(format!(
                "File exceeds maximum size of {} MB",
                max_file_size / (1024 * 1024)
            )));
        }
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(written)
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove staged upload");
        }
    }
}

/// Build upload routes
pub fn upload_routes(max_file_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(body_limit))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_file() {
        assert!(allowed_file("speech.wav"));
        assert!(allowed_file("Speech.MP3"));
        assert!(allowed_file("a.b.flac"));
        assert!(allowed_file("clip.ogg"));
        assert!(allowed_file("clip.m4a"));
        assert!(!allowed_file("notes.txt"));
        assert!(!allowed_file("wav"));
        assert!(!allowed_file("trailing."));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("my file.wav"), "my_file.wav");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\talk.mp3"), "talk.mp3");
        assert_eq!(sanitize_filename("..hidden.flac"), "hidden.flac");
        assert_eq!(sanitize_filename("录音.wav"), "wav");
    }

    #[test]
    fn test_storage_extension_fallbacks() {
        assert_eq!(storage_extension("talk.flac", "talk.flac"), "flac");
        // Sanitizing "录音.wav" leaves "wav" with no dot
        assert_eq!(storage_extension("wav", "录音.wav"), "wav");
        assert_eq!(storage_extension("x.MP3", "x.MP3"), "mp3");
        assert_eq!(storage_extension("", ""), "wav");
    }
}
