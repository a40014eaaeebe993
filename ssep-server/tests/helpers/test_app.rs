//! Application harness backed by temporary directories

use ssep_common::ServiceConfig;
use ssep_server::inference::{ModelContext, SeparationModel};
use ssep_server::models::Task;
use ssep_server::services::{TaskStore, WorkerPool};
use ssep_server::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub const BOUNDARY: &str = "----ssep-test-boundary";

pub struct TestApp {
    pub state: AppState,
    pub pool: Option<WorkerPool>,
    pub token: CancellationToken,
    pub temp_dir: TempDir,
}

impl TestApp {
    /// Start with the given models and default limits
    pub fn start(models: ModelContext) -> Self {
        Self::start_with(models, |_| {})
    }

    /// Start with a separator and no quality model
    pub fn with_separator(separator: impl SeparationModel + 'static) -> Self {
        Self::start(ModelContext::new(Some(Arc::new(separator)), None))
    }

    /// Start after adjusting the configuration
    pub fn start_with(models: ModelContext, configure: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp_dir = TempDir::new().expect("temp dir");
        let mut config = ServiceConfig {
            upload_dir: temp_dir.path().join("uploads"),
            result_dir: temp_dir.path().join("results"),
            ..ServiceConfig::default()
        };
        configure(&mut config);
        config.ensure_directories().expect("directories");

        let token = CancellationToken::new();
        let (state, pool) = AppState::start(config, Arc::new(models), token.clone());

        Self {
            state,
            pool: Some(pool),
            token,
            temp_dir,
        }
    }

    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    pub fn store(&self) -> &TaskStore {
        &self.state.store
    }

    pub fn upload_dir(&self) -> PathBuf {
        self.state.config.upload_dir.clone()
    }

    pub fn result_dir(&self) -> PathBuf {
        self.state.config.result_dir.clone()
    }

    /// Path inside the temporary directory, outside the service directories
    pub fn fixture_path(&self, name: &str) -> PathBuf {
        self.temp_dir.path().join(name)
    }

    pub async fn shutdown(mut self) {
        if let Some(pool) = self.pool.take() {
            pool.shutdown().await;
        }
    }
}

/// Build a multipart body with one file field
pub fn multipart_body(field: &str, filename: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, filename
        )
        .as_bytes(),
    );
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={}", BOUNDARY)
}

/// Poll the store until the task reaches a terminal state
pub async fn wait_for_terminal(store: &TaskStore, task_id: &str, timeout: Duration) -> Task {
    tokio::time::timeout(timeout, async {
        loop {
            if let Some(task) = store.get(task_id).await {
                if task.status.is_terminal() {
                    return task;
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("task did not finish in time")
}
