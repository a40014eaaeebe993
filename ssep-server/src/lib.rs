//! ssep-server library interface
//!
//! Speech separation service: uploads are queued as tasks, a worker pool runs
//! each through decode → normalize → separation → quality scoring → WAV
//! output, and clients poll for status and download the result.

pub mod api;
pub mod audio;
pub mod error;
pub mod inference;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use ssep_common::ServiceConfig;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::inference::ModelContext;
use crate::services::{
    RetentionPolicy, RetentionSweeper, StorageLayout, TaskScheduler, TaskStore, WorkerPool,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Submission handle for the worker pool
    pub scheduler: TaskScheduler,
    /// Task registry
    pub store: TaskStore,
    /// Loaded models (read-only)
    pub models: Arc<ModelContext>,
    pub config: Arc<ServiceConfig>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Create the task store and start the worker pool
    ///
    /// Must be called inside a Tokio runtime. Cancelling `token` stops the
    /// workers; call [`WorkerPool::shutdown`] to wait for them.
    pub fn start(
        config: ServiceConfig,
        models: Arc<ModelContext>,
        token: CancellationToken,
    ) -> (Self, WorkerPool) {
        let store = TaskStore::new();
        let layout = StorageLayout::new(&config.upload_dir, &config.result_dir);
        let (scheduler, pool) =
            TaskScheduler::start(store.clone(), Arc::clone(&models), layout, config.workers, token);

        let state = Self {
            scheduler,
            store,
            models,
            config: Arc::new(config),
            startup_time: Utc::now(),
        };

        (state, pool)
    }

    /// Retention sweeper over this state's store and directories
    pub fn retention_sweeper(&self) -> RetentionSweeper {
        let policy = RetentionPolicy {
            interval: self.config.sweep_interval,
            ..RetentionPolicy::default()
        };
        RetentionSweeper::new(
            self.store.clone(),
            &self.config.upload_dir,
            &self.config.result_dir,
            policy,
        )
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .merge(api::upload_routes(state.config.max_file_size))
        .merge(api::task_routes())
        .merge(api::health_routes());

    Router::new()
        .merge(api::root_routes())
        .merge(api::docs_routes())
        .nest("/api", api)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
