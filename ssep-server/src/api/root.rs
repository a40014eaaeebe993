//! Service descriptor at GET /

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::api::upload::ALLOWED_EXTENSIONS;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ServiceDescriptor {
    pub service: String,
    pub status: String,
    pub version: String,
    pub endpoints: BTreeMap<&'static str, &'static str>,
    pub supported_formats: Vec<&'static str>,
    pub max_file_size_mb: u64,
}

/// GET /
pub async fn describe(State(state): State<AppState>) -> Json<ServiceDescriptor> {
    let endpoints = BTreeMap::from([
        ("health", "/api/health"),
        ("upload", "/api/upload (POST)"),
        ("status", "/api/status/{task_id}"),
        ("download", "/api/download/{task_id}"),
        ("tasks", "/api/tasks"),
        ("docs", "/docs"),
    ]);

    Json(ServiceDescriptor {
        service: "Speech Separation API".to_string(),
        status: "running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        endpoints,
        supported_formats: ALLOWED_EXTENSIONS.to_vec(),
        max_file_size_mb: state.config.max_file_size / (1024 * 1024),
    })
}

pub fn root_routes() -> Router<AppState> {
    Router::new().route("/", get(describe))
}
