//! API documentation page at GET /docs

use axum::{
    extract::State,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use ssep_common::time;

use crate::api::upload::{ALLOWED_EXTENSIONS, UPLOAD_FIELD};
use crate::AppState;

/// GET /docs
pub async fn docs_page(State(state): State<AppState>) -> impl IntoResponse {
    Html(render_docs(
        state.config.max_file_size / (1024 * 1024),
        &time::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    ))
}

/// HTML describing every endpoint, the quality metrics and the workflow
pub fn render_docs(max_file_size_mb: u64, generated_at: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Speech Separation API</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; line-height: 1.6; }}
        h1, h2 {{ color: #333; }}
        .endpoint {{ background: #f4f4f4; padding: 15px; margin: 10px 0; border-radius: 5px; }}
        .method {{ color: #fff; padding: 3px 8px; border-radius: 3px; font-weight: bold; }}
        .get {{ background: #61affe; }}
        .post {{ background: #49cc90; }}
        code {{ background: #f1f1f1; padding: 2px 4px; border-radius: 3px; }}
    </style>
</head>
<body>
    <h1>Speech Separation API</h1>

    <h2>Endpoints</h2>

    <div class="endpoint">
        <h3><span class="method get">GET</span> /api/health</h3>
        <p>Service status, model availability and compute device.</p>
        <code>curl http://localhost:5000/api/health</code>
    </div>

    <div class="endpoint">
        <h3><span class="method post">POST</span> /api/upload</h3>
        <p>Upload an audio file as the multipart field <code>{field}</code>.</p>
        <p>Formats: {formats}. Maximum size: {max_mb} MB.</p>
        <p>Returns the task id; processing starts in the background.</p>
        <code>curl -X POST -F "{field}=@speech.wav" http://localhost:5000/api/upload</code>
    </div>

    <div class="endpoint">
        <h3><span class="method get">GET</span> /api/status/&lt;task_id&gt;</h3>
        <p>Progress, state and, once completed, the quality scores.</p>
        <code>curl http://localhost:5000/api/status/your-task-id</code>
    </div>

    <div class="endpoint">
        <h3><span class="method get">GET</span> /api/download/&lt;task_id&gt;</h3>
        <p>The separated audio as a WAV attachment.</p>
        <code>curl -OJ http://localhost:5000/api/download/your-task-id</code>
    </div>

    <div class="endpoint">
        <h3><span class="method get">GET</span> /api/tasks</h3>
        <p>All known tasks with their state (diagnostic).</p>
    </div>

    <h2>Quality metrics</h2>
    <ul>
        <li><strong>MOS</strong>: mean opinion score (1-5)</li>
        <li><strong>STOI</strong>: short-time objective intelligibility (0-1)</li>
        <li><strong>PESQ</strong>: perceptual speech quality (1-4.5)</li>
        <li><strong>SI-SDR</strong>: scale-invariant signal-to-distortion ratio (dB)</li>
    </ul>

    <h2>Workflow</h2>
    <ol>
        <li>Upload a file to <code>/api/upload</code></li>
        <li>Keep the returned task id</li>
        <li>Poll <code>/api/status/&lt;task_id&gt;</code></li>
        <li>Download from <code>/api/download/&lt;task_id&gt;</code> once completed</li>
    </ol>

    <p><em>Generated {generated_at}</em></p>
</body>
</html>
"#,
        field = UPLOAD_FIELD,
        formats = ALLOWED_EXTENSIONS.join(", "),
        max_mb = max_file_size_mb,
        generated_at = generated_at,
    )
}

pub fn docs_routes() -> Router<AppState> {
    Router::new().route("/docs", get(docs_page))
}
