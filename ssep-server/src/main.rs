//! ssep-server - Speech separation service
//!
//! Loads the separation model (required) and the quality model (optional),
//! starts the worker pool and the retention sweeper, then serves the HTTP API
//! until Ctrl+C or SIGTERM.
//!
//! `ssep-server separate <input> <output_dir>` separates a single file
//! offline and exits.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ssep_common::config::{default_config_path, load_toml_config, ConfigOverrides};
use ssep_common::ServiceConfig;
use ssep_server::inference::ModelContext;
use ssep_server::services::separate_file;
use ssep_server::AppState;

/// Command-line arguments for ssep-server
#[derive(Parser, Debug)]
#[command(name = "ssep-server")]
#[command(about = "Asynchronous speech separation service")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// TOML config file (default: ~/.config/ssep/config.toml, then /etc/ssep/config.toml)
    #[arg(short, long, env = "SSEP_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address
    #[arg(short, long, env = "SSEP_BIND_ADDR")]
    bind: Option<String>,

    /// Directory for uploaded inputs
    #[arg(long, env = "UPLOAD_FOLDER")]
    upload_dir: Option<PathBuf>,

    /// Directory for separated outputs
    #[arg(long, env = "RESULT_FOLDER")]
    result_dir: Option<PathBuf>,

    /// Maximum upload size in bytes
    #[arg(long, env = "MAX_FILE_SIZE")]
    max_file_size: Option<u64>,

    /// Separation model (ONNX)
    #[arg(short, long, env = "MODEL_PATH")]
    model_path: Option<PathBuf>,

    /// Quality model (ONNX)
    #[arg(long, env = "QUALITY_MODEL_PATH")]
    quality_model_path: Option<PathBuf>,

    /// Length of the separation model's label vector
    #[arg(long, env = "SSEP_LABEL_COUNT")]
    label_count: Option<usize>,

    /// Number of concurrent task workers
    #[arg(short, long, env = "SSEP_WORKERS")]
    workers: Option<usize>,

    /// Seconds between retention sweeps
    #[arg(long, env = "SSEP_SWEEP_INTERVAL")]
    sweep_interval: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Separate one audio file and write `{stem}_pred.wav` (no server)
    Separate {
        /// Input audio file
        input: PathBuf,
        /// Directory for the separated output
        output_dir: PathBuf,
    },
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            bind_addr: self.bind.clone(),
            upload_dir: self.upload_dir.clone(),
            result_dir: self.result_dir.clone(),
            max_file_size: self.max_file_size,
            model_path: self.model_path.clone(),
            quality_model_path: self.quality_model_path.clone(),
            label_count: self.label_count,
            workers: self.workers,
            sweep_interval_secs: self.sweep_interval,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().or_else(default_config_path);
    let toml = config_path
        .as_deref()
        .map(load_toml_config)
        .transpose()
        .context("Failed to load config file")?;
    let config = ServiceConfig::resolve(args.overrides(), toml).context("Invalid configuration")?;

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ssep-server v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &config_path {
        info!("Config file: {}", path.display());
    }
    info!(
        upload_dir = %config.upload_dir.display(),
        result_dir = %config.result_dir.display(),
        max_file_size = config.max_file_size,
        workers = config.workers,
        "Configuration resolved"
    );

    config
        .ensure_directories()
        .context("Failed to create storage directories")?;

    let models = Arc::new(ModelContext::load(&config).context("Failed to load separation model")?);
    info!(device = models.device.as_str(), "Models ready");

    if let Some(Command::Separate { input, output_dir }) = args.command {
        return run_offline(models, input, output_dir).await;
    }

    let bind_addr = config.bind_addr;
    let token = CancellationToken::new();
    let (state, pool) = AppState::start(config, models, token.clone());
    let sweeper = state.retention_sweeper().spawn(token.clone());

    let app = ssep_server::build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/api/health", bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error");

    token.cancel();
    if let Err(e) = sweeper.await {
        warn!(error = %e, "Retention sweeper terminated abnormally");
    }
    pool.shutdown().await;

    info!("Server shutdown complete");
    served
}

/// Separate a single file on the blocking pool and report timing
async fn run_offline(models: Arc<ModelContext>, input: PathBuf, output_dir: PathBuf) -> Result<()> {
    info!(input = %input.display(), "Separating single file");

    let summary = tokio::task::spawn_blocking(move || separate_file(&models, &input, &output_dir))
        .await
        .context("Separation worker failed")??;

    info!(
        "Inference took {:.3}s for {:.1}s of audio ({:.1}x realtime)",
        summary.inference_time.as_secs_f64(),
        summary.audio_duration,
        summary.realtime_factor()
    );
    info!("Saved prediction: {}", summary.output_file.display());
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
