//! Configuration loading and resolution
//!
//! Every setting is resolved independently in this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! Tiers 1 and 2 arrive together as [`ConfigOverrides`] (the binary's argument
//! parser reads both), tier 3 as an optional [`TomlConfig`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default listen address
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";

/// Default upload directory (relative to the working directory)
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Default result directory (relative to the working directory)
pub const DEFAULT_RESULT_DIR: &str = "results";

/// Default maximum upload size: 50 MiB
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Default length of the separation model's label (conditioning) vector
pub const DEFAULT_LABEL_COUNT: usize = 20;

/// Default number of concurrent task workers
pub const DEFAULT_WORKERS: usize = 2;

/// Default interval between retention sweeps: 1 hour
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Default tracing filter directive
pub const DEFAULT_LOG_LEVEL: &str = "ssep_server=info,tower_http=info";

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// On-disk TOML configuration. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    pub bind_addr: Option<String>,
    pub upload_dir: Option<PathBuf>,
    pub result_dir: Option<PathBuf>,
    pub max_file_size: Option<u64>,
    pub model_path: Option<PathBuf>,
    pub quality_model_path: Option<PathBuf>,
    pub label_count: Option<usize>,
    pub workers: Option<usize>,
    pub sweep_interval_secs: Option<u64>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub bind_addr: Option<String>,
    pub upload_dir: Option<PathBuf>,
    pub result_dir: Option<PathBuf>,
    pub max_file_size: Option<u64>,
    pub model_path: Option<PathBuf>,
    pub quality_model_path: Option<PathBuf>,
    pub label_count: Option<usize>,
    pub workers: Option<usize>,
    pub sweep_interval_secs: Option<u64>,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub bind_addr: SocketAddr,
    pub upload_dir: PathBuf,
    pub result_dir: PathBuf,
    /// Maximum accepted upload size in bytes
    pub max_file_size: u64,
    /// Separation model (ONNX). Required by the binary, optional for tests.
    pub model_path: Option<PathBuf>,
    /// Quality model (ONNX). When absent every score comes from the heuristic tier.
    pub quality_model_path: Option<PathBuf>,
    pub label_count: usize,
    pub workers: usize,
    pub sweep_interval: Duration,
    pub logging: LoggingConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            upload_dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
            result_dir: PathBuf::from(DEFAULT_RESULT_DIR),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            model_path: None,
            quality_model_path: None,
            label_count: DEFAULT_LABEL_COUNT,
            workers: DEFAULT_WORKERS,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            logging: LoggingConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Merge the configuration tiers field by field, then validate.
    pub fn resolve(overrides: ConfigOverrides, toml: Option<TomlConfig>) -> Result<Self> {
        let toml = toml.unwrap_or_default();

        let bind_addr = overrides
            .bind_addr
            .or(toml.bind_addr)
            .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr: SocketAddr = bind_addr
            .parse()
            .map_err(|e| Error::Config(format!("Invalid bind address '{}': {}", bind_addr, e)))?;

        let config = Self {
            bind_addr,
            upload_dir: overrides
                .upload_dir
                .or(toml.upload_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            result_dir: overrides
                .result_dir
                .or(toml.result_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RESULT_DIR)),
            max_file_size: overrides
                .max_file_size
                .or(toml.max_file_size)
                .unwrap_or(DEFAULT_MAX_FILE_SIZE),
            model_path: overrides.model_path.or(toml.model_path),
            quality_model_path: overrides.quality_model_path.or(toml.quality_model_path),
            label_count: overrides
                .label_count
                .or(toml.label_count)
                .unwrap_or(DEFAULT_LABEL_COUNT),
            workers: overrides.workers.or(toml.workers).unwrap_or(DEFAULT_WORKERS),
            sweep_interval: Duration::from_secs(
                overrides
                    .sweep_interval_secs
                    .or(toml.sweep_interval_secs)
                    .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS),
            ),
            logging: toml.logging,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(Error::Config("max_file_size must be greater than 0".to_string()));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.label_count == 0 {
            return Err(Error::Config("label_count must be at least 1".to_string()));
        }
        if self.sweep_interval.is_zero() {
            return Err(Error::Config("sweep_interval_secs must be greater than 0".to_string()));
        }
        Ok(())
    }

    /// Create the upload and result directories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        ensure_directory(&self.upload_dir)?;
        ensure_directory(&self.result_dir)?;
        Ok(())
    }
}

/// Locate the TOML config file for the platform
///
/// Linux checks `~/.config/ssep/config.toml` first, then `/etc/ssep/config.toml`.
/// Returns `None` when no file exists; a missing file is not an error.
pub fn default_config_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("ssep").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/ssep/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Read and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Create a directory (and parents) if it does not exist yet
pub fn ensure_directory(path: &Path) -> Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
        tracing::info!(path = %path.display(), "Created directory");
    }
    Ok(())
}
