//! Model inference
//!
//! The separation and quality models sit behind traits so the pipeline can run
//! against ONNX models in production and against in-process doubles in tests.
//! Both are loaded once at startup into a shared [`ModelContext`].

pub mod onnx;

use crate::audio::Waveform;
use serde::Serialize;
use ssep_common::ServiceConfig;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

pub use onnx::{OnnxQualityModel, OnnxSeparator};

/// Inference errors
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Failed to load model {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("Model execution failed: {0}")]
    Execution(String),

    #[error("Unexpected model output: {0}")]
    InvalidOutput(String),
}

/// Audio-to-audio separation model
pub trait SeparationModel: Send + Sync {
    /// Length of the conditioning vector the model expects
    fn label_count(&self) -> usize;

    /// Separate a stereo 44.1 kHz mixture
    ///
    /// `labels` is the conditioning vector; its length equals
    /// [`Self::label_count`]. The result must be stereo at the input rate.
    fn separate(&self, mixture: &Waveform, labels: &[f32]) -> Result<Waveform, InferenceError>;
}

/// Raw objective scores produced by a quality model
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectiveScores {
    pub stoi: f64,
    pub pesq: f64,
    pub si_sdr: f64,
}

/// Reference-free speech quality model (16 kHz mono input)
pub trait QualityModel: Send + Sync {
    fn evaluate(&self, samples: &[f32], sample_rate: u32) -> Result<ObjectiveScores, InferenceError>;
}

/// Where inference runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionDevice {
    Cpu,
}

impl ExecutionDevice {
    pub fn is_gpu(&self) -> bool {
        false
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionDevice::Cpu => "cpu",
        }
    }
}

/// Models shared read-only by every worker
pub struct ModelContext {
    pub separator: Option<Arc<dyn SeparationModel>>,
    pub quality: Option<Arc<dyn QualityModel>>,
    pub device: ExecutionDevice,
    label_count: usize,
}

impl ModelContext {
    /// Build a context from already constructed models
    pub fn new(
        separator: Option<Arc<dyn SeparationModel>>,
        quality: Option<Arc<dyn QualityModel>>,
    ) -> Self {
        let label_count = separator
            .as_ref()
            .map(|s| s.label_count())
            .unwrap_or(ssep_common::config::DEFAULT_LABEL_COUNT);

        Self {
            separator,
            quality,
            device: ExecutionDevice::Cpu,
            label_count,
        }
    }

    /// Context with no models at all; every task fails at the loading stage
    pub fn empty() -> Self {
        Self::new(None, None)
    }

    /// Load the ONNX models named in the configuration
    ///
    /// The separation model is required. A quality model that fails to load
    /// only degrades scoring to the heuristic tier.
    pub fn load(config: &ServiceConfig) -> Result<Self, InferenceError> {
        let model_path = config.model_path.clone().ok_or_else(|| InferenceError::Load {
            path: PathBuf::new(),
            message: "no separation model path configured".to_string(),
        })?;

        let separator = OnnxSeparator::load(&model_path, config.label_count)?;
        info!(
            path = %model_path.display(),
            label_count = config.label_count,
            "Separation model loaded"
        );

        let quality: Option<Arc<dyn QualityModel>> = match &config.quality_model_path {
            Some(path) => match OnnxQualityModel::load(path) {
                Ok(model) => {
                    info!(path = %path.display(), "Quality model loaded");
                    Some(Arc::new(model))
                }
                Err(e) => {
                    warn!(error = %e, "Quality model unavailable, using heuristic scoring");
                    None
                }
            },
            None => {
                info!("No quality model configured, using heuristic scoring");
                None
            }
        };

        Ok(Self::new(Some(Arc::new(separator)), quality))
    }

    pub fn is_loaded(&self) -> bool {
        self.separator.is_some()
    }

    /// All-ones conditioning vector of the separator's label length
    pub fn conditioning_vector(&self) -> Vec<f32> {
        vec![1.0; self.label_count]
    }
}
