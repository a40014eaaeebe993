//! In-process model doubles

use ssep_server::audio::Waveform;
use ssep_server::inference::{InferenceError, ObjectiveScores, QualityModel, SeparationModel};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const LABEL_COUNT: usize = 20;

/// Returns the mixture scaled by a constant gain
pub struct ScaledSeparator {
    pub gain: f32,
}

impl Default for ScaledSeparator {
    fn default() -> Self {
        Self { gain: 0.8 }
    }
}

impl SeparationModel for ScaledSeparator {
    fn label_count(&self) -> usize {
        LABEL_COUNT
    }

    fn separate(&self, mixture: &Waveform, labels: &[f32]) -> Result<Waveform, InferenceError> {
        assert_eq!(labels.len(), LABEL_COUNT);
        assert!(labels.iter().all(|&l| l == 1.0));
        let channels = mixture
            .channels
            .iter()
            .map(|c| c.iter().map(|s| s * self.gain).collect())
            .collect();
        Ok(Waveform::new(channels, mixture.sample_rate))
    }
}

/// Always fails during inference
pub struct FailingSeparator {
    pub message: String,
}

impl FailingSeparator {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl SeparationModel for FailingSeparator {
    fn label_count(&self) -> usize {
        LABEL_COUNT
    }

    fn separate(&self, _mixture: &Waveform, _labels: &[f32]) -> Result<Waveform, InferenceError> {
        Err(InferenceError::Execution(self.message.clone()))
    }
}

/// Passthrough that counts calls and tracks peak concurrency
#[derive(Default)]
pub struct CountingSeparator {
    pub calls: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
    pub delay: Duration,
}

impl CountingSeparator {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

impl SeparationModel for CountingSeparator {
    fn label_count(&self) -> usize {
        LABEL_COUNT
    }

    fn separate(&self, mixture: &Waveform, _labels: &[f32]) -> Result<Waveform, InferenceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        std::thread::sleep(self.delay);

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(mixture.clone())
    }
}

/// Passthrough that blocks for a fixed time
pub struct SlowSeparator {
    pub delay: Duration,
}

impl SeparationModel for SlowSeparator {
    fn label_count(&self) -> usize {
        LABEL_COUNT
    }

    fn separate(&self, mixture: &Waveform, _labels: &[f32]) -> Result<Waveform, InferenceError> {
        std::thread::sleep(self.delay);
        Ok(mixture.clone())
    }
}

/// Quality model returning fixed scores
pub struct FixedQualityModel {
    pub scores: ObjectiveScores,
}

impl QualityModel for FixedQualityModel {
    fn evaluate(&self, _samples: &[f32], _sample_rate: u32) -> Result<ObjectiveScores, InferenceError> {
        Ok(self.scores)
    }
}
