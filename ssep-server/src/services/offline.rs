//! Single-file separation without the task queue
//!
//! Decodes one file, normalizes it, runs the separator and writes
//! `{stem}_pred.wav` into the output directory. Used by the binary's
//! `separate` subcommand.

use crate::audio::{decode_audio_file, write_wav, AudioPreprocessor};
use crate::inference::{InferenceError, ModelContext};
use crate::services::pipeline::ProcessingError;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Outcome of one offline separation
#[derive(Debug, Clone)]
pub struct SeparationSummary {
    pub output_file: PathBuf,
    /// Seconds of normalized input audio
    pub audio_duration: f64,
    /// Wall time spent in the separation model
    pub inference_time: Duration,
}

impl SeparationSummary {
    /// Audio seconds processed per second of inference
    pub fn realtime_factor(&self) -> f64 {
        let seconds = self.inference_time.as_secs_f64();
        if seconds > 0.0 {
            self.audio_duration / seconds
        } else {
            f64::INFINITY
        }
    }
}

/// `{output_dir}/{input stem}_pred.wav`
pub fn prediction_path(input: &Path, output_dir: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("audio");
    output_dir.join(format!("{}_pred.wav", stem))
}

/// Separate `input` and write the prediction under `output_dir`
///
/// Blocking; the output directory is created if missing.
pub fn separate_file(
    models: &ModelContext,
    input: &Path,
    output_dir: &Path,
) -> Result<SeparationSummary, ProcessingError> {
    let separator = models
        .separator
        .clone()
        .ok_or(ProcessingError::ModelUnavailable)?;

    let decoded = decode_audio_file(input)?;
    debug!(
        input = %input.display(),
        sample_rate = decoded.sample_rate,
        channels = decoded.channel_count(),
        "Input decoded"
    );

    let mixture = AudioPreprocessor::default().normalize(decoded)?;
    let audio_duration = mixture.duration_seconds();

    let started = Instant::now();
    let predicted = separator.separate(&mixture, &models.conditioning_vector())?;
    let inference_time = started.elapsed();

    if predicted.channel_count() != 2 {
        return Err(InferenceError::InvalidOutput(format!(
            "expected 2 output channels, got {}",
            predicted.channel_count()
        ))
        .into());
    }

    std::fs::create_dir_all(output_dir).map_err(|source| ProcessingError::FileSystem {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let output_file = prediction_path(input, output_dir);
    write_wav(&output_file, &predicted)
        .map_err(|e| ProcessingError::output_write(&output_file, e))?;

    let summary = SeparationSummary {
        output_file,
        audio_duration,
        inference_time,
    };

    info!(
        output = %summary.output_file.display(),
        audio_duration = summary.audio_duration,
        inference_ms = summary.inference_time.as_millis() as u64,
        realtime_factor = summary.realtime_factor(),
        "Offline separation complete"
    );

    Ok(summary)
}
