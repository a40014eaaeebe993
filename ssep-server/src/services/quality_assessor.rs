//! Reference-free speech quality scoring
//!
//! Scoring runs through three tiers and never fails outward:
//!
//! 1. **Model**: the quality model on 16 kHz mono input, with guards for
//!    silent, short and clipping signals. MOS is derived as `1 + 3.5·STOI`.
//! 2. **Heuristic**: energy, dynamic range and spectral balance mapped onto
//!    the metric ranges. Used whenever the model tier returns an error.
//! 3. **Neutral**: fixed mid-range scores when the heuristic cannot run.

use crate::audio::{resample, ResampleError, Waveform, QUALITY_SAMPLE_RATE};
use crate::inference::{InferenceError, QualityModel};
use crate::models::{round_to, QualityScoreSet};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Minimum signal length handed to the quality model: 0.5 s at 16 kHz
pub const MIN_MODEL_SAMPLES: usize = (QUALITY_SAMPLE_RATE / 2) as usize;

const EPSILON: f64 = 1e-8;

/// Scores returned for an all-zero signal
pub const SILENT_SCORES: QualityScoreSet = QualityScoreSet {
    stoi: 0.0,
    pesq: 1.0,
    si_sdr: 0.0,
    mos: 1.0,
};

/// Scores returned when no tier could evaluate the signal
pub const NEUTRAL_SCORES: QualityScoreSet = QualityScoreSet {
    stoi: 0.5,
    pesq: 2.0,
    si_sdr: 5.0,
    mos: 2.5,
};

/// Why a scoring tier could not produce a result
#[derive(Debug, Error)]
pub enum QualityError {
    #[error("Quality model not loaded")]
    ModelUnavailable,

    #[error("Quality model failed: {0}")]
    Model(#[from] InferenceError),

    #[error("Resampling for quality model failed: {0}")]
    Resample(#[from] ResampleError),

    #[error("Signal is empty")]
    EmptySignal,

    #[error("Score is not a finite number")]
    NonFinite,
}

/// Which tier produced a score set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringTier {
    Model,
    /// All-zero input short-circuited before the model
    Silence,
    Heuristic,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityAssessment {
    pub scores: QualityScoreSet,
    pub tier: ScoringTier,
}

/// Scores waveforms with the quality model when available
#[derive(Clone, Default)]
pub struct QualityAssessor {
    model: Option<Arc<dyn QualityModel>>,
}

impl QualityAssessor {
    pub fn new(model: Option<Arc<dyn QualityModel>>) -> Self {
        Self { model }
    }

    /// Score a waveform at any rate and channel layout
    pub fn score(&self, waveform: &Waveform) -> QualityScoreSet {
        self.assess(waveform).scores
    }

    /// Score a waveform, reporting the tier used
    pub fn assess(&self, waveform: &Waveform) -> QualityAssessment {
        let primary = match self.model_scores(waveform) {
            Ok(assessment) => return assessment,
            Err(e) => e,
        };

        match primary {
            QualityError::ModelUnavailable => {
                debug!("No quality model, using heuristic scoring")
            }
            ref e => warn!(error = %e, "Quality model scoring failed, using heuristic scoring"),
        }

        match heuristic_scores(waveform) {
            Ok(scores) => QualityAssessment {
                scores,
                tier: ScoringTier::Heuristic,
            },
            Err(e) => {
                warn!(error = %e, "Heuristic scoring failed, using neutral scores");
                QualityAssessment {
                    scores: NEUTRAL_SCORES,
                    tier: ScoringTier::Neutral,
                }
            }
        }
    }

    fn model_scores(&self, waveform: &Waveform) -> Result<QualityAssessment, QualityError> {
        let resampled = resample(waveform, QUALITY_SAMPLE_RATE)?;
        let mut samples = resampled.mono_mix();

        if samples.iter().all(|&s| s == 0.0) {
            debug!("Silent signal, skipping quality model");
            return Ok(QualityAssessment {
                scores: SILENT_SCORES,
                tier: ScoringTier::Silence,
            });
        }

        let model = self.model.as_ref().ok_or(QualityError::ModelUnavailable)?;

        if samples.len() < MIN_MODEL_SAMPLES {
            samples.resize(MIN_MODEL_SAMPLES, 0.0);
        }

        let peak = samples.iter().fold(0.0f32, |peak, s| peak.max(s.abs()));
        if peak > 1.0 {
            for sample in &mut samples {
                *sample /= peak;
            }
        }

        let raw = model.evaluate(&samples, QUALITY_SAMPLE_RATE)?;
        let scores = QualityScoreSet {
            stoi: raw.stoi,
            pesq: raw.pesq,
            si_sdr: raw.si_sdr,
            mos: 1.0 + raw.stoi * 3.5,
        };

        if ![scores.stoi, scores.pesq, scores.si_sdr, scores.mos]
            .iter()
            .all(|v| v.is_finite())
        {
            return Err(QualityError::NonFinite);
        }

        Ok(QualityAssessment {
            scores,
            tier: ScoringTier::Model,
        })
    }
}

/// Signal-statistics estimate of the quality scores, rounded to 3 decimals
///
/// Works on the mono mix at the waveform's own rate.
pub fn heuristic_scores(waveform: &Waveform) -> Result<QualityScoreSet, QualityError> {
    let mono: Vec<f64> = waveform.mono_mix().into_iter().map(f64::from).collect();
    if mono.is_empty() {
        return Err(QualityError::EmptySignal);
    }

    let n = mono.len() as f64;
    let rms = (mono.iter().map(|x| x * x).sum::<f64>() / n).sqrt();
    let peak = mono.iter().fold(0.0f64, |peak, x| peak.max(x.abs()));
    let dynamic_range_db = 20.0 * (peak / (rms + EPSILON)).log10();

    let mut spectrum: Vec<Complex<f64>> = mono.iter().map(|&x| Complex::new(x, 0.0)).collect();
    FftPlanner::<f64>::new()
        .plan_fft_forward(spectrum.len())
        .process(&mut spectrum);

    let total_energy: f64 = spectrum.iter().map(|c| c.norm_sqr()).sum();
    let high_freq_start = spectrum.len() / 4;
    let high_freq_energy: f64 = spectrum[high_freq_start..].iter().map(|c| c.norm_sqr()).sum();
    let high_freq_ratio = high_freq_energy / (total_energy + EPSILON);

    let energy_score = (rms * 10.0).min(1.0);
    let dynamic_score = (dynamic_range_db / 30.0).max(0.0).min(1.0);
    let freq_score = 1.0 - (high_freq_ratio - 0.3).abs();

    let overall = (energy_score + dynamic_score + freq_score) / 3.0;
    if !overall.is_finite() {
        return Err(QualityError::NonFinite);
    }

    debug!(
        rms = rms,
        peak = peak,
        dynamic_range_db = dynamic_range_db,
        high_freq_ratio = high_freq_ratio,
        "Heuristic quality statistics"
    );

    Ok(QualityScoreSet {
        stoi: round_to(overall.clamp(0.1, 0.95), 3),
        pesq: round_to(1.0 + overall * 2.5, 3),
        si_sdr: round_to(-10.0 + overall * 20.0, 3),
        mos: round_to(1.0 + overall * 3.0, 3),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ObjectiveScores;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Records every input and returns fixed scores
    struct RecordingModel {
        calls: AtomicUsize,
        last_input: Mutex<Vec<f32>>,
        result: ObjectiveScores,
    }

    impl RecordingModel {
        fn new(stoi: f64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                last_input: Mutex::new(Vec::new()),
                result: ObjectiveScores {
                    stoi,
                    pesq: 3.1,
                    si_sdr: 12.5,
                },
            }
        }
    }

    impl QualityModel for RecordingModel {
        fn evaluate(&self, samples: &[f32], sample_rate: u32) -> Result<ObjectiveScores, InferenceError> {
            assert_eq!(sample_rate, QUALITY_SAMPLE_RATE);
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_input.lock().unwrap() = samples.to_vec();
            Ok(self.result)
        }
    }

    struct FailingModel;

    impl QualityModel for FailingModel {
        fn evaluate(&self, _samples: &[f32], _sample_rate: u32) -> Result<ObjectiveScores, InferenceError> {
            Err(InferenceError::Execution("simulated failure".to_string()))
        }
    }

    fn sine(frames: usize, sample_rate: u32, amplitude: f32) -> Vec<f32> {
        (0..frames)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_model_tier_derives_mos_from_stoi() {
        let model = Arc::new(RecordingModel::new(0.8));
        let assessor = QualityAssessor::new(Some(model.clone()));
        let waveform = Waveform::mono(sine(16000, 16000, 0.5), 16000);

        let assessment = assessor.assess(&waveform);

        assert_eq!(assessment.tier, ScoringTier::Model);
        assert_eq!(assessment.scores.stoi, 0.8);
        assert_eq!(assessment.scores.pesq, 3.1);
        assert_eq!(assessment.scores.si_sdr, 12.5);
        assert_eq!(assessment.scores.mos, 1.0 + 0.8 * 3.5);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_silent_signal_skips_model() {
        let model = Arc::new(RecordingModel::new(0.8));
        let assessor = QualityAssessor::new(Some(model.clone()));
        let waveform = Waveform::new(vec![vec![0.0; 44100], vec![0.0; 44100]], 44100);

        let assessment = assessor.assess(&waveform);

        assert_eq!(assessment.tier, ScoringTier::Silence);
        assert_eq!(assessment.scores, SILENT_SCORES);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_silent_signal_without_model() {
        let assessor = QualityAssessor::default();
        let waveform = Waveform::mono(vec![0.0; 1600], 16000);

        assert_eq!(assessor.assess(&waveform).tier, ScoringTier::Silence);
    }

    #[test]
    fn test_short_signal_is_padded() {
        let model = Arc::new(RecordingModel::new(0.5));
        let assessor = QualityAssessor::new(Some(model.clone()));
        let waveform = Waveform::mono(sine(1600, 16000, 0.5), 16000);

        assessor.assess(&waveform);

        let input = model.last_input.lock().unwrap();
        assert_eq!(input.len(), MIN_MODEL_SAMPLES);
        assert!(input[1600..].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_loud_signal_is_peak_normalized() {
        let model = Arc::new(RecordingModel::new(0.5));
        let assessor = QualityAssessor::new(Some(model.clone()));
        let waveform = Waveform::mono(sine(16000, 16000, 4.0), 16000);

        assessor.assess(&waveform);

        let input = model.last_input.lock().unwrap();
        let peak = input.iter().fold(0.0f32, |p, s| p.max(s.abs()));
        assert!((peak - 1.0).abs() < 1e-6, "peak {}", peak);
    }

    #[test]
    fn test_stereo_input_is_resampled_and_downmixed() {
        let model = Arc::new(RecordingModel::new(0.5));
        let assessor = QualityAssessor::new(Some(model.clone()));
        let waveform = Waveform::new(vec![sine(44100, 44100, 0.3), sine(44100, 44100, 0.3)], 44100);

        assessor.assess(&waveform);

        let frames = model.last_input.lock().unwrap().len() as i64;
        assert!((frames - 16000).abs() < 500, "got {} samples", frames);
    }

    #[test]
    fn test_model_failure_falls_back_to_heuristic() {
        let assessor = QualityAssessor::new(Some(Arc::new(FailingModel)));
        let waveform = Waveform::mono(sine(16000, 16000, 0.5), 16000);

        let assessment = assessor.assess(&waveform);

        assert_eq!(assessment.tier, ScoringTier::Heuristic);
        assert_eq!(assessment.scores, heuristic_scores(&waveform).unwrap());
    }

    #[test]
    fn test_missing_model_falls_back_to_heuristic() {
        let assessor = QualityAssessor::default();
        let waveform = Waveform::mono(sine(8000, 16000, 0.5), 16000);

        assert_eq!(assessor.assess(&waveform).tier, ScoringTier::Heuristic);
    }

    #[test]
    fn test_empty_signal_counts_as_silent() {
        let assessor = QualityAssessor::new(Some(Arc::new(FailingModel)));
        let waveform = Waveform::new(vec![Vec::new(), Vec::new()], 44100);

        assert_eq!(assessor.assess(&waveform).tier, ScoringTier::Silence);
        assert!(matches!(heuristic_scores(&waveform), Err(QualityError::EmptySignal)));
    }

    #[test]
    fn test_unscorable_signal_gets_neutral_scores() {
        let assessor = QualityAssessor::new(Some(Arc::new(FailingModel)));
        // Zero sample rate fails resampling, and there is nothing to analyse
        let waveform = Waveform::new(Vec::new(), 0);

        let assessment = assessor.assess(&waveform);

        assert_eq!(assessment.tier, ScoringTier::Neutral);
        assert_eq!(assessment.scores, NEUTRAL_SCORES);
    }

    #[test]
    fn test_heuristic_scores_are_in_range_and_rounded() {
        let waveform = Waveform::mono(sine(44100, 44100, 0.5), 44100);

        let scores = heuristic_scores(&waveform).unwrap();

        assert!((0.1..=0.95).contains(&scores.stoi));
        assert!((1.0..=3.5).contains(&scores.pesq));
        assert!((-10.0..=10.0).contains(&scores.si_sdr));
        assert!((1.0..=4.0).contains(&scores.mos));
        for value in [scores.stoi, scores.pesq, scores.si_sdr, scores.mos] {
            assert_eq!(round_to(value, 3), value);
        }
    }

    #[test]
    fn test_heuristic_low_tone_values() {
        // Full complex spectrum: the mirrored 440 Hz bin sits above n/4,
        // so half the energy counts as high frequency
        let waveform = Waveform::mono(sine(44100, 44100, 0.5), 44100);

        let scores = heuristic_scores(&waveform).unwrap();

        let overall = (1.0 + 3.0103 / 30.0 + (1.0 - 0.2)) / 3.0;
        assert!((scores.mos - (1.0 + overall * 3.0)).abs() < 0.01, "mos {}", scores.mos);
    }

    #[test]
    fn test_heuristic_silence() {
        let waveform = Waveform::mono(vec![0.0; 1000], 16000);

        let scores = heuristic_scores(&waveform).unwrap();

        // energy 0, dynamic 0, freq 1 - |0 - 0.3| = 0.7
        let overall = 0.7 / 3.0;
        assert_eq!(scores.mos, round_to(1.0 + overall * 3.0, 3));
        assert_eq!(scores.stoi, round_to(overall, 3));
    }

    #[test]
    fn test_non_finite_model_output_falls_back() {
        struct NanModel;
        impl QualityModel for NanModel {
            fn evaluate(&self, _: &[f32], _: u32) -> Result<ObjectiveScores, InferenceError> {
                Ok(ObjectiveScores {
                    stoi: f64::NAN,
                    pesq: 2.0,
                    si_sdr: 1.0,
                })
            }
        }

        let assessor = QualityAssessor::new(Some(Arc::new(NanModel)));
        let waveform = Waveform::mono(sine(16000, 16000, 0.5), 16000);

        assert_eq!(assessor.assess(&waveform).tier, ScoringTier::Heuristic);
    }
}
