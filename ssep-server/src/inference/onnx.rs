//! ONNX-backed models (tract, CPU)

use super::{InferenceError, ObjectiveScores, QualityModel, SeparationModel};
use crate::audio::Waveform;
use std::path::Path;
use tract_onnx::prelude::*;
use tracing::debug;

type RunnablePlan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

fn load_plan(path: &Path) -> Result<RunnablePlan, InferenceError> {
    let load_error = |e: TractError| InferenceError::Load {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    if !path.exists() {
        return Err(InferenceError::Load {
            path: path.to_path_buf(),
            message: "file not found".to_string(),
        });
    }

    tract_onnx::onnx()
        .model_for_path(path)
        .map_err(load_error)?
        .into_optimized()
        .map_err(load_error)?
        .into_runnable()
        .map_err(load_error)
}

fn execution_error(e: TractError) -> InferenceError {
    InferenceError::Execution(e.to_string())
}

/// Separation model taking `[1, 2, n]` audio plus a `[1, L]` label vector
/// and returning `[1, 2, n]` audio
pub struct OnnxSeparator {
    plan: RunnablePlan,
    label_count: usize,
}

impl OnnxSeparator {
    pub fn load(path: &Path, label_count: usize) -> Result<Self, InferenceError> {
        let plan = load_plan(path)?;
        Ok(Self { plan, label_count })
    }
}

impl SeparationModel for OnnxSeparator {
    fn label_count(&self) -> usize {
        self.label_count
    }

    fn separate(&self, mixture: &Waveform, labels: &[f32]) -> Result<Waveform, InferenceError> {
        let frames = mixture.frames();
        let channels = mixture.channel_count();

        let planar: Vec<f32> = mixture.channels.iter().flatten().copied().collect();
        let audio = Tensor::from_shape(&[1, channels, frames], &planar).map_err(execution_error)?;
        let labels = Tensor::from_shape(&[1, labels.len()], labels).map_err(execution_error)?;

        let outputs = self
            .plan
            .run(tvec!(audio.into(), labels.into()))
            .map_err(execution_error)?;

        let output = outputs
            .first()
            .ok_or_else(|| InferenceError::InvalidOutput("model produced no outputs".to_string()))?;
        let view = output.to_array_view::<f32>().map_err(execution_error)?;
        let shape = view.shape().to_vec();

        let (out_channels, out_frames) = match shape.as_slice() {
            [1, c, n] | [c, n] => (*c, *n),
            other => {
                return Err(InferenceError::InvalidOutput(format!(
                    "expected [1, channels, frames], got {:?}",
                    other
                )))
            }
        };

        let flat: Vec<f32> = view.iter().copied().collect();
        let separated: Vec<Vec<f32>> = flat
            .chunks_exact(out_frames.max(1))
            .take(out_channels)
            .map(<[f32]>::to_vec)
            .collect();

        debug!(
            input_frames = frames,
            output_channels = out_channels,
            output_frames = out_frames,
            "Separation inference complete"
        );

        Ok(Waveform::new(separated, mixture.sample_rate))
    }
}

/// Quality model taking `[1, n]` audio and returning STOI, PESQ and SI-SDR
///
/// The three values may arrive as three scalar outputs or as one tensor;
/// they are read in that order from the flattened outputs.
pub struct OnnxQualityModel {
    plan: RunnablePlan,
}

impl OnnxQualityModel {
    pub fn load(path: &Path) -> Result<Self, InferenceError> {
        Ok(Self {
            plan: load_plan(path)?,
        })
    }
}

impl QualityModel for OnnxQualityModel {
    fn evaluate(&self, samples: &[f32], _sample_rate: u32) -> Result<ObjectiveScores, InferenceError> {
        let input = Tensor::from_shape(&[1, samples.len()], samples).map_err(execution_error)?;

        let outputs = self.plan.run(tvec!(input.into())).map_err(execution_error)?;

        let mut values = Vec::with_capacity(3);
        for output in outputs.iter() {
            let view = output.to_array_view::<f32>().map_err(execution_error)?;
            values.extend(view.iter().map(|&v| v as f64));
        }

        match values.as_slice() {
            [stoi, pesq, si_sdr, ..] => Ok(ObjectiveScores {
                stoi: *stoi,
                pesq: *pesq,
                si_sdr: *si_sdr,
            }),
            other => Err(InferenceError::InvalidOutput(format!(
                "expected 3 scores, got {}",
                other.len()
            ))),
        }
    }
}
