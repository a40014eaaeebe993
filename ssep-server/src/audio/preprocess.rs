//! Preprocessing for the separation model
//!
//! The model expects stereo input at 44.1 kHz. Mono input is duplicated to
//! both channels, inputs with more than two channels keep the first two, and
//! any other sample rate is resampled with rubato.

use super::Waveform;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};
use thiserror::Error;
use tracing::debug;

/// Sample rate the separation model runs at
pub const MODEL_SAMPLE_RATE: u32 = 44_100;

/// Sample rate the quality model runs at
pub const QUALITY_SAMPLE_RATE: u32 = 16_000;

/// Resampling failure
#[derive(Debug, Error)]
pub enum ResampleError {
    #[error("Invalid sample rate conversion {from} Hz -> {to} Hz")]
    InvalidRate { from: u32, to: u32 },

    #[error("Failed to create resampler: {0}")]
    Construction(String),

    #[error("Resampling failed: {0}")]
    Process(String),
}

/// Brings decoded audio into the separation model's input format
#[derive(Debug, Clone)]
pub struct AudioPreprocessor {
    target_sample_rate: u32,
}

impl Default for AudioPreprocessor {
    fn default() -> Self {
        Self {
            target_sample_rate: MODEL_SAMPLE_RATE,
        }
    }
}

impl AudioPreprocessor {
    /// Convert to stereo at the target sample rate
    pub fn normalize(&self, waveform: Waveform) -> Result<Waveform, ResampleError> {
        let stereo = to_stereo(waveform);

        if stereo.sample_rate == self.target_sample_rate {
            return Ok(stereo);
        }

        resample(&stereo, self.target_sample_rate)
    }
}

fn to_stereo(waveform: Waveform) -> Waveform {
    let Waveform {
        mut channels,
        sample_rate,
    } = waveform;

    match channels.len() {
        0 => Waveform::new(vec![Vec::new(), Vec::new()], sample_rate),
        1 => {
            let mono = channels.remove(0);
            Waveform::new(vec![mono.clone(), mono], sample_rate)
        }
        2 => Waveform::new(channels, sample_rate),
        count => {
            debug!(channels = count, "Keeping first two channels");
            channels.truncate(2);
            Waveform::new(channels, sample_rate)
        }
    }
}

/// Input frames fed to the resampler per call
const RESAMPLE_CHUNK_FRAMES: usize = 1024;

/// Resample every channel of `waveform` to `target_rate`
///
/// Uses sinc interpolation (256 taps, BlackmanHarris2 window, 0.95 cutoff).
/// The filter delay is flushed and trimmed, so the output holds exactly
/// `round(frames * target_rate / source_rate)` frames.
pub fn resample(waveform: &Waveform, target_rate: u32) -> Result<Waveform, ResampleError> {
    if waveform.sample_rate == 0 || target_rate == 0 {
        return Err(ResampleError::InvalidRate {
            from: waveform.sample_rate,
            to: target_rate,
        });
    }

    if waveform.sample_rate == target_rate {
        return Ok(waveform.clone());
    }

    let num_frames = waveform.frames();
    let channel_count = waveform.channel_count();

    if num_frames == 0 || channel_count == 0 {
        return Ok(Waveform::new(
            vec![Vec::new(); channel_count],
            target_rate,
        ));
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let resample_ratio = target_rate as f64 / waveform.sample_rate as f64;
    let expected_frames = (num_frames as f64 * resample_ratio).round() as usize;

    let mut resampler = SincFixedIn::<f32>::new(
        resample_ratio,
        2.0,
        params,
        RESAMPLE_CHUNK_FRAMES,
        channel_count,
    )
    .map_err(|e| ResampleError::Construction(e.to_string()))?;

    let delay = resampler.output_delay();
    let wanted = delay + expected_frames;
    let mut output_channels: Vec<Vec<f32>> = vec![Vec::with_capacity(wanted); channel_count];
    let process_error = |e: rubato::ResampleError| ResampleError::Process(e.to_string());

    let mut position = 0;
    while position < num_frames {
        let end = (position + RESAMPLE_CHUNK_FRAMES).min(num_frames);
        let chunk: Vec<&[f32]> = waveform
            .channels
            .iter()
            .map(|c| &c[position..end])
            .collect();

        let produced = if end - position == RESAMPLE_CHUNK_FRAMES {
            resampler.process(&chunk, None).map_err(process_error)?
        } else {
            resampler
                .process_partial(Some(chunk.as_slice()), None)
                .map_err(process_error)?
        };
        append_planar(&mut output_channels, produced);
        position = end;
    }

    // Push silence through until the delayed tail is out
    let mut flushes = 0;
    while output_channels[0].len() < wanted {
        let produced = resampler
            .process_partial::<Vec<f32>>(None, None)
            .map_err(process_error)?;
        let produced_frames = produced.first().map(Vec::len).unwrap_or(0);
        append_planar(&mut output_channels, produced);

        flushes += 1;
        if produced_frames == 0 || flushes > delay / RESAMPLE_CHUNK_FRAMES + 4 {
            break;
        }
    }

    for channel in &mut output_channels {
        channel.drain(..delay.min(channel.len()));
        channel.resize(expected_frames, 0.0);
    }

    let output = Waveform::new(output_channels, target_rate);

    debug!(
        "Resampled {} frames ({} Hz) → {} frames ({} Hz)",
        num_frames,
        waveform.sample_rate,
        output.frames(),
        target_rate
    );

    Ok(output)
}

fn append_planar(output: &mut [Vec<f32>], produced: Vec<Vec<f32>>) {
    for (channel, samples) in output.iter_mut().zip(produced) {
        channel.extend(samples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, sample_rate: u32) -> Vec<f32> {
        (0..frames)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn test_mono_is_duplicated_to_stereo() {
        let preprocessor = AudioPreprocessor::default();
        let input = Waveform::mono(sine(1000, 44100), 44100);

        let output = preprocessor.normalize(input.clone()).unwrap();

        assert_eq!(output.channel_count(), 2);
        assert_eq!(output.channels[0], input.channels[0]);
        assert_eq!(output.channels[1], input.channels[0]);
    }

    #[test]
    fn test_extra_channels_are_dropped() {
        let preprocessor = AudioPreprocessor::default();
        let input = Waveform::new(vec![vec![0.1; 100], vec![0.2; 100], vec![0.3; 100]], 44100);

        let output = preprocessor.normalize(input).unwrap();

        assert_eq!(output.channel_count(), 2);
        assert_eq!(output.channels[1][0], 0.2);
    }

    #[test]
    fn test_matching_rate_is_untouched() {
        let preprocessor = AudioPreprocessor::default();
        let input = Waveform::new(vec![sine(500, 44100), sine(500, 44100)], 44100);

        let output = preprocessor.normalize(input.clone()).unwrap();

        assert_eq!(output, input);
    }

    #[test]
    fn test_resample_changes_rate_and_length() {
        let input = Waveform::new(vec![sine(22050, 22050), sine(22050, 22050)], 22050);

        let output = resample(&input, 44100).unwrap();

        assert_eq!(output.sample_rate, 44100);
        assert_eq!(output.channel_count(), 2);
        assert_eq!(output.frames(), 44100);
    }

    #[test]
    fn test_resample_down_to_quality_rate() {
        let input = Waveform::mono(sine(44100, 44100), 44100);

        let output = resample(&input, QUALITY_SAMPLE_RATE).unwrap();

        assert_eq!(output.sample_rate, QUALITY_SAMPLE_RATE);
        assert_eq!(output.frames(), 16000);
    }

    #[test]
    fn test_resample_short_input_keeps_exact_length() {
        let input = Waveform::mono(sine(441, 22050), 22050);

        let output = resample(&input, 44100).unwrap();

        assert_eq!(output.frames(), 882);
        // The tone survives rather than being swallowed by the filter delay
        let tail_peak = output.channels[0][441..]
            .iter()
            .fold(0.0f32, |peak, s| peak.max(s.abs()));
        assert!(tail_peak > 0.3, "tail peak {}", tail_peak);
    }

    #[test]
    fn test_resample_input_shorter_than_filter() {
        let input = Waveform::mono(sine(100, 22050), 22050);

        let output = resample(&input, 44100).unwrap();

        assert_eq!(output.frames(), 200);
        assert!(output.channels[0].iter().any(|s| s.abs() > 0.1));
    }

    #[test]
    fn test_resample_non_integer_ratio_rounds_length() {
        let input = Waveform::new(vec![sine(1000, 48000), sine(1000, 48000)], 48000);

        let output = resample(&input, 44100).unwrap();

        // 1000 * 44100 / 48000 = 918.75
        assert_eq!(output.frames(), 919);
        assert_eq!(output.channels[0].len(), output.channels[1].len());
    }

    #[test]
    fn test_resample_empty_input() {
        let input = Waveform::new(vec![Vec::new(), Vec::new()], 8000);
        let output = resample(&input, 44100).unwrap();
        assert_eq!(output.frames(), 0);
        assert_eq!(output.sample_rate, 44100);
    }

    #[test]
    fn test_resample_zero_rate_rejected() {
        let input = Waveform::mono(vec![0.0; 10], 0);
        assert!(matches!(
            resample(&input, 44100),
            Err(ResampleError::InvalidRate { .. })
        ));
    }
}
