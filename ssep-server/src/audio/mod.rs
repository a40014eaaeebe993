//! Audio signal handling
//!
//! Decoding (symphonia with a hound fallback), normalization for the separation
//! model, resampling (rubato) and WAV output.

pub mod decoder;
pub mod preprocess;
pub mod writer;

pub use decoder::{decode_audio_file, AudioLoadError};
pub use preprocess::{
    resample, AudioPreprocessor, ResampleError, MODEL_SAMPLE_RATE, QUALITY_SAMPLE_RATE,
};
pub use writer::write_wav;

/// Planar multi-channel PCM signal
///
/// Every channel holds the same number of frames; samples are f32 in
/// roughly [-1.0, 1.0].
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// One sample vector per channel
    pub channels: Vec<Vec<f32>>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl Waveform {
    /// Create a waveform from planar channels
    ///
    /// Channels of unequal length are truncated to the shortest one.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in &mut channels {
            channel.truncate(frames);
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// Single-channel waveform
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            channels: vec![samples],
            sample_rate,
        }
    }

    /// De-interleave `[c0, c1, .., c0, c1, ..]` samples
    ///
    /// A trailing partial frame is dropped.
    pub fn from_interleaved(samples: &[f32], channel_count: usize, sample_rate: u32) -> Self {
        if channel_count == 0 {
            return Self::new(Vec::new(), sample_rate);
        }

        let frames = samples.len() / channel_count;
        let mut channels = vec![Vec::with_capacity(frames); channel_count];
        for frame in samples.chunks_exact(channel_count) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }

        Self {
            channels,
            sample_rate,
        }
    }

    /// Number of channels
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }

    /// Duration in seconds
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average all channels into one
    pub fn mono_mix(&self) -> Vec<f32> {
        match self.channels.len() {
            0 => Vec::new(),
            1 => self.channels[0].clone(),
            count => {
                let scale = 1.0 / count as f32;
                (0..self.frames())
                    .map(|i| self.channels.iter().map(|c| c[i]).sum::<f32>() * scale)
                    .collect()
            }
        }
    }

    /// Interleave channels frame by frame
    pub fn to_interleaved(&self) -> Vec<f32> {
        let channel_count = self.channel_count();
        let mut output = Vec::with_capacity(self.frames() * channel_count);
        for i in 0..self.frames() {
            for channel in &self.channels {
                output.push(channel[i]);
            }
        }
        output
    }
}
