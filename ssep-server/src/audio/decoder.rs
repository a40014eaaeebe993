//! Audio file decoding
//!
//! Files are decoded with symphonia (WAV, MP3, FLAC, OGG/Vorbis, M4A/AAC).
//! When symphonia cannot read a file, a plain WAV reader (hound) is tried
//! before giving up; the error then carries both causes.

use super::Waveform;
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};

/// Both decoders rejected the file
#[derive(Debug, Error)]
#[error("Failed to load audio {path}: {primary}; fallback reader: {fallback}")]
pub struct AudioLoadError {
    pub path: PathBuf,
    /// Cause reported by the primary (symphonia) decoder
    pub primary: String,
    /// Cause reported by the fallback WAV reader
    pub fallback: String,
}

/// Decode an audio file into a planar waveform at its native rate and layout
pub fn decode_audio_file(path: &Path) -> Result<Waveform, AudioLoadError> {
    debug!(path = %path.display(), "Decoding audio file");

    let primary = match decode_with_symphonia(path) {
        Ok(waveform) => return Ok(waveform),
        Err(e) => e,
    };

    warn!(
        path = %path.display(),
        error = %primary,
        "Primary decoder failed, trying WAV fallback"
    );

    decode_with_hound(path).map_err(|fallback| AudioLoadError {
        path: path.to_path_buf(),
        primary,
        fallback,
    })
}

fn decode_with_symphonia(path: &Path) -> Result<Waveform, String> {
    let file = File::open(path).map_err(|e| format!("open failed: {}", e))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("unrecognized format: {}", e))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| "no audio track found".to_string())?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channel_count = track.codec_params.channels.map(|c| c.count());

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("unsupported codec: {}", e))?;

    let mut interleaved: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(format!("packet read failed: {}", e)),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                debug!(path = %path.display(), error = %e, "Skipping undecodable packet");
                continue;
            }
            Err(e) => return Err(format!("decode failed: {}", e)),
        };

        let spec = *decoded.spec();
        sample_rate.get_or_insert(spec.rate);
        channel_count.get_or_insert(spec.channels.count());

        let needs_alloc = sample_buf
            .as_ref()
            .map(|buf| buf.capacity() < decoded.capacity() * spec.channels.count())
            .unwrap_or(true);
        if needs_alloc {
            sample_buf = Some(SampleBuffer::<f32>::new(decoded.capacity() as u64, spec));
        }

        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            interleaved.extend_from_slice(buf.samples());
        }
    }

    let sample_rate = sample_rate.ok_or_else(|| "sample rate unknown".to_string())?;
    let channel_count = channel_count.ok_or_else(|| "channel layout unknown".to_string())?;

    if interleaved.is_empty() {
        return Err("no audio frames decoded".to_string());
    }

    let waveform = Waveform::from_interleaved(&interleaved, channel_count, sample_rate);

    debug!(
        path = %path.display(),
        sample_rate = sample_rate,
        channels = channel_count,
        frames = waveform.frames(),
        "Audio decoding complete"
    );

    Ok(waveform)
}

fn decode_with_hound(path: &Path) -> Result<Waveform, String> {
    let reader = hound::WavReader::open(path).map_err(|e| e.to_string())?;
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(|e| e.to_string())?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(|e| e.to_string())?
        }
    };

    if samples.is_empty() {
        return Err("no audio frames in WAV data".to_string());
    }

    Ok(Waveform::from_interleaved(
        &samples,
        spec.channels as usize,
        spec.sample_rate,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_sine_wav(path: &Path, channels: u16, sample_rate: u32, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let sample = (0.5 * (2.0 * std::f32::consts::PI * 440.0 * t).sin() * 32767.0) as i16;
            for _ in 0..channels {
                writer.write_sample(sample).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_decode_stereo_wav() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("tone.wav");
        write_sine_wav(&path, 2, 22050, 22050);

        let waveform = decode_audio_file(&path).unwrap();

        assert_eq!(waveform.sample_rate, 22050);
        assert_eq!(waveform.channel_count(), 2);
        assert_eq!(waveform.frames(), 22050);
        let peak = waveform.channels[0].iter().fold(0.0f32, |p, s| p.max(s.abs()));
        assert!(peak > 0.4 && peak <= 0.51);
    }

    #[test]
    fn test_decode_mono_wav() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("mono.wav");
        write_sine_wav(&path, 1, 44100, 4410);

        let waveform = decode_audio_file(&path).unwrap();

        assert_eq!(waveform.channel_count(), 1);
        assert_eq!(waveform.frames(), 4410);
    }

    #[test]
    fn test_decode_garbage_reports_both_causes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("noise.mp3");
        std::fs::write(&path, b"definitely not audio").unwrap();

        let err = decode_audio_file(&path).unwrap_err();

        assert_eq!(err.path, path);
        assert!(!err.primary.is_empty());
        assert!(!err.fallback.is_empty());
        assert!(err.to_string().contains("noise.mp3"));
    }

    #[test]
    fn test_decode_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(decode_audio_file(&temp_dir.path().join("absent.wav")).is_err());
    }
}
