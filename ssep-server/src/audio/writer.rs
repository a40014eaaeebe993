//! WAV output

use super::Waveform;
use std::path::Path;

/// Write `waveform` as a 32-bit float WAV file, replacing any existing file
pub fn write_wav(path: &Path, waveform: &Waveform) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: waveform.channel_count() as u16,
        sample_rate: waveform.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in waveform.to_interleaved() {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    tracing::debug!(
        path = %path.display(),
        frames = waveform.frames(),
        channels = waveform.channel_count(),
        "Wrote WAV file"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_float_stereo_wav() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("out.wav");
        let waveform = Waveform::new(vec![vec![0.25, -0.5, 0.75], vec![0.0, 0.1, -0.1]], 44100);

        write_wav(&path, &waveform).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 44100);
        assert_eq!(spec.bits_per_sample, 32);
        assert_eq!(spec.sample_format, hound::SampleFormat::Float);

        let samples: Vec<f32> = reader.into_samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, waveform.to_interleaved());
    }
}
