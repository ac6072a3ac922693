//! Loading recordings for offline analysis.

use std::path::Path;

use anyhow::{Context, Result, bail};
use hound::{SampleFormat, WavReader};
use tracing::debug;

/// Mono samples in `[-1, 1]` and the file's sample rate.
#[derive(Debug)]
pub struct Recording {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Recording {
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }

    /// Whole analysis blocks in the recording; a partial tail is not counted.
    pub fn block_count(&self, block_size: usize) -> usize {
        self.samples.len().checked_div(block_size).unwrap_or(0)
    }
}

/// Reads a WAV file, normalising integer samples and averaging channels.
pub fn load(path: &Path) -> Result<Recording> {
    let mut reader =
        WavReader::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let spec = reader.spec();
    debug!(?spec, "reading recording");

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()
            .context("failed to decode samples")?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                bail!("unsupported bit depth {}", spec.bits_per_sample);
            }
            let scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|s| s as f32 / scale))
                .collect::<std::result::Result<_, _>>()
                .context("failed to decode samples")?
        }
    };

    let channels = usize::from(spec.channels.max(1));
    let samples = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();

    Ok(Recording {
        samples,
        sample_rate: spec.sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    #[test]
    fn int_stereo_is_normalised_and_downmixed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..4 {
            writer.write_sample(16_384_i16).unwrap();
            writer.write_sample(0_i16).unwrap();
        }
        writer.finalize().unwrap();

        let recording = load(&path).unwrap();
        assert_eq!(recording.sample_rate, 8_000);
        assert_eq!(recording.samples, vec![0.25; 4]);
        assert!((recording.duration_secs() - 0.0005).abs() < 1e-9);
    }

    #[test]
    fn float_mono_is_read_as_is() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 22_050,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for sample in [0.5_f32, -0.5, 0.125] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        assert_eq!(load(&path).unwrap().samples, vec![0.5, -0.5, 0.125]);
    }

    #[test]
    fn block_count_ignores_partial_tail() {
        let recording = Recording {
            samples: vec![0.0; 5000],
            sample_rate: 22_050,
        };
        assert_eq!(recording.block_count(2048), 2);
        assert_eq!(recording.block_count(8192), 0);
        assert_eq!(recording.block_count(0), 0);

        // A long silent take still has blocks even though it yields no readings.
        let silent = Recording {
            samples: vec![0.0; 22_050],
            sample_rate: 22_050,
        };
        assert_eq!(silent.block_count(2048), 10);
    }

    #[test]
    fn missing_file_has_context() {
        let err = load(Path::new("/nonexistent/take.wav")).unwrap_err();
        assert!(err.to_string().contains("failed to open"));
    }
}
