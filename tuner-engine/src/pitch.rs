//! # Pitch Detection Module
//!
//! Frequency estimation for single blocks of mono audio. The tuner only
//! relies on the [`FrequencyEstimator`] contract; [`YinEstimator`] is the
//! implementation used for live capture and offline analysis.
//!
//! ## Features
//! - YIN pitch detection with octave error prevention
//! - Noise rejection using an RMS gate and a clarity check
//! - Parabolic interpolation for sub-sample accuracy
//! - Optional spectrum refinement for improved precision

use crate::config::EstimatorConfig;
use crate::fft::SpectrumAnalyzer;

/// Produces a fundamental frequency estimate from one block of samples.
///
/// Implementations must be quick relative to the block duration and must
/// not depend on anything but the block they are given (beyond reusable
/// scratch space).
pub trait FrequencyEstimator: Send {
    /// Returns the fundamental in Hz, or `None` when no pitch is found.
    fn estimate(&mut self, block: &[f32]) -> Option<f32>;
}

impl<F> FrequencyEstimator for F
where
    F: FnMut(&[f32]) -> Option<f32> + Send,
{
    fn estimate(&mut self, block: &[f32]) -> Option<f32> {
        self(block)
    }
}

/// YIN-based estimator with optional FFT refinement.
#[derive(Debug)]
pub struct YinEstimator {
    sample_rate: u32,
    amplitude_threshold: f32,
    spectrum: Option<SpectrumAnalyzer>,
    spectral_refinement: bool,
}

impl YinEstimator {
    pub fn new(sample_rate: u32, config: &EstimatorConfig) -> Self {
        Self {
            sample_rate,
            amplitude_threshold: config.amplitude_threshold,
            spectrum: None,
            spectral_refinement: config.spectral_refinement,
        }
    }

    fn refine(&mut self, block: &[f32], rough_freq: f32) -> f32 {
        if self.spectrum.as_ref().map_or(true, |a| a.len() != block.len()) {
            self.spectrum = Some(SpectrumAnalyzer::new(block.len()));
        }
        let Some(analyzer) = self.spectrum.as_mut() else {
            return rough_freq;
        };
        let magnitudes = analyzer.magnitudes(block);
        refine_from_spectrum(&magnitudes, rough_freq, self.sample_rate).unwrap_or(rough_freq)
    }
}

impl FrequencyEstimator for YinEstimator {
    fn estimate(&mut self, block: &[f32]) -> Option<f32> {
        let rough = detect_pitch_yin(block, self.sample_rate, self.amplitude_threshold)?;
        if self.spectral_refinement {
            Some(self.refine(block, rough))
        } else {
            Some(rough)
        }
    }
}

/// YIN pitch detection over a single block.
///
/// # Arguments
/// * `signal` - Input audio signal
/// * `sample_rate` - Sample rate in Hz
/// * `amplitude_threshold` - Minimum RMS amplitude for pitch detection
///
/// # Returns
/// * `Some(frequency)` - Detected frequency in Hz
/// * `None` - Silence, noise, or a block too short to analyse
pub fn detect_pitch_yin(signal: &[f32], sample_rate: u32, amplitude_threshold: f32) -> Option<f32> {
    let frame_size = signal.len();
    let half = frame_size / 2;
    if half < 4 {
        return None;
    }

    // Noise gate
    let rms = (signal.iter().map(|&s| s * s).sum::<f32>() / frame_size as f32).sqrt();
    if rms < amplitude_threshold {
        return None;
    }

    // Difference function
    let mut yin_buffer = vec![0.0_f32; half];
    for tau in 1..half {
        let mut diff = 0.0;
        for i in 0..half {
            let delta = signal[i] - signal[i + tau];
            diff += delta * delta;
        }
        yin_buffer[tau] = diff;
    }

    // Cumulative mean normalized difference
    let mut running_sum = 0.0;
    yin_buffer[0] = 1.0;
    for tau in 1..half {
        running_sum += yin_buffer[tau];
        if running_sum != 0.0 {
            yin_buffer[tau] *= tau as f32 / running_sum;
        } else {
            yin_buffer[tau] = 1.0;
        }
    }

    // First significant dip, then down to the bottom of that valley. Taking
    // the first dip rather than the global minimum avoids octave errors.
    let min_val = yin_buffer
        .iter()
        .skip(1)
        .copied()
        .fold(f32::INFINITY, f32::min);
    let threshold = min_val + 0.05;

    let mut period = (2..half)
        .find(|&tau| yin_buffer[tau] < threshold && yin_buffer[tau] < yin_buffer[tau - 1])?;
    while period + 1 < half && yin_buffer[period + 1] < yin_buffer[period] {
        period += 1;
    }

    // A clear tone has a very low value at its period.
    const CLARITY_THRESHOLD: f32 = 0.1;
    if yin_buffer[period] > CLARITY_THRESHOLD || period + 1 >= half {
        return None;
    }

    let y1 = yin_buffer[period - 1];
    let y2 = yin_buffer[period];
    let y3 = yin_buffer[period + 1];
    let curvature = y1 - 2.0 * y2 + y3;
    let period_float = if curvature != 0.0 {
        period as f32 + (y1 - y3) / (2.0 * curvature)
    } else {
        period as f32
    };

    let frequency = sample_rate as f32 / period_float;
    (frequency.is_finite() && frequency > 20.0).then_some(frequency)
}

/// Refines a frequency estimate using a magnitude spectrum.
///
/// Searches two bins either side of the rough estimate for the peak and
/// interpolates it on a log scale.
///
/// # Returns
/// * `Some(refined_freq)` - Refined estimate, or `rough_freq` if the peak
///   cannot be interpolated
/// * `None` - Invalid input
pub fn refine_from_spectrum(
    spectrum_magnitudes: &[f32],
    rough_freq: f32,
    sample_rate: u32,
) -> Option<f32> {
    if rough_freq <= 0.0 || spectrum_magnitudes.len() < 3 {
        return None;
    }
    let buffer_size = spectrum_magnitudes.len() * 2;
    let target_bin = (rough_freq * buffer_size as f32) / sample_rate as f32;
    let search_radius = 2.0;
    let last_bin = (spectrum_magnitudes.len() - 1) as f32;
    let start_bin = (target_bin - search_radius).clamp(0.0, last_bin) as usize;
    let end_bin = (target_bin + search_radius).clamp(0.0, last_bin) as usize;
    if start_bin >= end_bin {
        return Some(rough_freq);
    }

    let Some(peak_bin) = spectrum_magnitudes[start_bin..=end_bin]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(offset, _)| start_bin + offset)
    else {
        return Some(rough_freq);
    };

    if peak_bin == 0 || peak_bin >= spectrum_magnitudes.len() - 1 {
        return Some(rough_freq);
    }

    let y1 = spectrum_magnitudes[peak_bin - 1].ln();
    let y2 = spectrum_magnitudes[peak_bin].ln();
    let y3 = spectrum_magnitudes[peak_bin + 1].ln();
    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return Some(rough_freq);
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return Some(rough_freq);
    }

    let peak_shift = (y3 - y1) / (2.0 * denominator);
    let final_freq = ((peak_bin as f32 + peak_shift) * sample_rate as f32) / buffer_size as f32;

    if final_freq.is_finite() && final_freq > 0.0 {
        Some(final_freq)
    } else {
        Some(rough_freq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 22_050;

    fn sine(freq: f32, len: usize, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| {
                amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / SAMPLE_RATE as f32).sin()
            })
            .collect()
    }

    fn assert_close(actual: Option<f32>, expected: f32) {
        let actual = actual.expect("no pitch detected");
        assert!(
            (actual - expected).abs() / expected < 0.01,
            "expected ~{expected} Hz, got {actual} Hz"
        );
    }

    #[test]
    fn detects_sine_frequencies() {
        for freq in [110.0, 261.63, 440.0, 880.0] {
            assert_close(detect_pitch_yin(&sine(freq, 2048, 0.5), SAMPLE_RATE, 0.01), freq);
        }
    }

    #[test]
    fn silence_has_no_pitch() {
        assert_eq!(detect_pitch_yin(&vec![0.0; 2048], SAMPLE_RATE, 0.01), None);
    }

    #[test]
    fn quiet_signal_is_gated() {
        assert_eq!(detect_pitch_yin(&sine(440.0, 2048, 0.001), SAMPLE_RATE, 0.01), None);
    }

    #[test]
    fn tiny_blocks_are_rejected() {
        assert_eq!(detect_pitch_yin(&[0.5, -0.5, 0.5], SAMPLE_RATE, 0.0), None);
    }

    #[test]
    fn refined_estimator_stays_on_pitch() {
        let config = EstimatorConfig {
            spectral_refinement: true,
            ..EstimatorConfig::default()
        };
        let mut estimator = YinEstimator::new(SAMPLE_RATE, &config);
        assert_close(estimator.estimate(&sine(440.0, 2048, 0.5)), 440.0);
        // A new block length re-plans the FFT.
        assert_close(estimator.estimate(&sine(440.0, 4096, 0.5)), 440.0);
    }

    #[test]
    fn closures_are_estimators() {
        let mut fixed = |_: &[f32]| Some(123.0_f32);
        assert_eq!(FrequencyEstimator::estimate(&mut fixed, &[]), Some(123.0));
    }

    #[test]
    fn refinement_rejects_bad_input() {
        assert_eq!(refine_from_spectrum(&[1.0; 16], 0.0, SAMPLE_RATE), None);
        assert_eq!(refine_from_spectrum(&[1.0], 100.0, SAMPLE_RATE), None);
    }
}
