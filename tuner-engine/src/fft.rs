//! # Fast Fourier Transform (FFT) Module
//!
//! Magnitude spectra for refining pitch estimates. Each block has its DC
//! offset removed and a Hann window applied before the forward transform.

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};

/// Removes the DC offset from a signal by making its average value zero.
fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// Applies a Hann window to reduce spectral leakage.
fn apply_hann_window(buffer: &mut [f32]) {
    let n = buffer.len();
    if n < 2 {
        return;
    }
    let n_minus_1 = (n - 1) as f32;
    for (i, sample) in buffer.iter_mut().enumerate() {
        let multiplier = 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos());
        *sample *= multiplier;
    }
}

/// A forward FFT planned for one block length, with reusable scratch.
pub struct SpectrumAnalyzer {
    len: usize,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
}

impl std::fmt::Debug for SpectrumAnalyzer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumAnalyzer").field("len", &self.len).finish()
    }
}

impl SpectrumAnalyzer {
    pub fn new(len: usize) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            len,
            fft: planner.plan_fft_forward(len),
            buffer: vec![Complex { re: 0.0, im: 0.0 }; len],
        }
    }

    /// Block length this analyzer was planned for.
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Returns the magnitudes of the first `len / 2` bins of `signal`.
    ///
    /// Signals shorter than the planned length are zero-padded; longer
    /// ones are truncated.
    pub fn magnitudes(&mut self, signal: &[f32]) -> Vec<f32> {
        let mut processed: Vec<f32> = signal.iter().take(self.len).copied().collect();
        remove_dc_offset(&mut processed);
        apply_hann_window(&mut processed);

        self.buffer.fill(Complex { re: 0.0, im: 0.0 });
        for (slot, sample) in self.buffer.iter_mut().zip(processed) {
            slot.re = sample;
        }
        self.fft.process(&mut self.buffer);

        self.buffer
            .iter()
            .take(self.len / 2)
            .map(|c| c.norm())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dc_offset_is_removed() {
        let mut signal = vec![0.5_f32, 1.5, 0.5, 1.5];
        remove_dc_offset(&mut signal);
        assert_eq!(signal, vec![-0.5, 0.5, -0.5, 0.5]);
    }

    #[test]
    fn hann_window_tapers_edges() {
        let mut buffer = vec![1.0_f32; 9];
        apply_hann_window(&mut buffer);
        assert!(buffer[0].abs() < 1e-6);
        assert!(buffer[8].abs() < 1e-6);
        assert!((buffer[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn sine_peaks_in_expected_bin() {
        let len = 1024;
        let sample_rate = 8_000.0_f32;
        // 500 Hz lands exactly on bin 64.
        let signal: Vec<f32> = (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 500.0 * i as f32 / sample_rate).sin())
            .collect();
        let mut analyzer = SpectrumAnalyzer::new(len);
        let mags = analyzer.magnitudes(&signal);
        assert_eq!(mags.len(), len / 2);
        let peak = mags
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(peak, Some(64));
    }
}
