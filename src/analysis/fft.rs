//! Frequency spectrum of extracted marker waveforms.
//!
//! Real FFT semantics: a waveform of length N yields N/2 + 1 bins of
//! amplitude (unscaled complex magnitude), phase and frequency. Computed on
//! the worker pool; never on the coordinator thread.

use crate::types::Hertz;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

/// Amplitude/phase/frequency triple for the positive half-spectrum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    /// Complex magnitudes, one per bin.
    pub amplitudes: Vec<f64>,
    /// Phase angles in radians, one per bin.
    pub phases: Vec<f64>,
    /// Bin center frequencies in Hz.
    pub frequencies: Vec<f64>,
}

impl Spectrum {
    /// Number of frequency bins.
    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    /// Whether the spectrum holds no bins.
    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    /// Bin with the largest amplitude, as `(frequency, amplitude)`.
    pub fn peak(&self) -> Option<(f64, f64)> {
        let (idx, &amp) = self
            .amplitudes
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))?;
        Some((self.frequencies[idx], amp))
    }
}

/// Compute the positive half-spectrum of `signal` sampled at `rate`.
///
/// An empty signal yields an empty spectrum.
pub fn compute_spectrum(signal: &[f64], rate: Hertz) -> Spectrum {
    let n = signal.len();
    if n == 0 {
        return Spectrum {
            amplitudes: Vec::new(),
            phases: Vec::new(),
            frequencies: Vec::new(),
        };
    }

    let mut buffer: Vec<Complex<f64>> = signal.iter().map(|&s| Complex::new(s, 0.0)).collect();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    // The first N/2+1 bins of the full complex transform are exactly the
    // real FFT of the input.
    let num_bins = n / 2 + 1;
    let amplitudes: Vec<f64> = buffer.iter().take(num_bins).map(|c| c.norm()).collect();
    let phases: Vec<f64> = buffer.iter().take(num_bins).map(|c| c.arg()).collect();
    let frequencies: Vec<f64> = (0..num_bins)
        .map(|k| k as f64 * rate.0 / n as f64)
        .collect();

    Spectrum {
        amplitudes,
        phases,
        frequencies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn test_bin_count_is_half_plus_one() {
        let signal = vec![0.0; 100];
        let spectrum = compute_spectrum(&signal, Hertz(100.0));
        assert_eq!(spectrum.len(), 51);
        assert_eq!(spectrum.frequencies[0], 0.0);
        assert_eq!(spectrum.frequencies[50], 50.0);
    }

    #[test]
    fn test_sine_wave_peak() {
        let rate = Hertz(100.0);
        let freq = 2.0;
        let signal: Vec<f64> = (0..100)
            .map(|i| (2.0 * PI * freq * i as f64 / rate.0).sin())
            .collect();

        let spectrum = compute_spectrum(&signal, rate);
        let (peak_freq, peak_amp) = spectrum.peak().expect("non-empty spectrum");
        assert!(
            (peak_freq - freq).abs() < 1.0,
            "peak at {peak_freq} Hz, expected {freq} Hz"
        );
        // Unscaled magnitude of a unit sine is N/2.
        assert!((peak_amp - 50.0).abs() < 1.0);
    }

    #[test]
    fn test_dc_signal() {
        let signal = vec![3.0; 8];
        let spectrum = compute_spectrum(&signal, Hertz(8.0));
        // All energy in bin 0: magnitude N * amplitude.
        assert!((spectrum.amplitudes[0] - 24.0).abs() < 1e-9);
        for &a in &spectrum.amplitudes[1..] {
            assert!(a < 1e-9);
        }
    }

    #[test]
    fn test_empty_signal() {
        let spectrum = compute_spectrum(&[], Hertz(100.0));
        assert!(spectrum.is_empty());
        assert!(spectrum.peak().is_none());
    }

    #[test]
    fn test_frequency_resolution() {
        let signal = vec![0.0; 200];
        let spectrum = compute_spectrum(&signal, Hertz(1000.0));
        assert!((spectrum.frequencies[1] - 5.0).abs() < 1e-12);
    }
}
