//! Numeric kernels offloaded to the worker pool.
//!
//! - FFT spectrum of extracted marker waveforms
//! - Whole-scan energy

pub mod energy;
pub mod fft;

pub use energy::compute_energy;
pub use fft::{compute_spectrum, Spectrum};
