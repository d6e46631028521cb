//! # Fast Fourier Transform (FFT) Module
//!
//! One-shot magnitude spectrum of a recorded note for capture analysis.
//! Samples are mean-centred and shaped with a symmetric Hann window before the
//! transform; only the non-negative frequency half is kept.

use rustfft::{num_complex::Complex, FftPlanner};

/// Magnitudes of bins `0..=n/2` of an `n`-sample transform.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnitudeSpectrum {
    pub magnitudes: Vec<f64>,
    /// Hz between adjacent bins
    pub bin_width: f64,
}

impl MagnitudeSpectrum {
    pub fn frequency(&self, bin: usize) -> f64 {
        bin as f64 * self.bin_width
    }

    pub fn len(&self) -> usize {
        self.magnitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.magnitudes.is_empty()
    }

    pub fn max(&self) -> f64 {
        self.magnitudes.iter().copied().fold(0.0, f64::max)
    }
}

/// Mean-centred, Hann-windowed copy of `samples` as complex input.
fn windowed_input(samples: &[f32]) -> Vec<Complex<f64>> {
    let n = samples.len();
    let mean = samples.iter().map(|&s| s as f64).sum::<f64>() / n.max(1) as f64;
    let span = n.saturating_sub(1).max(1) as f64;
    samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let w = 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / span).cos();
            Complex::new((s as f64 - mean) * w, 0.0)
        })
        .collect()
}

/// Transforms a buffer of any length into its magnitude spectrum.
pub fn magnitude_spectrum(samples: &[f32], sample_rate: u32) -> MagnitudeSpectrum {
    let n = samples.len();
    if n == 0 || sample_rate == 0 {
        return MagnitudeSpectrum { magnitudes: Vec::new(), bin_width: 0.0 };
    }
    let mut buffer = windowed_input(samples);
    FftPlanner::<f64>::new().plan_fft_forward(n).process(&mut buffer);
    MagnitudeSpectrum {
        magnitudes: buffer[..n / 2 + 1].iter().map(|c| c.norm()).collect(),
        bin_width: sample_rate as f64 / n as f64,
    }
}
