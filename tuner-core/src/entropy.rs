//! # Entropy Objective
//!
//! Scores a candidate tuning: the Shannon entropy of the synthesized spectrum
//! (low when partials of different keys coincide) plus two regularizers that
//! keep the curve smooth and close to equal temperament.

use crate::spectrum::{Spectrum, SpectrumSynthesizer};

/// Cost returned when the spectrum carries no energy at all.
pub const EMPTY_SPECTRUM_COST: f64 = 1e10;

/// Probabilities at or below this are left out of the entropy sum.
const MIN_PROBABILITY: f64 = 1e-12;

/// Normalizes a spectrum into a probability distribution over its bins.
///
/// Returns `None` when the total is not positive.
pub fn normalize(spectrum: &[f64]) -> Option<Vec<f64>> {
    let sum: f64 = spectrum.iter().sum();
    (sum > 0.0).then(|| spectrum.iter().map(|v| v / sum).collect())
}

/// Shannon entropy `-Σ P ln P` of the normalized spectrum.
///
/// Returns `None` when the spectrum has no positive total.
pub fn spectral_entropy(spectrum: &Spectrum<'_>) -> Option<f64> {
    let sum = spectrum.sum();
    if !(sum > 0.0) {
        return None;
    }
    let entropy = spectrum
        .active_values()
        .map(|v| v / sum)
        .filter(|&p| p > MIN_PROBABILITY)
        .map(|p| -p * p.ln())
        .sum();
    Some(entropy)
}

/// Sum of squared differences between adjacent keys.
pub fn roughness(offsets: &[f64]) -> f64 {
    offsets.windows(2).map(|w| (w[1] - w[0]).powi(2)).sum()
}

/// Sum of squared offsets from equal temperament.
pub fn deviation_energy(offsets: &[f64]) -> f64 {
    offsets.iter().map(|o| o * o).sum()
}

/// Individual terms of one objective evaluation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBreakdown {
    pub entropy: f64,
    pub smoothness_penalty: f64,
    pub proximity_penalty: f64,
    pub total: f64,
}

/// The scalar cost minimized by the optimizer. Lower is better.
#[derive(Debug, Clone)]
pub struct EntropyObjective {
    synthesizer: SpectrumSynthesizer,
    smoothness_weight: f64,
    proximity_weight: f64,
}

impl EntropyObjective {
    pub fn new(synthesizer: SpectrumSynthesizer, smoothness_weight: f64, proximity_weight: f64) -> Self {
        Self {
            synthesizer,
            smoothness_weight,
            proximity_weight,
        }
    }

    pub fn synthesizer(&self) -> &SpectrumSynthesizer {
        &self.synthesizer
    }

    /// Evaluates all terms for an offset vector.
    ///
    /// A spectrum without energy yields [`EMPTY_SPECTRUM_COST`] for the entropy
    /// term and the total, so such candidates lose against any real one.
    pub fn evaluate(&mut self, offsets: &[f64]) -> CostBreakdown {
        let smoothness_penalty = self.smoothness_weight * roughness(offsets);
        let proximity_penalty = self.proximity_weight * deviation_energy(offsets);
        match spectral_entropy(&self.synthesizer.synthesize(offsets)) {
            Some(entropy) => CostBreakdown {
                entropy,
                smoothness_penalty,
                proximity_penalty,
                total: entropy + smoothness_penalty + proximity_penalty,
            },
            None => CostBreakdown {
                entropy: EMPTY_SPECTRUM_COST,
                smoothness_penalty,
                proximity_penalty,
                total: EMPTY_SPECTRUM_COST,
            },
        }
    }

    pub fn cost(&mut self, offsets: &[f64]) -> f64 {
        self.evaluate(offsets).total
    }
}
