//! # Post-processing
//!
//! Turns the winning offset vector (optimizer or fallback) into per-key
//! outputs: a light smoothing pass, A4 pinned to concert pitch, then computed
//! frequencies and deviations rounded to two decimals.

use crate::error::TuningError;
use crate::piano::{KeyOutputs, Piano};
use crate::progress::CancelFlag;
use crate::smoothing::gaussian_filter1d;
use crate::tuning::{self, A4_INDEX};

/// The final tuning curve.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalCurve {
    /// Smoothed offsets in cents, A4 exactly zero
    pub offsets: Vec<f64>,
    pub outputs: Vec<KeyOutputs>,
}

/// Smooths `offsets` and derives every key's outputs.
///
/// `inharmonicity` carries the coefficients to store alongside, one per key.
pub fn finalize(
    piano: &Piano,
    offsets: &[f64],
    inharmonicity: &[f64],
    sigma: f64,
    cancel: &CancelFlag,
) -> Result<FinalCurve, TuningError> {
    let mut smoothed = gaussian_filter1d(offsets, sigma);
    if let Some(a4) = smoothed.get_mut(A4_INDEX) {
        *a4 = 0.0;
    }

    let mut outputs = Vec::with_capacity(piano.keys().len());
    for (i, key) in piano.keys().iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(TuningError::Cancelled);
        }
        let offset = smoothed.get(i).copied().unwrap_or(0.0);
        let computed = key.theoretical_frequency() * tuning::cents_to_ratio(offset);
        let deviation = match key.usable_recorded_frequency() {
            Some(recorded) => tuning::calculate_cents_deviation(recorded, computed),
            None => offset,
        };
        outputs.push(KeyOutputs {
            inharmonicity: inharmonicity.get(i).copied().unwrap_or(key.inharmonicity),
            computed_frequency: Some(tuning::round2(computed)),
            tuning_frequency: Some(tuning::round2(computed)),
            tuning_deviation: tuning::round2(deviation),
        });
    }

    Ok(FinalCurve {
        offsets: smoothed,
        outputs,
    })
}
