//! # Fallback Curve
//!
//! Deterministic degraded path used when the optimizer gives up: the measured
//! deviations of the recorded keys are interpolated across the keyboard and
//! smoothed. The result is not clamped to the optimizer's offset bound and
//! follows the raw measured stretch.

use log::info;

use crate::error::TuningError;
use crate::piano::Piano;
use crate::progress::CancelFlag;
use crate::smoothing::{gaussian_filter1d, interp};
use crate::tuning::{self, A4_INDEX, NUM_KEYS};

/// Builds an offset vector (cents per key) from the recorded deviations of
/// `recorded` keys.
///
/// Fewer than two usable control points give an all-zero vector.
pub fn interpolated_offsets(
    piano: &Piano,
    recorded: &[usize],
    sigma: f64,
    cancel: &CancelFlag,
) -> Result<Vec<f64>, TuningError> {
    let mut control: Vec<(f64, f64)> = Vec::with_capacity(recorded.len());
    for &index in recorded {
        if cancel.is_cancelled() {
            return Err(TuningError::Cancelled);
        }
        let Some(key) = piano.key(index) else {
            continue;
        };
        if let Some(freq) = key.usable_recorded_frequency() {
            let deviation = tuning::calculate_cents_deviation(freq, key.theoretical_frequency());
            control.push((index as f64, deviation));
        }
    }

    if control.len() < 2 {
        info!(
            "[FALLBACK] Only {} usable recorded keys, using equal temperament",
            control.len()
        );
        return Ok(vec![0.0; NUM_KEYS]);
    }

    control.sort_by(|a, b| a.0.total_cmp(&b.0));
    let (xs, ys): (Vec<f64>, Vec<f64>) = control.into_iter().unzip();
    let all: Vec<f64> = (0..NUM_KEYS).map(|i| i as f64).collect();

    let mut offsets = gaussian_filter1d(&interp(&all, &xs, &ys), sigma);
    offsets[A4_INDEX] = 0.0;
    info!("[FALLBACK] Interpolated {} recorded deviations", xs.len());
    Ok(offsets)
}
