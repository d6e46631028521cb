//! # Inharmonicity Estimation
//!
//! Fits the string-stiffness coefficient `B` of `f_n = n·f0·√(1 + B·n²)` for
//! each recorded key from its measured partials.

use log::debug;

use crate::piano::{Key, Peak, Piano};

/// Coefficient assigned to a recorded key whose partials give no usable estimate.
pub const DEFAULT_INHARMONICITY: f64 = 0.0001;

/// Upper bound (exclusive) for a physically plausible piano coefficient.
pub const MAX_INHARMONICITY: f64 = 0.01;

/// Number of strongest peaks consulted per key.
const PEAKS_CONSULTED: usize = 5;

/// Range of partial numbers trusted for the estimate.
const PARTIAL_RANGE: std::ops::RangeInclusive<u32> = 2..=10;

/// Estimates `B` from a single partial, if it passes the plausibility filters.
///
/// The partial number is taken as the nearest integer multiple of the
/// fundamental. Partials flat of the harmonic are rejected, since stiffness
/// only ever sharpens them.
pub fn estimate_from_partial(fundamental: f64, peak: &Peak) -> Option<f64> {
    let n = (peak.frequency / fundamental).round();
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    let n = n as u32;
    if !PARTIAL_RANGE.contains(&n) {
        return None;
    }
    let n = n as f64;
    let ratio = peak.frequency / (n * fundamental);
    if ratio <= 1.0 {
        return None;
    }
    let b = (ratio * ratio - 1.0) / (n * n);
    (b > 0.0 && b < MAX_INHARMONICITY).then_some(b)
}

/// Median of a non-empty slice; averages the two middle values for even lengths.
fn median(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Inharmonicity coefficient for one key.
///
/// * unrecorded, or fewer than 2 peaks: `0.0`
/// * recorded but no partial passes the filters: [`DEFAULT_INHARMONICITY`]
/// * otherwise the median of the per-partial estimates
pub fn estimate_key(key: &Key) -> f64 {
    let Some(fundamental) = key.usable_recorded_frequency() else {
        return 0.0;
    };
    if key.peaks.len() < 2 {
        return 0.0;
    }

    let mut estimates: Vec<f64> = key
        .peaks
        .iter()
        .take(PEAKS_CONSULTED)
        .filter_map(|peak| estimate_from_partial(fundamental, peak))
        .collect();

    if estimates.is_empty() {
        DEFAULT_INHARMONICITY
    } else {
        median(&mut estimates)
    }
}

/// Estimates every key's coefficient without touching the piano.
pub fn estimate_all(piano: &Piano) -> Vec<f64> {
    piano
        .keys()
        .iter()
        .map(|key| {
            let b = estimate_key(key);
            if key.has_spectral_data() {
                debug!("[INHARMONICITY] {}: B = {:.6}", key.name(), b);
            }
            b
        })
        .collect()
}
