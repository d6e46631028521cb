//! # Tuning Strategies
//!
//! The algorithm selector and the closed-form alternatives to entropy
//! minimization. Each closed form walks the 88 keys once, computes a target
//! frequency per key and reports progress after every key.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TuningError;
use crate::inharmonicity;
use crate::piano::{Key, KeyOutputs, Piano};
use crate::progress::{CancelFlag, ProgressReporter};
use crate::tuning::{self, A4_INDEX};

/// Cents of stretch per octave per unit of inharmonicity coefficient.
const INHARMONICITY_STRETCH_SCALE: f64 = 5000.0;

/// Frequency factor added per key of distance from A4 in simple stretch tuning.
const STRETCH_PER_KEY: f64 = 0.0001;

/// Selects how the tuning curve is computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningAlgorithm {
    #[default]
    EqualTemperament,
    EntropyMinimization,
    CopyRecording,
    StretchTuning,
    Inharmonicity,
}

impl TuningAlgorithm {
    pub const ALL: [TuningAlgorithm; 5] = [
        TuningAlgorithm::EqualTemperament,
        TuningAlgorithm::EntropyMinimization,
        TuningAlgorithm::CopyRecording,
        TuningAlgorithm::StretchTuning,
        TuningAlgorithm::Inharmonicity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TuningAlgorithm::EqualTemperament => "equal_temperament",
            TuningAlgorithm::EntropyMinimization => "entropy_minimization",
            TuningAlgorithm::CopyRecording => "copy_recording",
            TuningAlgorithm::StretchTuning => "stretch_tuning",
            TuningAlgorithm::Inharmonicity => "inharmonicity",
        }
    }
}

impl fmt::Display for TuningAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TuningAlgorithm {
    type Err = TuningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TuningAlgorithm::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| TuningError::Validation(format!("unknown tuning algorithm '{}'", s)))
    }
}

/// Runs `target` over every key, reporting `(i + 1) / 88` progress after each.
fn per_key<F>(
    piano: &Piano,
    reporter: &ProgressReporter<'_>,
    cancel: &CancelFlag,
    message: &str,
    mut target: F,
) -> Result<Vec<KeyOutputs>, TuningError>
where
    F: FnMut(usize, &Key) -> KeyOutputs,
{
    let total = piano.keys().len();
    let mut outputs = Vec::with_capacity(total);
    for (i, key) in piano.keys().iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(TuningError::Cancelled);
        }
        outputs.push(target(i, key));
        reporter.report(((i + 1) * 100 / total) as u8, message);
    }
    Ok(outputs)
}

/// Equal temperament: every target is the theoretical frequency.
pub fn equal_temperament(
    piano: &Piano,
    reporter: &ProgressReporter<'_>,
    cancel: &CancelFlag,
) -> Result<Vec<KeyOutputs>, TuningError> {
    per_key(piano, reporter, cancel, "Applying equal temperament", |_, key| {
        let target = key.theoretical_frequency();
        let deviation = key
            .usable_recorded_frequency()
            .map(|f| tuning::round2(tuning::calculate_cents_deviation(f, target)))
            .unwrap_or(0.0);
        KeyOutputs {
            inharmonicity: key.inharmonicity,
            computed_frequency: Some(target),
            tuning_frequency: Some(target),
            tuning_deviation: deviation,
        }
    })
}

/// Copy recording: the recorded fundamental becomes the target.
pub fn copy_recording(
    piano: &Piano,
    reporter: &ProgressReporter<'_>,
    cancel: &CancelFlag,
) -> Result<Vec<KeyOutputs>, TuningError> {
    per_key(piano, reporter, cancel, "Copying recorded frequencies", |_, key| {
        let target = key
            .usable_recorded_frequency()
            .unwrap_or_else(|| key.theoretical_frequency());
        KeyOutputs {
            inharmonicity: key.inharmonicity,
            computed_frequency: Some(target),
            tuning_frequency: Some(target),
            tuning_deviation: 0.0,
        }
    })
}

/// Simple stretch: recorded keys are widened by a factor growing linearly
/// with their distance from A4. Unrecorded keys stay at equal temperament.
pub fn stretch_tuning(
    piano: &Piano,
    reporter: &ProgressReporter<'_>,
    cancel: &CancelFlag,
) -> Result<Vec<KeyOutputs>, TuningError> {
    per_key(piano, reporter, cancel, "Applying stretch tuning", |i, key| {
        let theoretical = key.theoretical_frequency();
        let (target, deviation) = match key.usable_recorded_frequency() {
            Some(recorded) => {
                let factor = 1.0 + i.abs_diff(A4_INDEX) as f64 * STRETCH_PER_KEY;
                let target = theoretical * factor;
                (target, tuning::round2(tuning::calculate_cents_deviation(recorded, target)))
            }
            None => (theoretical, 0.0),
        };
        KeyOutputs {
            inharmonicity: key.inharmonicity,
            computed_frequency: Some(target),
            tuning_frequency: Some(target),
            tuning_deviation: deviation,
        }
    })
}

/// Stretch in cents for a key from its coefficient and octave distance to A4.
pub fn inharmonicity_stretch_cents(key_index: usize, coefficient: f64) -> f64 {
    let octaves_from_a4 = (key_index as f64 - A4_INDEX as f64) / 12.0;
    octaves_from_a4 * coefficient * INHARMONICITY_STRETCH_SCALE
}

/// Inharmonicity-driven stretch: estimates every key's coefficient, then
/// stretches proportionally to it and to the octave distance from A4.
pub fn inharmonicity_stretch(
    piano: &Piano,
    reporter: &ProgressReporter<'_>,
    cancel: &CancelFlag,
) -> Result<Vec<KeyOutputs>, TuningError> {
    let coefficients = inharmonicity::estimate_all(piano);
    per_key(piano, reporter, cancel, "Applying inharmonicity stretch", |i, key| {
        let b = coefficients[i];
        let target = if b > 0.0 {
            key.theoretical_frequency() * tuning::cents_to_ratio(inharmonicity_stretch_cents(i, b))
        } else {
            key.theoretical_frequency()
        };
        // Deviation is measured against the exact target; only the stored
        // frequency is rounded.
        let deviation = key
            .usable_recorded_frequency()
            .map(|f| tuning::round2(tuning::calculate_cents_deviation(f, target)))
            .unwrap_or(0.0);
        let target = tuning::round2(target);
        KeyOutputs {
            inharmonicity: b,
            computed_frequency: Some(target),
            tuning_frequency: Some(target),
            tuning_deviation: deviation,
        }
    })
}
