//! # Piano Model
//!
//! The 88-key registry together with each key's recorded spectral peaks.
//! Reference fields (`number`, `name`, `theoretical_frequency`) are derived
//! from the key index and cannot be set independently; measurement fields are
//! written by capture, computed fields by the tuning computation only.

use serde::{Deserialize, Serialize};

use crate::error::TuningError;
use crate::tuning::{self, A4_INDEX, NUM_KEYS};

/// Maximum number of peaks stored per key.
pub const MAX_PEAKS: usize = 5;

/// One spectral partial detected for a key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Frequency in Hz
    pub frequency: f64,
    /// Non-negative magnitude
    pub magnitude: f64,
}

/// One piano string/note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Key {
    number: usize,
    name: String,
    theoretical_frequency: f64,
    #[serde(default)]
    pub recorded_frequency: Option<f64>,
    #[serde(default)]
    pub recorded: bool,
    /// Sorted by magnitude, strongest first, at most [`MAX_PEAKS`].
    #[serde(default)]
    pub peaks: Vec<Peak>,
    #[serde(default)]
    pub inharmonicity: f64,
    #[serde(default)]
    pub computed_frequency: Option<f64>,
    #[serde(default)]
    pub tuning_frequency: Option<f64>,
    /// Cents, recorded relative to the computed target.
    #[serde(default)]
    pub tuning_deviation: f64,
}

impl Key {
    /// Creates an unrecorded key with its reference fields populated.
    pub fn new(number: usize) -> Self {
        Self {
            number,
            name: tuning::key_name(number),
            theoretical_frequency: tuning::theoretical_frequency(number),
            recorded_frequency: None,
            recorded: false,
            peaks: Vec::new(),
            inharmonicity: 0.0,
            computed_frequency: None,
            tuning_frequency: None,
            tuning_deviation: 0.0,
        }
    }

    pub fn number(&self) -> usize {
        self.number
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn theoretical_frequency(&self) -> f64 {
        self.theoretical_frequency
    }

    /// The recorded fundamental, if the key is recorded with a usable value.
    pub fn usable_recorded_frequency(&self) -> Option<f64> {
        match self.recorded_frequency {
            Some(f) if self.recorded && f.is_finite() && f > 0.0 => Some(f),
            _ => None,
        }
    }

    /// True when this key can take part in inharmonicity and entropy work.
    pub fn has_spectral_data(&self) -> bool {
        self.usable_recorded_frequency().is_some() && !self.peaks.is_empty()
    }

    /// Stores a capture result, normalizing the peak list.
    pub fn record(&mut self, recorded_frequency: f64, mut peaks: Vec<Peak>) {
        peaks.retain(|p| p.frequency.is_finite() && p.magnitude.is_finite() && p.magnitude >= 0.0);
        peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
        peaks.truncate(MAX_PEAKS);
        self.recorded_frequency = Some(recorded_frequency);
        self.recorded = true;
        self.peaks = peaks;
    }

    /// Drops any measurement for this key.
    pub fn clear_recording(&mut self) {
        self.recorded_frequency = None;
        self.recorded = false;
        self.peaks.clear();
    }

    /// Output fields of a key, as produced by one computation.
    pub fn outputs(&self) -> KeyOutputs {
        KeyOutputs {
            inharmonicity: self.inharmonicity,
            computed_frequency: self.computed_frequency,
            tuning_frequency: self.tuning_frequency,
            tuning_deviation: self.tuning_deviation,
        }
    }

    fn apply_outputs(&mut self, outputs: &KeyOutputs) {
        self.inharmonicity = outputs.inharmonicity;
        self.computed_frequency = outputs.computed_frequency;
        self.tuning_frequency = outputs.tuning_frequency;
        self.tuning_deviation = outputs.tuning_deviation;
    }
}

/// The fields a tuning computation owns on each key.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KeyOutputs {
    pub inharmonicity: f64,
    pub computed_frequency: Option<f64>,
    pub tuning_frequency: Option<f64>,
    pub tuning_deviation: f64,
}

/// Serialized shape of a piano session.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PianoDocument {
    #[serde(default = "default_num_keys")]
    num_keys: usize,
    #[serde(default = "default_key_of_a4")]
    key_of_a4: usize,
    #[serde(default = "default_concert_pitch")]
    concert_pitch: f64,
    keys: Vec<Key>,
}

fn default_num_keys() -> usize {
    NUM_KEYS
}

fn default_key_of_a4() -> usize {
    A4_INDEX
}

fn default_concert_pitch() -> f64 {
    tuning::CONCERT_PITCH
}

/// The full keyboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PianoDocument", into = "PianoDocument")]
pub struct Piano {
    keys: Vec<Key>,
}

impl Default for Piano {
    fn default() -> Self {
        Self::new()
    }
}

impl Piano {
    /// Creates a piano with all reference values populated and nothing recorded.
    pub fn new() -> Self {
        Self {
            keys: (0..NUM_KEYS).map(Key::new).collect(),
        }
    }

    /// Builds a piano from externally supplied key records.
    ///
    /// Rejects a wrong key count or numbering up front. Derived fields are
    /// recomputed from the key number, whatever the records carried.
    pub fn from_keys(mut keys: Vec<Key>) -> Result<Self, TuningError> {
        if keys.len() != NUM_KEYS {
            return Err(TuningError::Validation(format!(
                "expected {} keys, got {}",
                NUM_KEYS,
                keys.len()
            )));
        }
        keys.sort_by_key(|k| k.number);
        for (i, key) in keys.iter_mut().enumerate() {
            if key.number != i {
                return Err(TuningError::Validation(format!(
                    "key numbers must cover 0..{} exactly once (found {} at position {})",
                    NUM_KEYS - 1,
                    key.number,
                    i
                )));
            }
            key.name = tuning::key_name(i);
            key.theoretical_frequency = tuning::theoretical_frequency(i);
            if key.recorded_frequency.is_none() {
                key.recorded = false;
            }
            key.peaks
                .sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
            key.peaks.truncate(MAX_PEAKS);
        }
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn key(&self, index: usize) -> Option<&Key> {
        self.keys.get(index)
    }

    pub fn key_mut(&mut self, index: usize) -> Option<&mut Key> {
        self.keys.get_mut(index)
    }

    /// Records a capture result on one key.
    pub fn record(
        &mut self,
        index: usize,
        recorded_frequency: f64,
        peaks: Vec<Peak>,
    ) -> Result<(), TuningError> {
        let key = self
            .keys
            .get_mut(index)
            .ok_or_else(|| TuningError::Validation(format!("no key with index {}", index)))?;
        key.record(recorded_frequency, peaks);
        Ok(())
    }

    /// Indices of keys that are recorded with at least one peak.
    pub fn recorded_with_peaks(&self) -> Vec<usize> {
        self.keys
            .iter()
            .filter(|k| k.has_spectral_data())
            .map(|k| k.number)
            .collect()
    }

    /// Snapshot of every key's output fields.
    pub fn outputs(&self) -> Vec<KeyOutputs> {
        self.keys.iter().map(Key::outputs).collect()
    }

    /// Writes one computation's outputs onto all keys in one pass.
    pub fn apply_outputs(&mut self, outputs: &[KeyOutputs]) {
        for (key, out) in self.keys.iter_mut().zip(outputs) {
            key.apply_outputs(out);
        }
    }
}

impl TryFrom<PianoDocument> for Piano {
    type Error = TuningError;

    fn try_from(doc: PianoDocument) -> Result<Self, Self::Error> {
        if doc.num_keys != NUM_KEYS || doc.key_of_a4 != A4_INDEX {
            return Err(TuningError::Validation(format!(
                "unsupported keyboard layout: {} keys with A4 at {}",
                doc.num_keys, doc.key_of_a4
            )));
        }
        if doc.concert_pitch != tuning::CONCERT_PITCH {
            return Err(TuningError::Validation(format!(
                "unsupported concert pitch {} Hz",
                doc.concert_pitch
            )));
        }
        Piano::from_keys(doc.keys)
    }
}

impl From<Piano> for PianoDocument {
    fn from(piano: Piano) -> Self {
        Self {
            num_keys: NUM_KEYS,
            key_of_a4: A4_INDEX,
            concert_pitch: tuning::CONCERT_PITCH,
            keys: piano.keys,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_piano_has_reference_values_only() {
        let piano = Piano::new();
        assert_eq!(piano.keys().len(), NUM_KEYS);
        let a4 = piano.key(A4_INDEX).unwrap();
        assert_eq!(a4.name(), "A4");
        assert_eq!(a4.theoretical_frequency(), 440.0);
        assert!(piano.keys().iter().all(|k| !k.recorded && k.computed_frequency.is_none()));
    }

    #[test]
    fn record_sorts_and_truncates_peaks() {
        let mut piano = Piano::new();
        let peaks = (1..=7)
            .map(|n| Peak { frequency: 110.0 * n as f64, magnitude: n as f64 })
            .collect();
        piano.record(24, 110.0, peaks).unwrap();
        let key = piano.key(24).unwrap();
        assert!(key.recorded);
        assert_eq!(key.peaks.len(), MAX_PEAKS);
        assert_eq!(key.peaks[0].magnitude, 7.0);
        assert!(key.peaks.windows(2).all(|w| w[0].magnitude >= w[1].magnitude));
        assert_eq!(piano.recorded_with_peaks(), vec![24]);
    }

    #[test]
    fn non_positive_recording_does_not_count() {
        let mut piano = Piano::new();
        piano
            .record(10, 0.0, vec![Peak { frequency: 50.0, magnitude: 1.0 }])
            .unwrap();
        assert!(piano.recorded_with_peaks().is_empty());
        assert!(piano.record(88, 100.0, Vec::new()).is_err());
    }

    #[test]
    fn wrong_key_count_is_rejected() {
        let keys: Vec<Key> = (0..87).map(Key::new).collect();
        assert!(matches!(Piano::from_keys(keys), Err(TuningError::Validation(_))));

        let mut keys: Vec<Key> = (0..NUM_KEYS).map(Key::new).collect();
        keys[5] = Key::new(6);
        assert!(Piano::from_keys(keys).is_err());
    }

    #[test]
    fn derived_fields_are_recomputed_on_load() {
        let mut keys: Vec<Key> = (0..NUM_KEYS).map(Key::new).collect();
        keys[48].name = "Z9".to_string();
        keys[48].theoretical_frequency = 1.0;
        let piano = Piano::from_keys(keys).unwrap();
        assert_eq!(piano.key(48).unwrap().name(), "A4");
        assert_eq!(piano.key(48).unwrap().theoretical_frequency(), 440.0);
    }

    #[test]
    fn json_document_round_trips_measurements() {
        let mut piano = Piano::new();
        piano
            .record(40, 349.5, vec![Peak { frequency: 699.5, magnitude: 3.0 }])
            .unwrap();
        let json = serde_json::to_string(&piano).unwrap();
        let back: Piano = serde_json::from_str(&json).unwrap();
        assert_eq!(back, piano);
    }
}
