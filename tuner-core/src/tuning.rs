//! # Musical Tuning Module
//!
//! Reference frame for the whole crate: the 88 keys of a standard piano under
//! 12-tone equal temperament with A4 = 440 Hz.
//!
//! ## Features
//! - 88-key piano note mapping (A0 to C8)
//! - Equal temperament frequency calculations
//! - Cent deviation calculations
//! - Note name to key index conversions and nearest-note search

use once_cell::sync::Lazy;
use std::collections::BTreeMap;

/// Number of keys on a standard piano.
pub const NUM_KEYS: usize = 88;

/// Index of A4 in the 0-based key numbering.
pub const A4_INDEX: usize = 48;

/// Concert pitch for A4 in Hz.
pub const CONCERT_PITCH: f64 = 440.0;

const NOTE_NAMES: [&str; 12] = [
    "A", "A#", "B", "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#",
];

/// Represents a single musical note with its name and frequency.
#[derive(Debug, Clone)]
pub struct Note {
    /// Note name (e.g., "A4", "C#3")
    pub name: String,
    /// Equal temperament frequency in Hz
    pub frequency: f64,
}

/// Statically computed notes for a standard 88-key piano (A0 to C8).
static NOTES: Lazy<Vec<Note>> = Lazy::new(|| {
    (0..NUM_KEYS)
        .map(|i| Note {
            name: key_name(i),
            frequency: theoretical_frequency(i),
        })
        .collect()
});

/// Static map for quick note name to key index lookups.
static NOTE_MAP: Lazy<BTreeMap<String, usize>> = Lazy::new(|| {
    NOTES
        .iter()
        .enumerate()
        .map(|(i, note)| (note.name.clone(), i))
        .collect()
});

/// Equal temperament frequency of a key: `440 * 2^((i - 48) / 12)`.
///
/// Pure function of the index; `theoretical_frequency(48)` is exactly 440.0.
pub fn theoretical_frequency(key_index: usize) -> f64 {
    let semitones_from_a4 = key_index as f64 - A4_INDEX as f64;
    CONCERT_PITCH * 2.0_f64.powf(semitones_from_a4 / 12.0)
}

/// Note name for a key index.
///
/// The keyboard starts at A0, so the note class cycles from A. A, A# and B
/// belong to octave `i / 12`; C through G# already belong to the next octave.
pub fn key_name(key_index: usize) -> String {
    let note_index = key_index % 12;
    let octave = if note_index <= 2 {
        key_index / 12
    } else {
        key_index / 12 + 1
    };
    format!("{}{}", NOTE_NAMES[note_index], octave)
}

/// Finds the closest key to a given frequency.
///
/// # Returns
/// * `(key_index, note_name, target_frequency)`, or `None` for non-positive
///   or non-finite input
pub fn find_nearest_note(freq: f64) -> Option<(usize, String, f64)> {
    if !(freq.is_finite() && freq > 0.0) {
        return None;
    }
    // Distance in cents keeps the search symmetric across the keyboard.
    NOTES
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            let diff_a = calculate_cents_deviation(freq, a.frequency).abs();
            let diff_b = calculate_cents_deviation(freq, b.frequency).abs();
            diff_a.total_cmp(&diff_b)
        })
        .map(|(i, note)| (i, note.name.clone(), note.frequency))
}

/// Gets the 88-key piano index from a note name such as "A4" or "C#3".
pub fn get_key_index_from_name(name: &str) -> Option<usize> {
    NOTE_MAP.get(name).copied()
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values are flat.
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}

/// Frequency multiplier for an offset in cents.
pub fn cents_to_ratio(cents: f64) -> f64 {
    2.0_f64.powf(cents / 1200.0)
}

/// Rounds to two decimals, the precision of every stored output field.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_concert_pitch() {
        assert_eq!(theoretical_frequency(A4_INDEX), 440.0);
    }

    #[test]
    fn frequencies_follow_equal_temperament() {
        for i in 0..NUM_KEYS {
            let expected = 440.0 * 2.0_f64.powf((i as f64 - 48.0) / 12.0);
            assert_eq!(theoretical_frequency(i), expected);
        }
        for i in 1..NUM_KEYS {
            assert!(theoretical_frequency(i) > theoretical_frequency(i - 1));
        }
        assert!((theoretical_frequency(0) - 27.5).abs() < 1e-9);
    }

    #[test]
    fn octave_changes_at_c() {
        assert_eq!(key_name(0), "A0");
        assert_eq!(key_name(2), "B0");
        assert_eq!(key_name(3), "C1");
        assert_eq!(key_name(12), "A1");
        assert_eq!(key_name(39), "C4");
        assert_eq!(key_name(48), "A4");
        assert_eq!(key_name(51), "C5");
        assert_eq!(key_name(87), "C8");
    }

    #[test]
    fn name_lookup_round_trips() {
        assert_eq!(get_key_index_from_name("A4"), Some(48));
        assert_eq!(get_key_index_from_name("C#3"), Some(28));
        assert_eq!(get_key_index_from_name("H2"), None);
    }

    #[test]
    fn nearest_note_prefers_closest_in_cents() {
        let (index, name, freq) = find_nearest_note(443.0).unwrap();
        assert_eq!(index, 48);
        assert_eq!(name, "A4");
        assert_eq!(freq, 440.0);
        assert!(find_nearest_note(0.0).is_none());
    }

    #[test]
    fn cents_are_logarithmic() {
        assert!((calculate_cents_deviation(880.0, 440.0) - 1200.0).abs() < 1e-9);
        assert!((cents_to_ratio(1200.0) - 2.0).abs() < 1e-12);
        assert_eq!(round2(1.23456), 1.23);
    }
}
