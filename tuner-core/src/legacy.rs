//! # Legacy Session Conversion
//!
//! Older session files hold a flat array of key records numbered by MIDI note
//! (`id` 21..=108) with abbreviated field names. This converts them into a
//! current [`Piano`].

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::piano::Piano;
use crate::tuning::{self, NUM_KEYS};

/// Offset between legacy ids and key numbers.
pub const LEGACY_ID_OFFSET: i64 = 21;

/// One key record in the legacy format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyKey {
    pub id: i64,
    /// Measured fundamental in Hz
    #[serde(rename = "mFreq", default)]
    pub measured_frequency: f64,
    /// Whether the key was measured
    #[serde(rename = "isM", default)]
    pub is_measured: bool,
    /// Inharmonicity coefficient
    #[serde(rename = "inh", default)]
    pub inharmonicity: f64,
}

/// Converts legacy records into a piano.
///
/// A key counts as recorded when it is flagged measured with a positive
/// frequency. Records with ids outside the keyboard are ignored; missing ids
/// yield unrecorded keys. Later duplicates overwrite earlier ones.
pub fn convert_legacy(records: &[LegacyKey]) -> Piano {
    let mut piano = Piano::new();
    let mut measured = 0;
    for record in records {
        let number = record.id - LEGACY_ID_OFFSET;
        if !(0..NUM_KEYS as i64).contains(&number) {
            warn!("[LEGACY] Ignoring record with id {}", record.id);
            continue;
        }
        let Some(key) = piano.key_mut(number as usize) else {
            continue;
        };
        if record.is_measured && record.measured_frequency > 0.0 {
            let recorded = tuning::round2(record.measured_frequency);
            let deviation =
                tuning::calculate_cents_deviation(record.measured_frequency, key.theoretical_frequency());
            key.recorded_frequency = Some(recorded);
            key.recorded = true;
            key.peaks.clear();
            key.inharmonicity = record.inharmonicity;
            key.tuning_frequency = Some(recorded);
            key.tuning_deviation = tuning::round2(deviation);
            measured += 1;
        }
    }
    info!("[LEGACY] Converted {} records, {} measured keys", records.len(), measured);
    piano
}

/// Reads a legacy JSON file and converts it.
pub fn load_legacy(path: impl AsRef<Path>) -> Result<Piano, PersistenceError> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => PersistenceError::NotFound(path.to_path_buf()),
        _ => PersistenceError::Io(e),
    })?;
    let records: Vec<LegacyKey> = serde_json::from_str(&data)?;
    Ok(convert_legacy(&records))
}
