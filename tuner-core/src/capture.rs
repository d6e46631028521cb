//! # Capture Analysis
//!
//! Turns a recorded mono buffer of a single key into the measurement the core
//! works with: a fundamental and up to five magnitude-sorted spectral peaks.
//! Recording itself (microphone access) happens outside this crate.

use log::{debug, warn};

use crate::error::TuningError;
use crate::fft;
use crate::piano::{MAX_PEAKS, Peak, Piano};

/// Peaks below this fraction of the strongest bin are ignored.
const RELATIVE_HEIGHT: f64 = 0.1;

/// Number of candidate peaks (lowest first) considered before ranking.
const CANDIDATE_PEAKS: usize = 10;

/// Frequencies at or below this are ignored.
const MIN_FREQUENCY_HZ: f64 = 20.0;

/// Result of analyzing one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureAnalysis {
    /// Frequency of the strongest peak, taken as the fundamental
    pub fundamental: f64,
    /// Strongest peaks, magnitude descending, at most [`MAX_PEAKS`]
    pub peaks: Vec<Peak>,
}

/// Indices of local maxima at least `min_height` high. A flat top counts
/// once, at its middle.
fn local_maxima(mags: &[f64], min_height: f64) -> Vec<usize> {
    let mut peaks = Vec::new();
    let mut i = 1;
    while i + 1 < mags.len() {
        if mags[i] > mags[i - 1] {
            let mut ahead = i + 1;
            while ahead + 1 < mags.len() && mags[ahead] == mags[i] {
                ahead += 1;
            }
            if mags[ahead] < mags[i] {
                if mags[i] >= min_height {
                    peaks.push((i + ahead - 1) / 2);
                }
                i = ahead;
                continue;
            }
        }
        i += 1;
    }
    peaks
}

/// Analyzes a mono recording.
///
/// Returns `None` for silence or a buffer without any qualifying peak.
pub fn analyze_recording(samples: &[f32], sample_rate: u32) -> Option<CaptureAnalysis> {
    if samples.len() < 4 || sample_rate == 0 {
        return None;
    }
    let spectrum = fft::magnitude_spectrum(samples, sample_rate);
    let max = spectrum.max();
    if !(max > 1e-9) {
        return None;
    }

    let mut peaks: Vec<Peak> = local_maxima(&spectrum.magnitudes, max * RELATIVE_HEIGHT)
        .into_iter()
        .take(CANDIDATE_PEAKS)
        .map(|bin| Peak {
            frequency: spectrum.frequency(bin),
            magnitude: spectrum.magnitudes[bin],
        })
        .filter(|p| p.frequency > MIN_FREQUENCY_HZ)
        .collect();
    peaks.sort_by(|a, b| b.magnitude.total_cmp(&a.magnitude));
    peaks.truncate(MAX_PEAKS);

    let fundamental = peaks.first()?.frequency;
    debug!("[CAPTURE] fundamental {:.2} Hz, {} peaks", fundamental, peaks.len());
    Some(CaptureAnalysis { fundamental, peaks })
}

/// Analyzes a recording and stores the measurement on `key_index`.
///
/// Returns the detected fundamental, or `None` (piano untouched) when nothing
/// usable was found.
pub fn capture_key(
    piano: &mut Piano,
    key_index: usize,
    samples: &[f32],
    sample_rate: u32,
) -> Result<Option<f64>, TuningError> {
    if piano.key(key_index).is_none() {
        return Err(TuningError::Validation(format!("no key with index {}", key_index)));
    }
    match analyze_recording(samples, sample_rate) {
        Some(analysis) => {
            piano.record(key_index, analysis.fundamental, analysis.peaks)?;
            Ok(Some(analysis.fundamental))
        }
        None => {
            warn!("[CAPTURE] No usable peaks in recording for key {}", key_index);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(partials: &[(f32, f32)], sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32 / sample_rate as f32;
                partials
                    .iter()
                    .map(|(f, a)| a * (2.0 * std::f32::consts::PI * f * t).sin())
                    .sum()
            })
            .collect()
    }

    #[test]
    fn finds_fundamental_and_partials() {
        let signal = tone(&[(220.0, 1.0), (440.0, 0.5), (660.0, 0.3)], 8000, 8000);
        let analysis = analyze_recording(&signal, 8000).unwrap();
        assert_eq!(analysis.fundamental, 220.0);
        let freqs: Vec<f64> = analysis.peaks.iter().map(|p| p.frequency).collect();
        assert_eq!(freqs, vec![220.0, 440.0, 660.0]);
    }

    #[test]
    fn silence_yields_nothing() {
        assert!(analyze_recording(&[0.0; 1024], 8000).is_none());
    }

    #[test]
    fn capture_records_the_key() {
        let mut piano = Piano::new();
        let signal = tone(&[(440.0, 1.0), (880.0, 0.4)], 8000, 8000);
        let f = capture_key(&mut piano, 48, &signal, 8000).unwrap();
        assert_eq!(f, Some(440.0));
        let key = piano.key(48).unwrap();
        assert!(key.recorded);
        assert_eq!(key.peaks.len(), 2);
        assert!(capture_key(&mut piano, 200, &signal, 8000).is_err());
    }

    #[test]
    fn plateau_counts_once() {
        assert_eq!(local_maxima(&[0.0, 1.0, 1.0, 1.0, 0.0], 0.5), vec![2]);
        assert_eq!(local_maxima(&[0.0, 2.0, 0.0, 0.1, 0.0], 0.5), vec![1]);
    }
}
