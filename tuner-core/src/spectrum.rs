//! # Spectrum Synthesis
//!
//! Renders the combined power spectrum of every recorded key for a candidate
//! tuning-offset vector. Each measured partial keeps its measured ratio to the
//! recorded fundamental and is re-based onto the candidate tuning, then drawn
//! as a truncated Gaussian bump on a fixed 0.1 Hz grid.
//!
//! The grid buffer lives for a whole optimization run. Between evaluations only
//! the windows written by the previous evaluation are zeroed again, and the
//! merged list of those windows is handed to the objective so that summing and
//! entropy never visit untouched bins.

use std::ops::Range;

use crate::piano::Piano;
use crate::tuning;

/// Lowest grid frequency in Hz.
pub const GRID_MIN_HZ: f64 = 20.0;
/// Upper grid bound in Hz (exclusive).
pub const GRID_MAX_HZ: f64 = 10_000.0;
/// Grid resolution in Hz.
pub const GRID_RESOLUTION_HZ: f64 = 0.1;
/// Number of bins in `[GRID_MIN_HZ, GRID_MAX_HZ)`.
pub const GRID_BINS: usize = 99_800;

/// Gaussian windows are cut off at this many standard deviations.
const TRUNCATION_SIGMAS: f64 = 5.0;

/// Grid bin nearest to a frequency, or `None` outside the grid.
pub fn nearest_bin(freq: f64) -> Option<usize> {
    let pos = ((freq - GRID_MIN_HZ) / GRID_RESOLUTION_HZ).round();
    if pos.is_finite() && pos >= 0.0 && pos < GRID_BINS as f64 {
        Some(pos as usize)
    } else {
        None
    }
}

/// Width in bins of the bump drawn for a partial; higher partials are wider.
pub fn partial_sigma_bins(partial_ratio: f64) -> f64 {
    (0.5 + 0.1 * partial_ratio) / GRID_RESOLUTION_HZ
}

#[derive(Debug, Clone)]
struct Partial {
    ratio: f64,
    magnitude: f64,
    sigma: f64,
    radius: usize,
}

#[derive(Debug, Clone)]
struct KeySource {
    index: usize,
    theoretical_frequency: f64,
    partials: Vec<Partial>,
}

/// A synthesized spectrum together with the bin ranges that may be non-zero.
#[derive(Debug, Clone, Copy)]
pub struct Spectrum<'a> {
    bins: &'a [f64],
    spans: &'a [Range<usize>],
}

impl<'a> Spectrum<'a> {
    /// Wraps bins produced elsewhere, with explicit active spans.
    pub fn new(bins: &'a [f64], spans: &'a [Range<usize>]) -> Self {
        Self { bins, spans }
    }

    pub fn bins(&self) -> &'a [f64] {
        self.bins
    }

    /// Sorted, disjoint ranges outside which every bin is zero.
    pub fn spans(&self) -> &'a [Range<usize>] {
        self.spans
    }

    /// Iterates the values of all active bins.
    pub fn active_values(&self) -> impl Iterator<Item = f64> + 'a {
        let bins = self.bins;
        self.spans
            .iter()
            .flat_map(move |span| bins[span.clone()].iter().copied())
    }

    pub fn sum(&self) -> f64 {
        self.active_values().sum()
    }
}

/// Reusable renderer of the combined spectrum of all recorded keys.
#[derive(Debug, Clone)]
pub struct SpectrumSynthesizer {
    sources: Vec<KeySource>,
    buffer: Vec<f64>,
    written: Vec<Range<usize>>,
    spans: Vec<Range<usize>>,
}

impl SpectrumSynthesizer {
    /// Collects the partial layout of every key recorded with peaks.
    ///
    /// Keys without a positive recorded fundamental or without peaks are
    /// skipped, as are peaks with a non-positive frequency.
    pub fn from_piano(piano: &Piano) -> Self {
        let sources = piano
            .keys()
            .iter()
            .filter_map(|key| {
                let fundamental = key.usable_recorded_frequency()?;
                let partials: Vec<Partial> = key
                    .peaks
                    .iter()
                    .filter(|p| p.frequency > 0.0)
                    .map(|p| {
                        let ratio = p.frequency / fundamental;
                        let sigma = partial_sigma_bins(ratio);
                        Partial {
                            ratio,
                            magnitude: p.magnitude,
                            sigma,
                            radius: (TRUNCATION_SIGMAS * sigma) as usize,
                        }
                    })
                    .collect();
                (!partials.is_empty()).then(|| KeySource {
                    index: key.number(),
                    theoretical_frequency: key.theoretical_frequency(),
                    partials,
                })
            })
            .collect();

        Self {
            sources,
            buffer: vec![0.0; GRID_BINS],
            written: Vec::new(),
            spans: Vec::new(),
        }
    }

    /// Number of keys contributing to the spectrum.
    pub fn key_count(&self) -> usize {
        self.sources.len()
    }

    /// Key indices contributing to the spectrum, ascending.
    pub fn key_indices(&self) -> Vec<usize> {
        self.sources.iter().map(|s| s.index).collect()
    }

    /// Renders the spectrum for `offsets` (cents per key, indexed by key number).
    pub fn synthesize(&mut self, offsets: &[f64]) -> Spectrum<'_> {
        for range in self.written.drain(..) {
            self.buffer[range].fill(0.0);
        }

        for source in &self.sources {
            let offset = offsets.get(source.index).copied().unwrap_or(0.0);
            let base_freq = source.theoretical_frequency * tuning::cents_to_ratio(offset);

            for partial in &source.partials {
                let Some(centre) = nearest_bin(base_freq * partial.ratio) else {
                    continue;
                };
                let start = centre.saturating_sub(partial.radius);
                let end = (centre + partial.radius + 1).min(GRID_BINS);
                let inv_two_var = 0.5 / (partial.sigma * partial.sigma);
                for (bin, value) in self.buffer[start..end].iter_mut().enumerate() {
                    let d = (start + bin) as f64 - centre as f64;
                    *value += partial.magnitude * (-d * d * inv_two_var).exp();
                }
                self.written.push(start..end);
            }
        }

        merge_ranges(&self.written, &mut self.spans);
        Spectrum::new(&self.buffer, &self.spans)
    }
}

/// Sorts and merges overlapping or touching ranges into `out`.
fn merge_ranges(ranges: &[Range<usize>], out: &mut Vec<Range<usize>>) {
    out.clear();
    out.extend(ranges.iter().cloned());
    out.sort_by_key(|r| r.start);
    let mut merged = 0;
    for i in 0..out.len() {
        if merged > 0 && out[i].start <= out[merged - 1].end {
            out[merged - 1].end = out[merged - 1].end.max(out[i].end);
        } else {
            out[merged] = out[i].clone();
            merged += 1;
        }
    }
    out.truncate(merged);
}
