//! # Tuning Curve Computation
//!
//! Entry point of the core. Dispatches on the selected algorithm, computes all
//! outputs against an immutable view of the piano and writes them back in a
//! single pass at the end, so no partially updated keyboard is ever observable.

use log::{info, warn};

use crate::config::EntropyConfig;
use crate::entropy::EntropyObjective;
use crate::error::TuningError;
use crate::fallback;
use crate::inharmonicity;
use crate::optimizer::{Bounds, DifferentialEvolution, OptimizeError, OptimizeResult};
use crate::piano::{KeyOutputs, Piano};
use crate::polish::PatternSearch;
use crate::postprocess;
use crate::progress::{CancelFlag, ProgressObserver, ProgressReporter};
use crate::spectrum::SpectrumSynthesizer;
use crate::strategies::{self, TuningAlgorithm};
use crate::tuning::{A4_INDEX, NUM_KEYS};

/// Progress window occupied by the optimizer's generations.
const OPTIMIZER_PROGRESS_START: u8 = 20;
const OPTIMIZER_PROGRESS_SPAN: f64 = 60.0;

/// Which path produced the curve.
#[derive(Debug, Clone, PartialEq)]
pub enum CurveOutcome {
    /// Entropy minimization converged or ran out of generations normally.
    Optimized {
        cost: f64,
        generations: usize,
        converged: bool,
    },
    /// The optimizer failed and the interpolated fallback was used.
    Fallback { reason: OptimizeError },
    /// Too few recorded keys; equal temperament was used.
    InsufficientData { recorded: usize },
    /// One of the closed-form strategies ran.
    ClosedForm(TuningAlgorithm),
}

/// Outputs plus the path that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct CurveResult {
    pub outputs: Vec<KeyOutputs>,
    /// Final offsets in cents for the entropy path, empty otherwise.
    pub offsets: Vec<f64>,
    pub outcome: CurveOutcome,
}

/// Computes the tuning curve and writes it onto `piano`.
///
/// On error (`Cancelled`) the piano is left untouched.
pub fn compute_tuning_curve(
    piano: &mut Piano,
    algorithm: TuningAlgorithm,
    config: &EntropyConfig,
    observer: &dyn ProgressObserver,
    cancel: &CancelFlag,
) -> Result<CurveOutcome, TuningError> {
    let result = plan_tuning_curve(piano, algorithm, config, observer, cancel)?;
    piano.apply_outputs(&result.outputs);
    Ok(result.outcome)
}

/// Computes the tuning curve without modifying `piano`.
pub fn plan_tuning_curve(
    piano: &Piano,
    algorithm: TuningAlgorithm,
    config: &EntropyConfig,
    observer: &dyn ProgressObserver,
    cancel: &CancelFlag,
) -> Result<CurveResult, TuningError> {
    if piano.keys().len() != NUM_KEYS {
        return Err(TuningError::Validation(format!(
            "expected {} keys, got {}",
            NUM_KEYS,
            piano.keys().len()
        )));
    }
    info!("[TUNING] Computing tuning curve with {}", algorithm);
    let reporter = ProgressReporter::new(observer);

    let closed_form = match algorithm {
        TuningAlgorithm::EntropyMinimization => {
            return entropy_minimization(piano, config, &reporter, cancel);
        }
        TuningAlgorithm::EqualTemperament => strategies::equal_temperament(piano, &reporter, cancel)?,
        TuningAlgorithm::CopyRecording => strategies::copy_recording(piano, &reporter, cancel)?,
        TuningAlgorithm::StretchTuning => strategies::stretch_tuning(piano, &reporter, cancel)?,
        TuningAlgorithm::Inharmonicity => strategies::inharmonicity_stretch(piano, &reporter, cancel)?,
    };
    Ok(CurveResult {
        outputs: closed_form,
        offsets: Vec::new(),
        outcome: CurveOutcome::ClosedForm(algorithm),
    })
}

fn entropy_minimization(
    piano: &Piano,
    config: &EntropyConfig,
    reporter: &ProgressReporter<'_>,
    cancel: &CancelFlag,
) -> Result<CurveResult, TuningError> {
    reporter.report(0, "Initializing entropy calculation...");

    let recorded = piano.recorded_with_peaks();
    let coefficients = inharmonicity::estimate_all(piano);

    if recorded.len() < config.min_recorded_keys {
        info!(
            "[ENTROPY] {} recorded keys, need {}; using equal temperament",
            recorded.len(),
            config.min_recorded_keys
        );
        let outputs = piano
            .keys()
            .iter()
            .zip(&coefficients)
            .map(|(key, &b)| KeyOutputs {
                inharmonicity: b,
                computed_frequency: Some(key.theoretical_frequency()),
                tuning_frequency: Some(key.theoretical_frequency()),
                tuning_deviation: 0.0,
            })
            .collect();
        reporter.report(100, "Insufficient data - using equal temperament");
        return Ok(CurveResult {
            outputs,
            offsets: vec![0.0; NUM_KEYS],
            outcome: CurveOutcome::InsufficientData {
                recorded: recorded.len(),
            },
        });
    }

    reporter.report(5, format!("Found {} recorded keys", recorded.len()));
    reporter.report(10, "Estimated inharmonicity coefficients");

    let bounds = Bounds::symmetric(NUM_KEYS, config.offset_bound_cents).fix(A4_INDEX, 0.0);
    let mut objective = EntropyObjective::new(
        SpectrumSynthesizer::from_piano(piano),
        config.smoothness_weight,
        config.proximity_weight,
    );
    reporter.report(15, "Setting up optimization problem...");
    reporter.report(OPTIMIZER_PROGRESS_START, "Starting optimization...");

    let search = DifferentialEvolution::from(config)
        .minimize(
            &bounds,
            |offsets| objective.cost(offsets),
            |generation| {
                let step = (OPTIMIZER_PROGRESS_SPAN * generation.convergence.min(1.0)).max(0.0);
                reporter.report(OPTIMIZER_PROGRESS_START + step as u8, "Optimizing tuning curve...");
            },
            cancel,
        )
        .and_then(|result| {
            if !config.polish {
                return Ok(result);
            }
            reporter.report(OPTIMIZER_PROGRESS_START + OPTIMIZER_PROGRESS_SPAN as u8, "Refining tuning curve...");
            let spectral_keys = objective.synthesizer().key_indices();
            let polished = PatternSearch::from(config).refine(
                &result.x,
                &bounds,
                &spectral_keys,
                |offsets| objective.cost(offsets),
                cancel,
            )?;
            Ok(OptimizeResult {
                x: polished.x,
                cost: polished.cost,
                evaluations: result.evaluations + polished.evaluations,
                ..result
            })
        });

    let (offsets, outcome) = match search {
        Ok(result) => {
            reporter.report(80, "Optimization complete");
            let outcome = CurveOutcome::Optimized {
                cost: result.cost,
                generations: result.generations,
                converged: result.converged,
            };
            (result.x, outcome)
        }
        Err(OptimizeError::Cancelled) => return Err(TuningError::Cancelled),
        Err(reason) => {
            warn!("[ENTROPY] Optimization failed: {}; using fallback curve", reason);
            reporter.report(80, format!("Optimization failed: {}, using fallback", reason));
            let offsets =
                fallback::interpolated_offsets(piano, &recorded, config.fallback_sigma, cancel)?;
            (offsets, CurveOutcome::Fallback { reason })
        }
    };

    reporter.report(85, "Applying tuning curve...");
    let curve = postprocess::finalize(piano, &offsets, &coefficients, config.post_sigma, cancel)?;
    reporter.report(100, "Entropy tuning calculation complete");

    Ok(CurveResult {
        outputs: curve.outputs,
        offsets: curve.offsets,
        outcome,
    })
}
