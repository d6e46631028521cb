//! Configuration parameters for the entropy tuning computation

use serde::{Deserialize, Serialize};

/// Tunables of the entropy-minimization pipeline.
///
/// Every field has a default, so a partial JSON document is a valid override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyConfig {
    // Data requirements
    /// Minimum number of keys recorded with peaks before optimizing (default: 5)
    pub min_recorded_keys: usize,

    // Search space
    /// Offset bound in cents applied to every key except A4 (default: 50.0)
    pub offset_bound_cents: f64,

    // Differential evolution
    /// Maximum number of generations (default: 50)
    pub max_generations: usize,

    /// Population size as a multiple of the number of free dimensions (default: 10)
    pub population_multiplier: usize,

    /// Relative convergence tolerance on the population's cost spread (default: 0.01)
    pub tolerance: f64,

    /// Mutation factor is drawn uniformly from this range once per generation
    /// (default: 0.5..1.0)
    pub mutation: (f64, f64),

    /// Crossover probability (default: 0.7)
    pub recombination: f64,

    /// Seed for a reproducible run; `None` seeds from the OS (default: None)
    pub seed: Option<u64>,

    /// Treat reaching `max_generations` without converging as a failure that
    /// triggers the fallback path (default: false)
    pub fail_on_non_convergence: bool,

    // Local refinement
    /// Refine the optimizer's winner with a bounded pattern search (default: true)
    pub polish: bool,

    /// First pattern-search step in cents (default: 4.0)
    pub polish_initial_step_cents: f64,

    /// Pattern search stops once its step shrinks below this (default: 0.01)
    pub polish_min_step_cents: f64,

    /// Objective evaluations the pattern search may spend (default: 5000)
    pub polish_max_evaluations: usize,

    // Objective
    /// Weight of the squared adjacent-key difference penalty (default: 0.01)
    pub smoothness_weight: f64,

    /// Weight of the squared offset penalty (default: 0.001)
    pub proximity_weight: f64,

    // Smoothing
    /// Gaussian sigma in keys applied to the interpolated fallback curve (default: 2.0)
    pub fallback_sigma: f64,

    /// Gaussian sigma in keys applied to the winning curve (default: 1.5)
    pub post_sigma: f64,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            min_recorded_keys: 5,
            offset_bound_cents: 50.0,
            max_generations: 50,
            population_multiplier: 10,
            tolerance: 0.01,
            mutation: (0.5, 1.0),
            recombination: 0.7,
            seed: None,
            fail_on_non_convergence: false,
            polish: true,
            polish_initial_step_cents: 4.0,
            polish_min_step_cents: 0.01,
            polish_max_evaluations: 5000,
            smoothness_weight: 0.01,
            proximity_weight: 0.001,
            fallback_sigma: 2.0,
            post_sigma: 1.5,
        }
    }
}
