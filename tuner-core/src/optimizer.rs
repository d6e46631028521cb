//! # Global Optimizer
//!
//! Bounded differential evolution (`best/1/bin`) with deferred, generation
//! batched updates. Gradient-free: the entropy surface is
//! piecewise and multi-modal because of the truncated Gaussian windows and
//! the discrete bin assignment.
//!
//! The search runs in the unit hypercube; dimensions whose lower and upper
//! bounds coincide are pinned and never mutated.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::config::EntropyConfig;
use crate::progress::CancelFlag;

/// Smallest population the search will run with.
const MIN_POPULATION: usize = 5;

/// Typed reasons for an optimizer run not producing a usable vector.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizeError {
    #[error("lower bound exceeds upper bound in dimension {0}")]
    InvalidBounds(usize),

    #[error("every dimension is fixed, nothing to optimize")]
    NoFreeDimensions,

    #[error("objective returned a non-finite cost")]
    NonFiniteCost,

    #[error("no convergence within {generations} generations")]
    NotConverged { generations: usize },

    #[error("optimization cancelled")]
    Cancelled,
}

/// Per-dimension closed interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Bounds {
    lower: Vec<f64>,
    upper: Vec<f64>,
}

impl Bounds {
    /// The same symmetric interval `[-limit, limit]` for every dimension.
    pub fn symmetric(dims: usize, limit: f64) -> Self {
        Self {
            lower: vec![-limit; dims],
            upper: vec![limit; dims],
        }
    }

    /// Pins one dimension to a single value.
    pub fn fix(mut self, dim: usize, value: f64) -> Self {
        self.lower[dim] = value;
        self.upper[dim] = value;
        self
    }

    pub fn dims(&self) -> usize {
        self.lower.len()
    }

    pub fn lower(&self) -> &[f64] {
        &self.lower
    }

    pub fn upper(&self) -> &[f64] {
        &self.upper
    }

    pub fn contains(&self, x: &[f64]) -> bool {
        x.len() == self.dims()
            && x
                .iter()
                .zip(self.lower.iter().zip(&self.upper))
                .all(|(v, (lo, hi))| *lo <= *v && *v <= *hi)
    }
}

/// Snapshot handed to the per-generation callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationReport {
    pub generation: usize,
    pub best_cost: f64,
    /// `tolerance / relative spread` of the population costs; reaches 1.0 at convergence.
    pub convergence: f64,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeResult {
    pub x: Vec<f64>,
    pub cost: f64,
    pub generations: usize,
    pub evaluations: usize,
    pub converged: bool,
}

/// Differential evolution settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DifferentialEvolution {
    pub max_generations: usize,
    pub population_multiplier: usize,
    pub tolerance: f64,
    pub mutation: (f64, f64),
    pub recombination: f64,
    pub seed: Option<u64>,
    pub fail_on_non_convergence: bool,
}

impl From<&EntropyConfig> for DifferentialEvolution {
    fn from(cfg: &EntropyConfig) -> Self {
        Self {
            max_generations: cfg.max_generations,
            population_multiplier: cfg.population_multiplier,
            tolerance: cfg.tolerance,
            mutation: cfg.mutation,
            recombination: cfg.recombination,
            seed: cfg.seed,
            fail_on_non_convergence: cfg.fail_on_non_convergence,
        }
    }
}

impl Default for DifferentialEvolution {
    fn default() -> Self {
        Self::from(&EntropyConfig::default())
    }
}

struct Search<'b> {
    bounds: &'b Bounds,
    free: Vec<usize>,
}

impl Search<'_> {
    /// Maps a unit-cube point over the free dimensions onto a full vector.
    fn scale_into(&self, unit: &[f64], out: &mut [f64]) {
        out.copy_from_slice(&self.bounds.lower);
        for (u, &d) in unit.iter().zip(&self.free) {
            let lo = self.bounds.lower[d];
            let hi = self.bounds.upper[d];
            out[d] = (lo + u * (hi - lo)).clamp(lo, hi);
        }
    }
}

fn population_stats(energies: &[f64]) -> (f64, f64) {
    let n = energies.len() as f64;
    let mean = energies.iter().sum::<f64>() / n;
    let var = energies.iter().map(|e| (e - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

fn best_index(energies: &[f64]) -> usize {
    energies
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

impl DifferentialEvolution {
    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    /// Latin hypercube initialization: each column stratified into `pop` slots.
    fn init_population(rng: &mut StdRng, pop: usize, dims: usize) -> Vec<Vec<f64>> {
        let seg = 1.0 / pop as f64;
        let mut population = vec![vec![0.0; dims]; pop];
        let mut order: Vec<usize> = (0..pop).collect();
        for d in 0..dims {
            order.shuffle(rng);
            for (member, &slot) in population.iter_mut().zip(&order) {
                member[d] = (slot as f64 + rng.random::<f64>()) * seg;
            }
        }
        population
    }

    /// Picks two distinct members, both different from `exclude`.
    fn pick_two(rng: &mut StdRng, pop: usize, exclude: usize) -> (usize, usize) {
        let mut draw = |avoid: &[usize]| loop {
            let r = rng.random_range(0..pop);
            if !avoid.contains(&r) {
                return r;
            }
        };
        let r0 = draw(&[exclude]);
        let r1 = draw(&[exclude, r0]);
        (r0, r1)
    }

    /// Minimizes `objective` within `bounds`.
    ///
    /// `on_generation` runs once after every generation. `cancel` is polled
    /// between generations.
    pub fn minimize<F, G>(
        &self,
        bounds: &Bounds,
        mut objective: F,
        mut on_generation: G,
        cancel: &CancelFlag,
    ) -> Result<OptimizeResult, OptimizeError>
    where
        F: FnMut(&[f64]) -> f64,
        G: FnMut(&GenerationReport),
    {
        for d in 0..bounds.dims() {
            if !(bounds.lower[d] <= bounds.upper[d]) {
                return Err(OptimizeError::InvalidBounds(d));
            }
        }
        let free: Vec<usize> = (0..bounds.dims())
            .filter(|&d| bounds.lower[d] < bounds.upper[d])
            .collect();
        if free.is_empty() {
            return Err(OptimizeError::NoFreeDimensions);
        }
        if cancel.is_cancelled() {
            return Err(OptimizeError::Cancelled);
        }
        let search = Search { bounds, free };
        let dims = search.free.len();
        let pop = (self.population_multiplier * dims).max(MIN_POPULATION);

        let mut rng = self.rng();
        let mut scratch = vec![0.0; bounds.dims()];
        let mut evaluations = 0;
        let mut evaluate = |unit: &[f64], scratch: &mut [f64]| -> Result<f64, OptimizeError> {
            search.scale_into(unit, scratch);
            evaluations += 1;
            let cost = objective(scratch);
            if cost.is_nan() {
                Err(OptimizeError::NonFiniteCost)
            } else {
                Ok(cost)
            }
        };

        info!(
            "[OPTIMIZER] Differential evolution: {} free dimensions, population {}, up to {} generations",
            dims, pop, self.max_generations
        );

        let mut population = Self::init_population(&mut rng, pop, dims);
        let mut energies = Vec::with_capacity(pop);
        for member in &population {
            energies.push(evaluate(member, &mut scratch)?);
        }
        let mut best = best_index(&energies);

        let mut converged = false;
        let mut generations = 0;
        let mut trials = vec![vec![0.0; dims]; pop];
        let mut trial_energies = vec![0.0; pop];

        for generation in 1..=self.max_generations {
            if cancel.is_cancelled() {
                return Err(OptimizeError::Cancelled);
            }

            let (lo, hi) = self.mutation;
            let scale = if hi > lo { rng.random_range(lo..hi) } else { lo };

            // Deferred update: every trial is built from the same generation.
            for (i, trial) in trials.iter_mut().enumerate() {
                let (r0, r1) = Self::pick_two(&mut rng, pop, i);
                let fill_point = rng.random_range(0..dims);
                for d in 0..dims {
                    trial[d] = if d == fill_point || rng.random::<f64>() < self.recombination {
                        let v = population[best][d] + scale * (population[r0][d] - population[r1][d]);
                        if (0.0..1.0).contains(&v) { v } else { rng.random::<f64>() }
                    } else {
                        population[i][d]
                    };
                }
            }
            for (trial, energy) in trials.iter().zip(trial_energies.iter_mut()) {
                *energy = evaluate(trial, &mut scratch)?;
            }
            for i in 0..pop {
                if trial_energies[i] < energies[i] {
                    std::mem::swap(&mut population[i], &mut trials[i]);
                    energies[i] = trial_energies[i];
                }
            }
            best = best_index(&energies);
            generations = generation;

            let (mean, spread) = population_stats(&energies);
            let relative_spread = spread / (mean.abs() + f64::EPSILON);
            let convergence = if relative_spread > 0.0 {
                self.tolerance / relative_spread
            } else {
                f64::INFINITY
            };
            let report = GenerationReport {
                generation,
                best_cost: energies[best],
                convergence,
            };
            debug!(
                "[OPTIMIZER] generation {}: best {:.6}, convergence {:.4}",
                generation, report.best_cost, convergence
            );
            on_generation(&report);

            if spread <= self.tolerance * mean.abs() {
                converged = true;
                break;
            }
        }

        if !energies[best].is_finite() {
            return Err(OptimizeError::NonFiniteCost);
        }
        if !converged && self.fail_on_non_convergence {
            return Err(OptimizeError::NotConverged { generations });
        }

        let mut x = vec![0.0; bounds.dims()];
        search.scale_into(&population[best], &mut x);
        info!(
            "[OPTIMIZER] Finished after {} generations ({} evaluations), best cost {:.6}, converged: {}",
            generations, evaluations, energies[best], converged
        );
        Ok(OptimizeResult {
            x,
            cost: energies[best],
            generations,
            evaluations,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(seed: u64) -> DifferentialEvolution {
        DifferentialEvolution {
            max_generations: 200,
            population_multiplier: 15,
            tolerance: 1e-6,
            seed: Some(seed),
            ..DifferentialEvolution::default()
        }
    }

    fn sphere(x: &[f64]) -> f64 {
        x.iter().map(|v| (v - 1.0).powi(2)).sum()
    }

    #[test]
    fn finds_minimum_of_shifted_sphere() {
        let bounds = Bounds::symmetric(3, 5.0);
        let result = settings(1)
            .minimize(&bounds, sphere, |_| {}, &CancelFlag::new())
            .unwrap();
        for v in &result.x {
            assert!((v - 1.0).abs() < 0.05, "{:?}", result.x);
        }
        assert!(bounds.contains(&result.x));
    }

    #[test]
    fn fixed_dimension_stays_pinned() {
        let bounds = Bounds::symmetric(4, 5.0).fix(2, 0.0);
        let result = settings(2)
            .minimize(&bounds, sphere, |_| {}, &CancelFlag::new())
            .unwrap();
        assert_eq!(result.x[2], 0.0);
    }

    #[test]
    fn solution_respects_bounds_when_optimum_is_outside() {
        let bounds = Bounds::symmetric(2, 0.5);
        let result = settings(3)
            .minimize(&bounds, sphere, |_| {}, &CancelFlag::new())
            .unwrap();
        assert!(bounds.contains(&result.x));
        assert!(result.x.iter().all(|v| *v > 0.4));
    }

    #[test]
    fn same_seed_gives_same_result() {
        let bounds = Bounds::symmetric(3, 5.0);
        let a = settings(9).minimize(&bounds, sphere, |_| {}, &CancelFlag::new()).unwrap();
        let b = settings(9).minimize(&bounds, sphere, |_| {}, &CancelFlag::new()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn reports_every_generation() {
        let bounds = Bounds::symmetric(2, 5.0);
        let mut reports = Vec::new();
        let opt = DifferentialEvolution {
            max_generations: 7,
            tolerance: 0.0,
            seed: Some(4),
            ..DifferentialEvolution::default()
        };
        let result = opt
            .minimize(&bounds, sphere, |r| reports.push(*r), &CancelFlag::new())
            .unwrap();
        assert_eq!(reports.len(), 7);
        assert_eq!(result.generations, 7);
        assert!(!result.converged);
        assert!(reports.windows(2).all(|w| w[1].best_cost <= w[0].best_cost));
    }

    #[test]
    fn nan_cost_is_a_typed_failure() {
        let bounds = Bounds::symmetric(2, 1.0);
        let err = settings(5)
            .minimize(&bounds, |_| f64::NAN, |_| {}, &CancelFlag::new())
            .unwrap_err();
        assert_eq!(err, OptimizeError::NonFiniteCost);
    }

    #[test]
    fn non_convergence_can_be_treated_as_failure() {
        let bounds = Bounds::symmetric(2, 5.0);
        let opt = DifferentialEvolution {
            max_generations: 2,
            tolerance: 0.0,
            seed: Some(6),
            fail_on_non_convergence: true,
            ..DifferentialEvolution::default()
        };
        let err = opt.minimize(&bounds, sphere, |_| {}, &CancelFlag::new()).unwrap_err();
        assert_eq!(err, OptimizeError::NotConverged { generations: 2 });
    }

    #[test]
    fn cancelled_before_first_generation() {
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = settings(7)
            .minimize(&Bounds::symmetric(2, 1.0), sphere, |_| {}, &cancel)
            .unwrap_err();
        assert_eq!(err, OptimizeError::Cancelled);
    }

    #[test]
    fn all_fixed_dimensions_are_rejected() {
        let bounds = Bounds::symmetric(1, 1.0).fix(0, 0.0);
        let err = settings(8).minimize(&bounds, sphere, |_| {}, &CancelFlag::new()).unwrap_err();
        assert_eq!(err, OptimizeError::NoFreeDimensions);
    }
}
