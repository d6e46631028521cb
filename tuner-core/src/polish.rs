//! # Local Refinement
//!
//! Bounded, derivative-free polishing of the optimizer's winning vector.
//!
//! Only keys that carry spectral data influence the entropy term. Every other
//! free key appears in the cost through the smoothness and proximity
//! penalties alone, a quadratic whose minimizer for fixed neighbours is found
//! exactly by one tridiagonal solve. The pattern search therefore moves the
//! spectral keys one compass step at a time and re-solves the passive keys
//! after every step, so each candidate it scores is already the smoothest
//! curve through those spectral offsets.

use log::{debug, info};

use crate::config::EntropyConfig;
use crate::optimizer::{Bounds, OptimizeError};
use crate::progress::CancelFlag;

/// Compass search settings plus the penalty weights of the objective.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternSearch {
    pub initial_step: f64,
    pub min_step: f64,
    pub max_evaluations: usize,
    pub smoothness_weight: f64,
    pub proximity_weight: f64,
}

impl From<&EntropyConfig> for PatternSearch {
    fn from(cfg: &EntropyConfig) -> Self {
        Self {
            initial_step: cfg.polish_initial_step_cents,
            min_step: cfg.polish_min_step_cents,
            max_evaluations: cfg.polish_max_evaluations,
            smoothness_weight: cfg.smoothness_weight,
            proximity_weight: cfg.proximity_weight,
        }
    }
}

/// Refined vector and its cost.
#[derive(Debug, Clone, PartialEq)]
pub struct PolishResult {
    pub x: Vec<f64>,
    pub cost: f64,
    pub evaluations: usize,
}

/// Replaces every `passive` component of `x` by the exact minimizer of
/// `ws·Σ(x[i+1]-x[i])² + wp·Σx[i]²` with all other components held, then
/// clamps into `bounds`.
///
/// Does nothing when both weights are zero (the minimizer is not unique).
pub fn relax_passive(x: &mut [f64], passive: &[bool], bounds: &Bounds, ws: f64, wp: f64) {
    let n = x.len();
    if n == 0 || !passive.iter().any(|&p| p) || !(ws >= 0.0 && wp >= 0.0 && ws + wp > 0.0) {
        return;
    }

    // Thomas algorithm on rows `a[i]·x[i-1] + b[i]·x[i] + c[i]·x[i+1] = d[i]`.
    // Held rows are the identity, passive rows are diagonally dominant.
    let mut c_prime = vec![0.0; n];
    let mut d_prime = vec![0.0; n];
    for i in 0..n {
        let (a, b, c, d) = if passive[i] {
            let left = if i > 0 { ws } else { 0.0 };
            let right = if i + 1 < n { ws } else { 0.0 };
            (-left, left + right + wp, -right, 0.0)
        } else {
            (0.0, 1.0, 0.0, x[i])
        };
        let (prev_c, prev_d) = if i > 0 { (c_prime[i - 1], d_prime[i - 1]) } else { (0.0, 0.0) };
        let m = b - a * prev_c;
        c_prime[i] = c / m;
        d_prime[i] = (d - a * prev_d) / m;
    }
    x[n - 1] = d_prime[n - 1];
    for i in (0..n - 1).rev() {
        x[i] = d_prime[i] - c_prime[i] * x[i + 1];
    }

    for (i, v) in x.iter_mut().enumerate() {
        if passive[i] {
            *v = v.clamp(bounds.lower()[i], bounds.upper()[i]);
        }
    }
}

impl PatternSearch {
    /// Refines `start` within `bounds`.
    ///
    /// `active` lists the dimensions the objective depends on beyond the
    /// penalties; all other free dimensions are relaxed exactly. The search
    /// also considers the all-zero (equal temperament) curve as a starting
    /// point and keeps whichever scores lower, so the result never costs more
    /// than either. Steps are halved after a sweep without improvement.
    pub fn refine<F>(
        &self,
        start: &[f64],
        bounds: &Bounds,
        active: &[usize],
        mut objective: F,
        cancel: &CancelFlag,
    ) -> Result<PolishResult, OptimizeError>
    where
        F: FnMut(&[f64]) -> f64,
    {
        let dims = bounds.dims();
        let (lower, upper) = (bounds.lower(), bounds.upper());
        let free = |d: usize| lower[d] < upper[d];
        let active: Vec<usize> = active.iter().copied().filter(|&d| d < dims && free(d)).collect();
        let mut passive: Vec<bool> = (0..dims).map(free).collect();
        for &d in &active {
            passive[d] = false;
        }

        let mut evaluations = 0;
        let mut score = |x: &[f64], evaluations: &mut usize| -> Result<f64, OptimizeError> {
            *evaluations += 1;
            let cost = objective(x);
            if cost.is_nan() { Err(OptimizeError::NonFiniteCost) } else { Ok(cost) }
        };

        let relax = |x: &mut [f64]| {
            relax_passive(x, &passive, bounds, self.smoothness_weight, self.proximity_weight)
        };

        let mut x: Vec<f64> = start
            .iter()
            .enumerate()
            .map(|(d, v)| v.clamp(lower[d], upper[d]))
            .collect();
        relax(&mut x);
        let mut cost = score(&x, &mut evaluations)?;

        let mut flat: Vec<f64> = (0..dims).map(|d| 0.0_f64.clamp(lower[d], upper[d])).collect();
        relax(&mut flat);
        let flat_cost = score(&flat, &mut evaluations)?;
        if flat_cost < cost {
            debug!("[POLISH] Equal temperament start beats the optimizer's winner");
            x = flat;
            cost = flat_cost;
        }
        let start_cost = cost;

        let mut step = self.initial_step;
        let mut trial = x.clone();
        while step >= self.min_step && evaluations < self.max_evaluations {
            if cancel.is_cancelled() {
                return Err(OptimizeError::Cancelled);
            }
            let mut improved = false;
            for &d in &active {
                for direction in [1.0, -1.0] {
                    let moved = (x[d] + direction * step).clamp(lower[d], upper[d]);
                    if moved == x[d] {
                        continue;
                    }
                    trial.copy_from_slice(&x);
                    trial[d] = moved;
                    relax(&mut trial);
                    let trial_cost = score(&trial, &mut evaluations)?;
                    if trial_cost < cost {
                        std::mem::swap(&mut x, &mut trial);
                        cost = trial_cost;
                        improved = true;
                        break;
                    }
                }
            }
            if !improved {
                step *= 0.5;
            }
        }

        info!(
            "[POLISH] Cost {:.6} -> {:.6} in {} evaluations",
            start_cost, cost, evaluations
        );
        Ok(PolishResult { x, cost, evaluations })
    }
}
