//! Projected-gradient solver for the allocation problem.
//!
//! Bounds and the budget equality are handled exactly by Euclidean projection
//! onto `{lo <= w <= hi, Σw = budget}`; group caps enter as a quadratic
//! penalty. Step length is chosen by Armijo backtracking along the projection
//! arc.

use crate::domain::bounds::{Bound, ConstraintSet};
use crate::domain::error::RebalancerError;
use crate::ports::optimizer_port::{OptimizationProblem, OptimizerPort, Solution};
use std::time::Instant;
use tracing::trace;

const ARMIJO: f64 = 1e-4;
const MIN_STEP: f64 = 1e-20;
const MAX_STEP: f64 = 1e8;
const BISECTION_ROUNDS: usize = 200;
const CONSTRAINT_TOLERANCE: f64 = 1e-6;

pub struct ProjectedGradientOptimizer {
    penalty: f64,
}

impl ProjectedGradientOptimizer {
    pub fn new() -> Self {
        Self { penalty: 1e6 }
    }

    pub fn with_penalty(penalty: f64) -> Self {
        Self { penalty }
    }

    fn penalty_value(&self, w: &[f64], constraints: &ConstraintSet) -> f64 {
        constraints
            .group_caps
            .iter()
            .map(|g| {
                let excess = (g.indices.iter().map(|&i| w[i]).sum::<f64>() - g.cap).max(0.0);
                self.penalty * excess * excess
            })
            .sum()
    }

    fn penalty_gradient(&self, w: &[f64], constraints: &ConstraintSet, grad: &mut [f64]) {
        for g in &constraints.group_caps {
            let excess = (g.indices.iter().map(|&i| w[i]).sum::<f64>() - g.cap).max(0.0);
            if excess > 0.0 {
                for &i in &g.indices {
                    grad[i] += 2.0 * self.penalty * excess;
                }
            }
        }
    }
}

impl Default for ProjectedGradientOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Euclidean projection of `v` onto the bounded hyperplane `Σw = budget`.
///
/// The clamped sum `Σ clamp(v_i - τ)` is non-increasing in the shift `τ`, so
/// the shift is found by bisection.
pub fn project(v: &[f64], bounds: &[Bound], budget: f64) -> Vec<f64> {
    let shifted_sum = |tau: f64| -> f64 {
        v.iter()
            .zip(bounds.iter())
            .map(|(x, b)| (x - tau).clamp(b.lower, b.upper))
            .sum()
    };

    let mut lo = v
        .iter()
        .zip(bounds.iter())
        .map(|(x, b)| x - b.upper)
        .fold(f64::INFINITY, f64::min)
        - 1.0;
    let mut hi = v
        .iter()
        .zip(bounds.iter())
        .map(|(x, b)| x - b.lower)
        .fold(f64::NEG_INFINITY, f64::max)
        + 1.0;

    for _ in 0..BISECTION_ROUNDS {
        let mid = 0.5 * (lo + hi);
        let s = shifted_sum(mid);
        if (s - budget).abs() <= f64::EPSILON * budget.abs().max(1.0) {
            lo = mid;
            hi = mid;
            break;
        }
        if s > budget {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let tau = 0.5 * (lo + hi);
    v.iter()
        .zip(bounds.iter())
        .map(|(x, b)| (x - tau).clamp(b.lower, b.upper))
        .collect()
}

fn check_dimensions(problem: &OptimizationProblem<'_>) -> Result<(), RebalancerError> {
    let n = problem.expected_returns.len();
    let square = problem.covariance.len() == n && problem.covariance.iter().all(|r| r.len() == n);
    if !square || problem.bounds.len() != n || problem.initial_guess.len() != n {
        return Err(RebalancerError::Data {
            reason: format!(
                "optimizer input dimensions disagree: {} returns, {}x? covariance, {} bounds, {} guess",
                n,
                problem.covariance.len(),
                problem.bounds.len(),
                problem.initial_guess.len()
            ),
        });
    }
    let finite = problem.expected_returns.iter().all(|v| v.is_finite())
        && problem.covariance.iter().flatten().all(|v| v.is_finite());
    if !finite {
        return Err(RebalancerError::Data {
            reason: "expected returns or covariance contain non-finite values".into(),
        });
    }
    Ok(())
}

impl OptimizerPort for ProjectedGradientOptimizer {
    fn solve(&self, problem: &OptimizationProblem<'_>) -> Result<Solution, RebalancerError> {
        check_dimensions(problem)?;

        let mu = problem.expected_returns;
        let cov = problem.covariance;
        let budget = problem.constraints.budget;
        let settings = problem.settings;
        let started = Instant::now();

        let total = |w: &[f64]| {
            problem.objective.value(w, mu, cov) + self.penalty_value(w, problem.constraints)
        };

        let mut w = project(&problem.initial_guess, problem.bounds, budget);
        let mut f = total(&w);
        let mut step = 1.0;
        let mut converged = false;
        let mut iterations = 0;

        while iterations < settings.max_iterations {
            if let Some(limit) = settings.timeout {
                let elapsed = started.elapsed();
                if elapsed > limit {
                    return Err(RebalancerError::SolverTimeout {
                        elapsed_ms: elapsed.as_millis(),
                        iterations,
                    });
                }
            }
            iterations += 1;

            let mut grad = problem.objective.gradient(&w, mu, cov);
            self.penalty_gradient(&w, problem.constraints, &mut grad);

            let (candidate, f_candidate) = loop {
                let trial: Vec<f64> = w.iter().zip(grad.iter()).map(|(x, g)| x - step * g).collect();
                let candidate = project(&trial, problem.bounds, budget);
                let f_candidate = total(&candidate);
                let decrease: f64 = grad
                    .iter()
                    .zip(candidate.iter().zip(w.iter()))
                    .map(|(g, (c, x))| g * (c - x))
                    .sum();
                if f_candidate <= f + ARMIJO * decrease || step <= MIN_STEP {
                    break (candidate, f_candidate);
                }
                step *= 0.5;
            };

            let movement = candidate
                .iter()
                .zip(w.iter())
                .map(|(c, x)| (c - x).abs())
                .fold(0.0, f64::max);

            if f_candidate <= f {
                w = candidate;
                f = f_candidate;
            }
            trace!(iterations, objective = f, step, movement, "projected gradient step");

            if movement <= settings.tolerance {
                converged = true;
                break;
            }
            step = (step * 2.0).min(MAX_STEP);
        }

        let violation = problem.constraints.max_violation(&w);
        let message = if violation > CONSTRAINT_TOLERANCE {
            converged = false;
            format!("constraint violation {:.3e} exceeds tolerance", violation)
        } else if converged {
            format!("converged after {} iterations", iterations)
        } else {
            format!("iteration limit {} reached", settings.max_iterations)
        };

        Ok(Solution {
            weights: w,
            converged,
            iterations,
            message,
        })
    }
}
