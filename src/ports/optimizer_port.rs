//! Constrained allocation solver port.

use crate::domain::bounds::{Bound, ConstraintSet};
use crate::domain::error::RebalancerError;
use crate::domain::statistics::{dot, portfolio_variance};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Risk-adjusted objective to minimize.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Objective {
    /// Minimize the negative Sharpe ratio `-(μᵀw - rf) / sqrt(wᵀΣw)`.
    MaxSharpe { risk_free_rate: f64 },
    /// Minimize `wᵀΣw`.
    MinVariance,
    /// Minimize `λ·wᵀΣw - μᵀw`.
    MeanVariance { risk_aversion: f64 },
}

impl Default for Objective {
    fn default() -> Self {
        Objective::MaxSharpe {
            risk_free_rate: 0.0,
        }
    }
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Objective::MaxSharpe { .. } => f.write_str("max_sharpe"),
            Objective::MinVariance => f.write_str("min_variance"),
            Objective::MeanVariance { .. } => f.write_str("mean_variance"),
        }
    }
}

/// Objective family without its parameters, as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveKind {
    MaxSharpe,
    MinVariance,
    MeanVariance,
}

impl FromStr for ObjectiveKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "max_sharpe" | "sharpe" => Ok(ObjectiveKind::MaxSharpe),
            "min_variance" | "minimum_variance" => Ok(ObjectiveKind::MinVariance),
            "mean_variance" => Ok(ObjectiveKind::MeanVariance),
            _ => Err(format!("unknown objective '{}'", s.trim())),
        }
    }
}

impl ObjectiveKind {
    pub fn with_params(self, risk_free_rate: f64, risk_aversion: f64) -> Objective {
        match self {
            ObjectiveKind::MaxSharpe => Objective::MaxSharpe { risk_free_rate },
            ObjectiveKind::MinVariance => Objective::MinVariance,
            ObjectiveKind::MeanVariance => Objective::MeanVariance { risk_aversion },
        }
    }
}

impl Objective {
    pub fn value(&self, w: &[f64], mu: &[f64], cov: &[Vec<f64>]) -> f64 {
        let var = portfolio_variance(w, cov);
        match *self {
            Objective::MaxSharpe { risk_free_rate } => {
                if var <= f64::EPSILON {
                    return 0.0;
                }
                -(dot(mu, w) - risk_free_rate) / var.sqrt()
            }
            Objective::MinVariance => var,
            Objective::MeanVariance { risk_aversion } => risk_aversion * var - dot(mu, w),
        }
    }

    pub fn gradient(&self, w: &[f64], mu: &[f64], cov: &[Vec<f64>]) -> Vec<f64> {
        let sigma_w: Vec<f64> = cov.iter().map(|row| dot(row, w)).collect();
        match *self {
            Objective::MaxSharpe { risk_free_rate } => {
                let var = dot(w, &sigma_w);
                if var <= f64::EPSILON {
                    return vec![0.0; w.len()];
                }
                let sd = var.sqrt();
                let excess = dot(mu, w) - risk_free_rate;
                mu.iter()
                    .zip(sigma_w.iter())
                    .map(|(m, s)| -(m / sd - excess * s / (var * sd)))
                    .collect()
            }
            Objective::MinVariance => sigma_w.iter().map(|s| 2.0 * s).collect(),
            Objective::MeanVariance { risk_aversion } => mu
                .iter()
                .zip(sigma_w.iter())
                .map(|(m, s)| 2.0 * risk_aversion * s - m)
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub max_iterations: usize,
    pub tolerance: f64,
    pub timeout: Option<Duration>,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 1e-9,
            timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptimizationProblem<'a> {
    pub objective: Objective,
    pub expected_returns: &'a [f64],
    pub covariance: &'a [Vec<f64>],
    pub initial_guess: Vec<f64>,
    pub bounds: &'a [Bound],
    pub constraints: &'a ConstraintSet,
    pub settings: SolverSettings,
}

/// Solver outcome. A non-converged solution still carries the best weights
/// found; callers decide whether that is acceptable.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub weights: Vec<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub message: String,
}

pub trait OptimizerPort: Send + Sync {
    /// Minimize the objective subject to bounds and constraints.
    ///
    /// Non-convergence is reported through [`Solution::converged`]; only a
    /// timeout or malformed input is an error.
    fn solve(&self, problem: &OptimizationProblem<'_>) -> Result<Solution, RebalancerError>;
}
