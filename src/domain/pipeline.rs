//! Per-period optimization pipeline: slice, estimate, solve, track.

use crate::domain::bounds::Bound;
use crate::domain::context::UniverseContext;
use crate::domain::error::{PipelineStage, RebalancerError};
use crate::domain::portfolio::{Portfolio, ReturnPoint};
use crate::domain::series::SeriesTable;
use crate::domain::statistics::{covariance, expected_returns, minimum_rows};
use crate::domain::timeline::RebalancePeriod;
use crate::ports::optimizer_port::OptimizationProblem;
use tracing::{debug, warn};

/// Run one period. Reads only shared context state, so periods may run
/// concurrently.
pub fn run_period(
    ctx: &UniverseContext,
    period: &RebalancePeriod,
) -> Result<Portfolio, RebalancerError> {
    let index = period.index;
    let returns = ctx.log_returns();

    let lookback = returns
        .slice(period.lookback_start, period.lookback_end)
        .map_err(|e| e.in_period(index, PipelineStage::Slice))?;
    let minimum = minimum_rows(ctx.assets().len());
    if lookback.len() < minimum {
        return Err(RebalancerError::InsufficientData {
            rows: lookback.len(),
            minimum,
        }
        .in_period(index, PipelineStage::Slice));
    }

    let mu = expected_returns(&lookback);
    let cov = covariance(&lookback).map_err(|e| e.in_period(index, PipelineStage::Statistics))?;

    let bounds = ctx
        .bounds()
        .map_err(|e| e.in_period(index, PipelineStage::Solve))?;
    let constraints = ctx
        .constraints()
        .map_err(|e| e.in_period(index, PipelineStage::Solve))?;
    let params = ctx.parameters();

    let problem = OptimizationProblem {
        objective: params.objective,
        expected_returns: &mu,
        covariance: &cov,
        initial_guess: initial_guess(bounds, constraints.budget),
        bounds,
        constraints,
        settings: params.solver,
    };
    let solution = ctx
        .optimizer()
        .solve(&problem)
        .map_err(|e| e.in_period(index, PipelineStage::Solve))?;

    if !solution.converged {
        warn!(
            period = index,
            iterations = solution.iterations,
            message = %solution.message,
            "optimizer did not converge, keeping best weights"
        );
    }

    let realized = realized_returns(returns, period, &solution.weights)
        .map_err(|e| e.in_period(index, PipelineStage::Track))?;

    debug!(
        period = index,
        lookback_rows = lookback.len(),
        realized_days = realized.len(),
        converged = solution.converged,
        "period solved"
    );

    Ok(Portfolio {
        id: period.id(),
        period: period.clone(),
        assets: ctx.assets().to_vec(),
        lookback,
        expected_returns: mu,
        covariance: cov,
        weights: solution.weights,
        converged: solution.converged,
        iterations: solution.iterations,
        solver_message: solution.message,
        realized,
    })
}

/// Equal weight scaled to the budget, clipped into each asset's bounds.
pub fn initial_guess(bounds: &[Bound], budget: f64) -> Vec<f64> {
    if bounds.is_empty() {
        return Vec::new();
    }
    let equal = budget / bounds.len() as f64;
    bounds
        .iter()
        .map(|b| equal.clamp(b.lower, b.upper))
        .collect()
}

/// Daily simple portfolio returns over the active window.
///
/// Each asset's log return `r` contributes `w * (exp(r) - 1)`.
pub fn realized_returns(
    returns: &SeriesTable,
    period: &RebalancePeriod,
    weights: &[f64],
) -> Result<Vec<ReturnPoint>, RebalancerError> {
    if weights.len() != returns.asset_count() {
        return Err(RebalancerError::Data {
            reason: format!(
                "{} weights for {} assets",
                weights.len(),
                returns.asset_count()
            ),
        });
    }
    let active = returns.restrict(period.active_start, period.active_end);
    Ok(active
        .dates()
        .iter()
        .zip(active.rows())
        .map(|(date, row)| ReturnPoint {
            date: *date,
            value: row
                .iter()
                .zip(weights)
                .map(|(r, w)| w * r.exp_m1())
                .sum(),
        })
        .collect())
}
