//! Ordered sequence of realized portfolios, one per rebalance period.

use crate::domain::context::UniverseContext;
use crate::domain::error::RebalancerError;
use crate::domain::pipeline::run_period;
use crate::domain::portfolio::{EquityPoint, Portfolio, ReturnPoint};
use crate::domain::timeline::RebalancePeriod;
use crate::domain::universe::COMMANDS_SECTION;
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;
use std::time::Instant;
use tracing::{info, warn};

/// What to do when a period's pipeline fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// The first failing period (by index) fails the whole sequence.
    #[default]
    Abort,
    /// Record data and timeout failures and continue. Configuration errors
    /// still abort.
    Skip,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::Abort => f.write_str("abort"),
            FailurePolicy::Skip => f.write_str("skip"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "abort" | "fail" => Ok(FailurePolicy::Abort),
            "skip" | "continue" => Ok(FailurePolicy::Skip),
            _ => Err(format!("unknown failure policy '{}'", s.trim())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedPeriod {
    pub period: RebalancePeriod,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PortfolioSequence {
    portfolios: Vec<Portfolio>,
    skipped: Vec<SkippedPeriod>,
}

impl PortfolioSequence {
    pub fn portfolios(&self) -> &[Portfolio] {
        &self.portfolios
    }

    pub fn skipped(&self) -> &[SkippedPeriod] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.portfolios.len()
    }

    pub fn is_empty(&self) -> bool {
        self.portfolios.is_empty()
    }

    /// Portfolio for the 1-based period index, if it was produced.
    pub fn get(&self, index: usize) -> Option<&Portfolio> {
        self.portfolios
            .binary_search_by_key(&index, |p| p.period.index)
            .ok()
            .map(|i| &self.portfolios[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Portfolio> {
        self.portfolios.iter()
    }

    pub fn non_converged(&self) -> impl Iterator<Item = &Portfolio> {
        self.portfolios.iter().filter(|p| !p.converged)
    }

    /// Realized returns of every portfolio, in date order.
    pub fn realized_returns(&self) -> impl Iterator<Item = &ReturnPoint> {
        self.portfolios.iter().flat_map(|p| p.realized.iter())
    }

    /// Chain the realized returns of all periods into one equity curve.
    pub fn equity_curve(&self, initial: f64) -> Vec<EquityPoint> {
        let mut equity = initial;
        self.realized_returns()
            .map(|r| {
                equity *= 1.0 + r.value;
                EquityPoint {
                    date: r.date,
                    equity,
                }
            })
            .collect()
    }
}

impl<'a> IntoIterator for &'a PortfolioSequence {
    type Item = &'a Portfolio;
    type IntoIter = std::slice::Iter<'a, Portfolio>;

    fn into_iter(self) -> Self::IntoIter {
        self.portfolios.iter()
    }
}

fn run_all(
    ctx: &UniverseContext,
    periods: &[RebalancePeriod],
) -> Vec<Result<Portfolio, RebalancerError>> {
    periods.par_iter().map(|p| run_period(ctx, p)).collect()
}

/// Run every period of the context's timeline and collect the results in
/// period order.
pub fn build_sequence(ctx: &UniverseContext) -> Result<PortfolioSequence, RebalancerError> {
    let started = Instant::now();
    let periods = ctx.timeline()?;
    let params = ctx.parameters();

    // Materialize shared state once before fanning out.
    ctx.log_returns();
    ctx.bounds()?;
    ctx.constraints()?;

    let results = if params.workers > 0 {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(params.workers)
            .build()
            .map_err(|e| RebalancerError::config_invalid(COMMANDS_SECTION, "workers", e.to_string()))?;
        pool.install(|| run_all(ctx, periods))
    } else {
        run_all(ctx, periods)
    };

    let mut sequence = PortfolioSequence::default();
    for (period, result) in periods.iter().zip(results) {
        match result {
            Ok(portfolio) => sequence.portfolios.push(portfolio),
            Err(e) if params.failure_policy == FailurePolicy::Skip && e.is_skippable() => {
                warn!(period = period.index, error = %e, "skipping period");
                sequence.skipped.push(SkippedPeriod {
                    period: period.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }

    info!(
        periods = periods.len(),
        portfolios = sequence.len(),
        skipped = sequence.skipped.len(),
        non_converged = sequence.non_converged().count(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "portfolio sequence built"
    );
    Ok(sequence)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_failure_policy() {
        assert_eq!("abort".parse(), Ok(FailurePolicy::Abort));
        assert_eq!(" SKIP ".parse(), Ok(FailurePolicy::Skip));
        assert!("retry".parse::<FailurePolicy>().is_err());
        assert_eq!(FailurePolicy::default(), FailurePolicy::Abort);
        assert_eq!(FailurePolicy::Skip.to_string(), "skip");
    }

    #[test]
    fn empty_sequence() {
        let seq = PortfolioSequence::default();
        assert!(seq.is_empty());
        assert!(seq.get(1).is_none());
        assert!(seq.equity_curve(1.0).is_empty());
    }
}
