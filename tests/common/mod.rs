#![allow(dead_code)]

use chrono::{Days, NaiveDate};
use rebalancer::adapters::gregorian_calendar::GregorianCalendar;
use rebalancer::adapters::projected_gradient::ProjectedGradientOptimizer;
use rebalancer::domain::bounds::BoundsPolicy;
use rebalancer::domain::calendar::{Interval, LookbackSpec, LookbackUnit, RebalanceCadence};
use rebalancer::domain::context::UniverseContext;
use rebalancer::domain::error::RebalancerError;
use rebalancer::domain::sequence::FailurePolicy;
use rebalancer::domain::series::{MissingDataPolicy, SeriesTable};
use rebalancer::domain::universe::{StrategyCommands, UniverseSection, UniverseSpec};
use rebalancer::ports::optimizer_port::{
    Objective, OptimizationProblem, OptimizerPort, Solution, SolverSettings,
};
use rebalancer::ports::price_port::PricePort;
use std::sync::Arc;

pub fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

pub fn assets(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Deterministic daily prices: a drift plus a bounded oscillation per asset,
/// so covariance matrices are well conditioned.
pub fn synthetic_prices(names: &[&str], start: NaiveDate, days: u64) -> SeriesTable {
    let dates: Vec<NaiveDate> = (0..days)
        .map(|i| start.checked_add_days(Days::new(i)).unwrap())
        .collect();
    let rows = (0..days)
        .map(|i| {
            let t = i as f64;
            (0..names.len())
                .map(|j| {
                    let k = j as f64 + 1.0;
                    let drift = 0.0001 * k * t;
                    let wave = 0.01 * k * (t * (0.3 + 0.45 * k)).sin();
                    (100.0 / k) * (drift + wave).exp()
                })
                .collect()
        })
        .collect();
    SeriesTable::new(dates, assets(names), rows).unwrap()
}

/// `synthetic_prices` written as a wide CSV with a `date` column.
pub fn prices_csv(table: &SeriesTable) -> String {
    let mut out = String::from("date");
    for asset in table.assets() {
        out.push(',');
        out.push_str(asset);
    }
    out.push('\n');
    for (date, row) in table.dates().iter().zip(table.rows()) {
        out.push_str(&date.to_string());
        for v in row {
            out.push_str(&format!(",{:.6}", v));
        }
        out.push('\n');
    }
    out
}

/// Three assets, analysis 2019-01-01 .. 2020-12-31, monthly rebalance from
/// 2020-01-01 on a three month lookback, minimum variance.
pub fn universe_spec() -> UniverseSpec {
    UniverseSpec {
        universe: UniverseSection {
            data_source: None,
            start_date: d(2019, 1, 1),
            end_date: d(2020, 12, 31),
            interval: Interval::Daily,
            missing_data: MissingDataPolicy::Any,
            assets: assets(&["AAA", "BBB", "CCC"]),
        },
        commands: StrategyCommands {
            strategy_start: d(2020, 1, 1),
            lookback: LookbackSpec::new(3, LookbackUnit::Months),
            rebalance: true,
            cadence: RebalanceCadence::Monthly,
            bounds: BoundsPolicy::default(),
            bound_overrides: Vec::new(),
            constraints: None,
            objective: Objective::MinVariance,
            solver: SolverSettings::default(),
            failure_policy: FailurePolicy::Abort,
            workers: 0,
        },
        description: vec![("name".into(), "fixture".into())],
    }
}

pub fn fixture_prices() -> SeriesTable {
    synthetic_prices(&["AAA", "BBB", "CCC"], d(2019, 1, 1), 731)
}

pub fn context_with(
    spec: UniverseSpec,
    optimizer: Arc<dyn OptimizerPort>,
    as_of: NaiveDate,
) -> UniverseContext {
    UniverseContext::with_prices(
        spec,
        fixture_prices(),
        Arc::new(GregorianCalendar::new()),
        optimizer,
        as_of,
    )
    .unwrap()
}

pub fn context(spec: UniverseSpec, as_of: NaiveDate) -> UniverseContext {
    context_with(spec, Arc::new(ProjectedGradientOptimizer::new()), as_of)
}

pub struct MockPricePort {
    pub table: Option<SeriesTable>,
    pub error: Option<String>,
}

impl MockPricePort {
    pub fn new(table: SeriesTable) -> Self {
        Self {
            table: Some(table),
            error: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            table: None,
            error: Some(reason.to_string()),
        }
    }
}

impl PricePort for MockPricePort {
    fn load_prices(&self, assets: &[String]) -> Result<SeriesTable, RebalancerError> {
        if let Some(reason) = &self.error {
            return Err(RebalancerError::Data {
                reason: reason.clone(),
            });
        }
        match &self.table {
            Some(table) => table.select(assets),
            None => Ok(SeriesTable::empty(assets.to_vec())),
        }
    }

    fn list_assets(&self) -> Result<Vec<String>, RebalancerError> {
        Ok(self
            .table
            .as_ref()
            .map(|t| t.assets().to_vec())
            .unwrap_or_default())
    }

    fn data_range(&self) -> Result<Option<(NaiveDate, NaiveDate, usize)>, RebalancerError> {
        Ok(self.table.as_ref().and_then(|t| {
            let first = *t.dates().first()?;
            let last = *t.dates().last()?;
            Some((first, last, t.len()))
        }))
    }
}

/// Always times out.
pub struct TimeoutOptimizer;

impl OptimizerPort for TimeoutOptimizer {
    fn solve(&self, _problem: &OptimizationProblem<'_>) -> Result<Solution, RebalancerError> {
        Err(RebalancerError::SolverTimeout {
            elapsed_ms: 1,
            iterations: 0,
        })
    }
}

/// Returns the initial guess without iterating and reports non-convergence.
pub struct StalledOptimizer;

impl OptimizerPort for StalledOptimizer {
    fn solve(&self, problem: &OptimizationProblem<'_>) -> Result<Solution, RebalancerError> {
        Ok(Solution {
            weights: problem.initial_guess.clone(),
            converged: false,
            iterations: problem.settings.max_iterations,
            message: "iteration limit reached".into(),
        })
    }
}

pub fn assert_budget(weights: &[f64], budget: f64) {
    let sum: f64 = weights.iter().sum();
    assert!(
        (sum - budget).abs() < 1e-6,
        "weights {:?} sum to {}, expected {}",
        weights,
        sum,
        budget
    );
}
