//! Universe context: configuration plus lazily derived, memoized state.
//!
//! Derived fields are each guarded by a [`OnceLock`] and computed on first
//! read. Setters take `&mut self`, re-validate the full parameter set and
//! then drop every cached field that depends on what changed, so a later
//! read recomputes from current parameters.

use crate::domain::bounds::{
    check_feasible, resolve_bounds, Bound, BoundOverride, BoundsPolicy, ConstraintSet,
    ConstraintSpec,
};
use crate::domain::calendar::{Interval, LookbackSpec, RebalanceCadence};
use crate::domain::config_validation::{
    validate_dates, validate_lookback, validate_objective, validate_solver,
};
use crate::domain::error::RebalancerError;
use crate::domain::sequence::{build_sequence, FailurePolicy, PortfolioSequence};
use crate::domain::series::{MissingDataPolicy, SeriesTable};
use crate::domain::timeline::{build_timeline, RebalancePeriod, TimelineRequest};
use crate::domain::universe::{UniverseSpec, UNIVERSE_SECTION};
use crate::ports::calendar_port::CalendarPort;
use crate::ports::clock_port::ClockPort;
use crate::ports::optimizer_port::{Objective, OptimizerPort, SolverSettings};
use crate::ports::price_port::PricePort;
use chrono::NaiveDate;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Mutable strategy parameters. Always valid as a whole.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameters {
    pub analysis_start: NaiveDate,
    pub analysis_end: NaiveDate,
    pub interval: Interval,
    pub missing_data: MissingDataPolicy,
    pub strategy_start: NaiveDate,
    pub lookback: LookbackSpec,
    pub rebalance: bool,
    pub cadence: RebalanceCadence,
    pub bounds: BoundsPolicy,
    pub bound_overrides: Vec<BoundOverride>,
    pub constraints: Option<ConstraintSpec>,
    pub objective: Objective,
    pub solver: SolverSettings,
    pub failure_policy: FailurePolicy,
    pub workers: usize,
    /// "Now" for timeline generation.
    pub as_of: NaiveDate,
}

impl Parameters {
    fn from_spec(spec: &UniverseSpec, as_of: NaiveDate) -> Self {
        let c = &spec.commands;
        Self {
            analysis_start: spec.universe.start_date,
            analysis_end: spec.universe.end_date,
            interval: spec.universe.interval,
            missing_data: spec.universe.missing_data,
            strategy_start: c.strategy_start,
            lookback: c.lookback,
            rebalance: c.rebalance,
            cadence: c.cadence,
            bounds: c.bounds,
            bound_overrides: c.bound_overrides.clone(),
            constraints: c.constraints.clone(),
            objective: c.objective,
            solver: c.solver,
            failure_policy: c.failure_policy,
            workers: c.workers,
            as_of,
        }
    }

    fn resolve_bounds(&self, assets: &[String]) -> Result<Vec<Bound>, RebalancerError> {
        resolve_bounds(assets, &self.bounds, &self.bound_overrides)
    }

    fn resolve_constraints(&self, assets: &[String]) -> Result<ConstraintSet, RebalancerError> {
        match &self.constraints {
            Some(spec) => spec.resolve(assets),
            None => Ok(ConstraintSet::default()),
        }
    }

    fn validate(&self, assets: &[String]) -> Result<(), RebalancerError> {
        validate_dates(self.analysis_start, self.analysis_end, self.strategy_start)?;
        validate_lookback(self.lookback)?;
        let bounds = self.resolve_bounds(assets)?;
        let constraints = self.resolve_constraints(assets)?;
        check_feasible(&bounds, &constraints)?;
        validate_objective(&self.objective)?;
        validate_solver(&self.solver)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Derived {
    LogReturns,
    Bounds,
    Constraints,
    LookbackContext,
    Timeline,
    Portfolios,
}

pub struct UniverseContext {
    initial_spec: UniverseSpec,
    assets: Vec<String>,
    prices: SeriesTable,
    calendar: Arc<dyn CalendarPort>,
    optimizer: Arc<dyn OptimizerPort>,
    params: Parameters,

    log_returns: OnceLock<SeriesTable>,
    bounds: OnceLock<Vec<Bound>>,
    constraints: OnceLock<ConstraintSet>,
    lookback_context: OnceLock<LookbackSpec>,
    timeline: OnceLock<Vec<RebalancePeriod>>,
    portfolios: OnceLock<PortfolioSequence>,
}

impl std::fmt::Debug for UniverseContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniverseContext")
            .field("assets", &self.assets)
            .field("params", &self.params)
            .field("price_rows", &self.prices.len())
            .finish_non_exhaustive()
    }
}

impl UniverseContext {
    /// Load prices through `prices` and take "now" from `clock`.
    pub fn new(
        spec: UniverseSpec,
        prices: &dyn PricePort,
        calendar: Arc<dyn CalendarPort>,
        optimizer: Arc<dyn OptimizerPort>,
        clock: &dyn ClockPort,
    ) -> Result<Self, RebalancerError> {
        let table = prices.load_prices(&spec.universe.assets)?;
        Self::with_prices(spec, table, calendar, optimizer, clock.today())
    }

    pub fn with_prices(
        spec: UniverseSpec,
        prices: SeriesTable,
        calendar: Arc<dyn CalendarPort>,
        optimizer: Arc<dyn OptimizerPort>,
        as_of: NaiveDate,
    ) -> Result<Self, RebalancerError> {
        let assets = spec.universe.assets.clone();
        if let Some(missing) = assets.iter().find(|a| prices.asset_index(a).is_none()) {
            return Err(RebalancerError::config_invalid(
                UNIVERSE_SECTION,
                "assets",
                format!("asset {} has no price column", missing),
            ));
        }
        let prices = prices.select(&assets)?;

        let params = Parameters::from_spec(&spec, as_of);
        params.validate(&assets)?;

        debug!(
            assets = assets.len(),
            rows = prices.len(),
            %as_of,
            "universe context created"
        );

        Ok(Self {
            initial_spec: spec,
            assets,
            prices,
            calendar,
            optimizer,
            params,
            log_returns: OnceLock::new(),
            bounds: OnceLock::new(),
            constraints: OnceLock::new(),
            lookback_context: OnceLock::new(),
            timeline: OnceLock::new(),
            portfolios: OnceLock::new(),
        })
    }

    /// The universe definition this context was built from, unaffected by setters.
    pub fn initial_spec(&self) -> &UniverseSpec {
        &self.initial_spec
    }

    pub fn parameters(&self) -> &Parameters {
        &self.params
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn prices(&self) -> &SeriesTable {
        &self.prices
    }

    pub fn optimizer(&self) -> &dyn OptimizerPort {
        self.optimizer.as_ref()
    }

    pub fn as_of(&self) -> NaiveDate {
        self.params.as_of
    }

    /// Last date a period may start before: `as_of`, capped at the end of the
    /// analysis window.
    pub fn horizon(&self) -> NaiveDate {
        self.params.as_of.min(self.params.analysis_end)
    }

    // -- derived state ------------------------------------------------------

    /// Log returns over the analysis window after missing-data handling and
    /// resampling.
    pub fn log_returns(&self) -> &SeriesTable {
        self.log_returns.get_or_init(|| {
            let p = &self.params;
            let table = self
                .prices
                .restrict(p.analysis_start, p.analysis_end)
                .drop_missing(p.missing_data)
                .resample(p.interval)
                .log_returns();
            debug!(rows = table.len(), interval = %p.interval, "log returns computed");
            table
        })
    }

    pub fn bounds(&self) -> Result<&[Bound], RebalancerError> {
        if let Some(bounds) = self.bounds.get() {
            return Ok(bounds);
        }
        let bounds = self.params.resolve_bounds(&self.assets)?;
        Ok(self.bounds.get_or_init(|| bounds))
    }

    pub fn constraints(&self) -> Result<&ConstraintSet, RebalancerError> {
        if let Some(constraints) = self.constraints.get() {
            return Ok(constraints);
        }
        let constraints = self.params.resolve_constraints(&self.assets)?;
        Ok(self.constraints.get_or_init(|| constraints))
    }

    /// The `{unit: length}` pair handed to the calendar.
    pub fn lookback_context(&self) -> LookbackSpec {
        *self.lookback_context.get_or_init(|| self.params.lookback)
    }

    pub fn timeline(&self) -> Result<&[RebalancePeriod], RebalancerError> {
        if let Some(timeline) = self.timeline.get() {
            return Ok(timeline);
        }
        let request = TimelineRequest {
            strategy_start: self.params.strategy_start,
            cadence: self.params.cadence,
            lookback: self.lookback_context(),
            rebalance: self.params.rebalance,
            as_of: self.horizon(),
        };
        let timeline = build_timeline(self.calendar.as_ref(), &request)?;
        debug!(periods = timeline.len(), "timeline built");
        Ok(self.timeline.get_or_init(|| timeline))
    }

    pub fn portfolios(&self) -> Result<&PortfolioSequence, RebalancerError> {
        if let Some(sequence) = self.portfolios.get() {
            return Ok(sequence);
        }
        let sequence = build_sequence(self)?;
        Ok(self.portfolios.get_or_init(|| sequence))
    }

    // -- mutation -----------------------------------------------------------

    fn update(
        &mut self,
        change: impl FnOnce(&mut Parameters),
        dirty: &[Derived],
    ) -> Result<(), RebalancerError> {
        let mut next = self.params.clone();
        change(&mut next);
        if next == self.params {
            return Ok(());
        }
        next.validate(&self.assets)?;
        self.params = next;
        for field in dirty {
            self.invalidate(*field);
        }
        Ok(())
    }

    fn invalidate(&mut self, field: Derived) {
        let dropped = match field {
            Derived::LogReturns => self.log_returns.take().is_some(),
            Derived::Bounds => self.bounds.take().is_some(),
            Derived::Constraints => self.constraints.take().is_some(),
            Derived::LookbackContext => self.lookback_context.take().is_some(),
            Derived::Timeline => self.timeline.take().is_some(),
            Derived::Portfolios => self.portfolios.take().is_some(),
        };
        if dropped {
            debug!(?field, "invalidated derived state");
        }
        match field {
            Derived::LogReturns | Derived::Bounds | Derived::Constraints | Derived::Timeline => {
                self.invalidate(Derived::Portfolios)
            }
            Derived::LookbackContext => self.invalidate(Derived::Timeline),
            Derived::Portfolios => {}
        }
    }

    pub fn set_analysis_start(&mut self, date: NaiveDate) -> Result<(), RebalancerError> {
        self.update(|p| p.analysis_start = date, &[Derived::LogReturns])
    }

    pub fn set_analysis_end(&mut self, date: NaiveDate) -> Result<(), RebalancerError> {
        // The horizon is capped at the analysis end.
        self.update(
            |p| p.analysis_end = date,
            &[Derived::LogReturns, Derived::Timeline],
        )
    }

    pub fn set_interval(&mut self, interval: Interval) -> Result<(), RebalancerError> {
        self.update(|p| p.interval = interval, &[Derived::LogReturns])
    }

    pub fn set_missing_data(&mut self, policy: MissingDataPolicy) -> Result<(), RebalancerError> {
        self.update(|p| p.missing_data = policy, &[Derived::LogReturns])
    }

    pub fn set_strategy_start(&mut self, date: NaiveDate) -> Result<(), RebalancerError> {
        self.update(|p| p.strategy_start = date, &[Derived::Timeline])
    }

    pub fn set_rebalance(&mut self, rebalance: bool) -> Result<(), RebalancerError> {
        self.update(|p| p.rebalance = rebalance, &[Derived::Timeline])
    }

    pub fn set_cadence(&mut self, cadence: RebalanceCadence) -> Result<(), RebalancerError> {
        self.update(|p| p.cadence = cadence, &[Derived::Timeline])
    }

    pub fn set_as_of(&mut self, as_of: NaiveDate) -> Result<(), RebalancerError> {
        self.update(|p| p.as_of = as_of, &[Derived::Timeline])
    }

    pub fn set_lookback(&mut self, lookback: LookbackSpec) -> Result<(), RebalancerError> {
        self.update(|p| p.lookback = lookback, &[Derived::LookbackContext])
    }

    pub fn set_shorting(&mut self, shorting: bool, short_limit: f64) -> Result<(), RebalancerError> {
        self.update(
            |p| {
                p.bounds.shorting = shorting;
                p.bounds.short_limit = short_limit;
            },
            &[Derived::Bounds],
        )
    }

    pub fn set_long_floor(&mut self, floor: f64) -> Result<(), RebalancerError> {
        self.update(|p| p.bounds.long_floor = floor, &[Derived::Bounds])
    }

    pub fn set_long_ceiling(&mut self, ceiling: f64) -> Result<(), RebalancerError> {
        self.update(|p| p.bounds.long_ceiling = ceiling, &[Derived::Bounds])
    }

    pub fn set_bound_overrides(
        &mut self,
        overrides: Vec<BoundOverride>,
    ) -> Result<(), RebalancerError> {
        self.update(|p| p.bound_overrides = overrides, &[Derived::Bounds])
    }

    pub fn set_constraints(
        &mut self,
        constraints: Option<ConstraintSpec>,
    ) -> Result<(), RebalancerError> {
        self.update(|p| p.constraints = constraints, &[Derived::Constraints])
    }

    pub fn set_objective(&mut self, objective: Objective) -> Result<(), RebalancerError> {
        self.update(|p| p.objective = objective, &[Derived::Portfolios])
    }

    pub fn set_solver_settings(&mut self, settings: SolverSettings) -> Result<(), RebalancerError> {
        self.update(|p| p.solver = settings, &[Derived::Portfolios])
    }

    pub fn set_failure_policy(&mut self, policy: FailurePolicy) -> Result<(), RebalancerError> {
        self.update(|p| p.failure_policy = policy, &[Derived::Portfolios])
    }

    pub fn set_workers(&mut self, workers: usize) -> Result<(), RebalancerError> {
        self.update(|p| p.workers = workers, &[Derived::Portfolios])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::gregorian_calendar::GregorianCalendar;
    use crate::adapters::projected_gradient::ProjectedGradientOptimizer;
    use crate::domain::calendar::LookbackUnit;
    use crate::domain::universe::{StrategyCommands, UniverseSection};
    use chrono::Days;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn spec() -> UniverseSpec {
        UniverseSpec {
            universe: UniverseSection {
                data_source: None,
                start_date: d(2019, 1, 1),
                end_date: d(2020, 12, 31),
                interval: Interval::Daily,
                missing_data: MissingDataPolicy::Any,
                assets: vec!["AAA".into(), "BBB".into(), "CCC".into()],
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
            description: vec![("name".into(), "test".into())],
        }
    }

    /// Deterministic prices: three assets with different drifts and a
    /// wobble so covariance is non-singular.
    fn prices() -> SeriesTable {
        let start = d(2019, 1, 1);
        let n = 730;
        let dates: Vec<NaiveDate> = (0..n)
            .map(|i| start.checked_add_days(Days::new(i)).unwrap())
            .collect();
        let rows = (0..n)
            .map(|i| {
                let t = i as f64;
                vec![
                    100.0 * (0.0004 * t + 0.01 * (t * 0.7).sin()).exp(),
                    50.0 * (0.0002 * t + 0.02 * (t * 1.3).cos()).exp(),
                    20.0 * (0.0001 * t + 0.015 * (t * 0.4).sin()).exp(),
                ]
            })
            .collect();
        SeriesTable::new(
            dates,
            vec!["AAA".into(), "BBB".into(), "CCC".into()],
            rows,
        )
        .unwrap()
    }

    fn context(as_of: NaiveDate) -> UniverseContext {
        UniverseContext::with_prices(
            spec(),
            prices(),
            Arc::new(GregorianCalendar),
            Arc::new(ProjectedGradientOptimizer::new()),
            as_of,
        )
        .unwrap()
    }

    #[test]
    fn unknown_asset_is_rejected() {
        let mut s = spec();
        s.universe.assets.push("ZZZ".into());
        let err = UniverseContext::with_prices(
            s,
            prices(),
            Arc::new(GregorianCalendar),
            Arc::new(ProjectedGradientOptimizer::new()),
            d(2020, 4, 15),
        )
        .unwrap_err();
        assert!(matches!(err, RebalancerError::ConfigInvalid { ref key, .. } if key == "assets"));
    }

    #[test]
    fn derived_state_is_memoized() {
        let ctx = context(d(2020, 4, 15));
        let a = ctx.log_returns() as *const SeriesTable;
        let b = ctx.log_returns() as *const SeriesTable;
        assert_eq!(a, b);
        assert_eq!(ctx.log_returns().len(), 730 - 1);
        assert_eq!(ctx.timeline().unwrap().len(), 4);
        assert_eq!(ctx.bounds().unwrap().len(), 3);
        assert_eq!(ctx.constraints().unwrap(), &ConstraintSet::default());
        assert_eq!(ctx.lookback_context(), LookbackSpec::new(3, LookbackUnit::Months));
    }

    #[test]
    fn ceiling_change_recomputes_bounds_and_portfolios() {
        let mut ctx = context(d(2020, 4, 15));
        assert_eq!(ctx.bounds().unwrap()[0].upper, 1.0);
        let first = ctx.portfolios().unwrap().len();
        assert_eq!(first, 4);

        ctx.set_long_ceiling(0.5).unwrap();
        assert!(ctx.portfolios.get().is_none());
        assert!(ctx.bounds().unwrap().iter().all(|b| b.upper == 0.5));
        for p in ctx.portfolios().unwrap().portfolios() {
            assert!(p.weights.iter().all(|w| *w <= 0.5 + 1e-6));
        }
        // untouched state survives
        assert!(ctx.log_returns.get().is_some());
    }

    #[test]
    fn strategy_start_change_rebuilds_timeline() {
        let mut ctx = context(d(2020, 4, 15));
        assert_eq!(ctx.timeline().unwrap().len(), 4);
        ctx.set_strategy_start(d(2020, 3, 1)).unwrap();
        let timeline = ctx.timeline().unwrap();
        assert_eq!(timeline.len(), 2);
        assert_eq!(timeline[0].active_start, d(2020, 3, 1));
    }

    #[test]
    fn lookback_change_cascades_to_timeline() {
        let mut ctx = context(d(2020, 4, 15));
        let before = ctx.timeline().unwrap()[0].lookback_start;
        ctx.set_lookback(LookbackSpec::new(1, LookbackUnit::Months)).unwrap();
        assert!(ctx.timeline.get().is_none());
        let after = ctx.timeline().unwrap()[0].lookback_start;
        assert!(after > before);
        assert_eq!(ctx.lookback_context().length, 1);
    }

    #[test]
    fn invalid_update_keeps_previous_state() {
        let mut ctx = context(d(2020, 4, 15));
        ctx.timeline().unwrap();
        let err = ctx.set_long_ceiling(0.2).unwrap_err();
        assert!(matches!(err, RebalancerError::ConfigInvalid { .. }));
        assert_eq!(ctx.parameters().bounds.long_ceiling, 1.0);
        assert!(ctx.timeline.get().is_some());

        assert!(ctx.set_strategy_start(d(2018, 1, 1)).is_err());
        assert!(ctx.set_lookback(LookbackSpec::new(0, LookbackUnit::Days)).is_err());
        assert!(ctx.set_long_floor(-0.1).is_err());
    }

    #[test]
    fn shorting_widens_floor() {
        let mut ctx = context(d(2020, 4, 15));
        ctx.set_shorting(true, 0.3).unwrap();
        assert!(ctx.bounds().unwrap().iter().all(|b| b.lower == -0.3));
        assert!(ctx.set_long_floor(-0.1).is_ok());
    }

    #[test]
    fn no_op_update_keeps_cache() {
        let mut ctx = context(d(2020, 4, 15));
        ctx.timeline().unwrap();
        ctx.set_cadence(RebalanceCadence::Monthly).unwrap();
        assert!(ctx.timeline.get().is_some());
    }

    #[test]
    fn horizon_is_capped_by_analysis_end() {
        let ctx = context(d(2030, 1, 1));
        assert_eq!(ctx.horizon(), d(2020, 12, 31));
        let timeline = ctx.timeline().unwrap();
        assert_eq!(timeline.last().unwrap().active_start, d(2020, 12, 1));
    }

    #[test]
    fn initial_spec_is_preserved() {
        let mut ctx = context(d(2020, 4, 15));
        ctx.set_strategy_start(d(2020, 2, 1)).unwrap();
        assert_eq!(ctx.initial_spec().commands.strategy_start, d(2020, 1, 1));
        assert_eq!(ctx.parameters().strategy_start, d(2020, 2, 1));
    }
}
