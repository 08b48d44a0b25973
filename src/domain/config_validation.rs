//! Universe configuration reading and validation.
//!
//! Every field is parsed strictly: a present but malformed value is an error,
//! never a silent fallback to the default.

use crate::domain::bounds::{
    check_feasible, parse_bound_overrides, resolve_bounds, BoundsPolicy, ConstraintSet,
    ConstraintSpec,
};
use crate::domain::calendar::{LookbackSpec, LookbackUnit};
use crate::domain::error::RebalancerError;
use crate::domain::universe::{
    parse_assets, StrategyCommands, UniverseSection, UniverseSpec, COMMANDS_SECTION,
    UNIVERSE_SECTION,
};
use crate::ports::config_port::ConfigPort;
use crate::ports::optimizer_port::{Objective, ObjectiveKind, SolverSettings};
use chrono::NaiveDate;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub fn read_universe_section(config: &dyn ConfigPort) -> Result<UniverseSection, RebalancerError> {
    let assets_raw = config
        .get_string(UNIVERSE_SECTION, "assets")
        .ok_or_else(|| RebalancerError::config_missing(UNIVERSE_SECTION, "assets"))?;
    let assets = parse_assets(&assets_raw)
        .map_err(|e| RebalancerError::config_invalid(UNIVERSE_SECTION, "assets", e.to_string()))?;

    Ok(UniverseSection {
        data_source: config
            .get_string(UNIVERSE_SECTION, "data_source")
            .map(PathBuf::from),
        start_date: required_date(config, UNIVERSE_SECTION, "start_date")?,
        end_date: required_date(config, UNIVERSE_SECTION, "end_date")?,
        interval: optional_parsed(config, UNIVERSE_SECTION, "interval", Default::default())?,
        missing_data: optional_parsed(config, UNIVERSE_SECTION, "dropna_how", Default::default())?,
        assets,
    })
}

pub fn read_commands_section(config: &dyn ConfigPort) -> Result<StrategyCommands, RebalancerError> {
    let s = COMMANDS_SECTION;

    let lookback_length: i64 = config
        .get_string(s, "lookback_length")
        .ok_or_else(|| RebalancerError::config_missing(s, "lookback_length"))
        .and_then(|v| parse_value(&v, s, "lookback_length"))?;
    let lookback_unit: LookbackUnit = optional_parsed(config, s, "lookback_unit", LookbackUnit::Months)?;

    let bounds = BoundsPolicy {
        shorting: optional_bool(config, s, "shorting", false)?,
        short_limit: optional_parsed(config, s, "short_limit", 0.0)?,
        long_floor: optional_parsed(config, s, "long_floor", 0.0)?,
        long_ceiling: optional_parsed(config, s, "long_ceiling", 1.0)?,
    };
    let bound_overrides = match config.get_string(s, "bounds") {
        Some(raw) => parse_bound_overrides(&raw)
            .map_err(|reason| RebalancerError::config_invalid(s, "bounds", reason))?,
        None => Vec::new(),
    };
    let constraints = match config.get_string(s, "constraints") {
        Some(raw) => Some(
            raw.parse::<ConstraintSpec>()
                .map_err(|reason| RebalancerError::config_invalid(s, "constraints", reason))?,
        ),
        None => None,
    };

    let kind: ObjectiveKind = optional_parsed(config, s, "objective", ObjectiveKind::MaxSharpe)?;
    let objective = kind.with_params(
        optional_parsed(config, s, "risk_free_rate", 0.0)?,
        optional_parsed(config, s, "risk_aversion", 1.0)?,
    );

    let defaults = SolverSettings::default();
    let timeout_ms: u64 = optional_parsed(config, s, "solver_timeout_ms", 0)?;
    let solver = SolverSettings {
        max_iterations: optional_parsed(config, s, "max_iterations", defaults.max_iterations)?,
        tolerance: optional_parsed(config, s, "tolerance", defaults.tolerance)?,
        timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
    };

    Ok(StrategyCommands {
        strategy_start: required_date(config, s, "strategy_start")?,
        lookback: LookbackSpec::new(lookback_length, lookback_unit),
        rebalance: optional_bool(config, s, "rebalance", true)?,
        cadence: optional_parsed(config, s, "rebalance_frequency", Default::default())?,
        bounds,
        bound_overrides,
        constraints,
        objective,
        solver,
        failure_policy: optional_parsed(config, s, "on_period_failure", Default::default())?,
        workers: optional_parsed(config, s, "workers", 0)?,
    })
}

/// Cross-field checks on a fully parsed universe.
pub fn validate_universe_spec(spec: &UniverseSpec) -> Result<(), RebalancerError> {
    let u = &spec.universe;
    let c = &spec.commands;

    validate_dates(u.start_date, u.end_date, c.strategy_start)?;
    validate_lookback(c.lookback)?;

    let bounds = resolve_bounds(&u.assets, &c.bounds, &c.bound_overrides)?;
    let constraints = match &c.constraints {
        Some(spec) => spec.resolve(&u.assets)?,
        None => ConstraintSet::default(),
    };
    check_feasible(&bounds, &constraints)?;

    validate_objective(&c.objective)?;
    validate_solver(&c.solver)?;
    Ok(())
}

/// `start < end` and the strategy start falls inside the analysis window.
pub fn validate_dates(
    analysis_start: NaiveDate,
    analysis_end: NaiveDate,
    strategy_start: NaiveDate,
) -> Result<(), RebalancerError> {
    if analysis_start >= analysis_end {
        return Err(RebalancerError::config_invalid(
            UNIVERSE_SECTION,
            "start_date",
            "start_date must be before end_date",
        ));
    }
    if strategy_start < analysis_start {
        return Err(RebalancerError::config_invalid(
            COMMANDS_SECTION,
            "strategy_start",
            format!(
                "strategy_start {} precedes universe start_date {}",
                strategy_start, analysis_start
            ),
        ));
    }
    if strategy_start > analysis_end {
        return Err(RebalancerError::config_invalid(
            COMMANDS_SECTION,
            "strategy_start",
            format!(
                "strategy_start {} is after universe end_date {}",
                strategy_start, analysis_end
            ),
        ));
    }
    Ok(())
}

pub fn validate_lookback(lookback: LookbackSpec) -> Result<(), RebalancerError> {
    if lookback.length <= 0 {
        return Err(RebalancerError::config_invalid(
            COMMANDS_SECTION,
            "lookback_length",
            "lookback_length must be positive",
        ));
    }
    Ok(())
}

pub fn validate_objective(objective: &Objective) -> Result<(), RebalancerError> {
    match *objective {
        Objective::MaxSharpe { risk_free_rate } if !risk_free_rate.is_finite() => Err(
            RebalancerError::config_invalid(COMMANDS_SECTION, "risk_free_rate", "must be finite"),
        ),
        Objective::MeanVariance { risk_aversion } if !(risk_aversion > 0.0) => {
            Err(RebalancerError::config_invalid(
                COMMANDS_SECTION,
                "risk_aversion",
                "risk_aversion must be positive",
            ))
        }
        _ => Ok(()),
    }
}

pub fn validate_solver(settings: &SolverSettings) -> Result<(), RebalancerError> {
    if settings.max_iterations == 0 {
        return Err(RebalancerError::config_invalid(
            COMMANDS_SECTION,
            "max_iterations",
            "max_iterations must be positive",
        ));
    }
    if !(settings.tolerance > 0.0) || !settings.tolerance.is_finite() {
        return Err(RebalancerError::config_invalid(
            COMMANDS_SECTION,
            "tolerance",
            "tolerance must be a positive number",
        ));
    }
    Ok(())
}

fn required_date(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<NaiveDate, RebalancerError> {
    match config.get_string(section, key) {
        None => Err(RebalancerError::config_missing(section, key)),
        Some(s) => config.get_date(section, key).ok_or_else(|| {
            RebalancerError::config_invalid(
                section,
                key,
                format!("invalid {} '{}', expected YYYY-MM-DD", key, s),
            )
        }),
    }
}

fn parse_value<T>(raw: &str, section: &str, key: &str) -> Result<T, RebalancerError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e| RebalancerError::config_invalid(section, key, format!("'{}': {}", raw, e)))
}

fn optional_parsed<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: T,
) -> Result<T, RebalancerError>
where
    T: FromStr,
    T::Err: Display,
{
    match config.get_string(section, key) {
        Some(raw) => parse_value(&raw, section, key),
        None => Ok(default),
    }
}

pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

fn optional_bool(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: bool,
) -> Result<bool, RebalancerError> {
    match config.get_string(section, key) {
        Some(raw) => parse_bool(&raw).ok_or_else(|| {
            RebalancerError::config_invalid(section, key, format!("'{}' is not a boolean", raw))
        }),
        None => Ok(default),
    }
}
