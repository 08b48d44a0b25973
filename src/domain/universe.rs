//! Universe definition: the asset list, the analysis window and the strategy
//! commands, as read from a universe configuration file.

use crate::domain::bounds::{BoundOverride, BoundsPolicy, ConstraintSpec};
use crate::domain::calendar::{Interval, LookbackSpec, RebalanceCadence};
use crate::domain::config_validation::{
    read_commands_section, read_universe_section, validate_universe_spec,
};
use crate::domain::error::RebalancerError;
use crate::domain::sequence::FailurePolicy;
use crate::domain::series::MissingDataPolicy;
use crate::ports::config_port::ConfigPort;
use crate::ports::optimizer_port::{Objective, SolverSettings};
use chrono::NaiveDate;
use std::collections::HashSet;
use std::path::PathBuf;

pub const UNIVERSE_SECTION: &str = "universe";
pub const COMMANDS_SECTION: &str = "commands";
pub const DESCRIPTION_SECTION: &str = "description";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AssetListError {
    #[error("asset list is empty")]
    Empty,

    #[error("empty token in asset list")]
    EmptyToken,

    #[error("duplicate asset: {0}")]
    DuplicateAsset(String),
}

pub fn parse_assets(input: &str) -> Result<Vec<String>, AssetListError> {
    if input.trim().is_empty() {
        return Err(AssetListError::Empty);
    }

    let mut assets = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(AssetListError::EmptyToken);
        }
        let asset = trimmed.to_uppercase();
        if !seen.insert(asset.clone()) {
            return Err(AssetListError::DuplicateAsset(asset));
        }
        assets.push(asset);
    }

    Ok(assets)
}

/// `[universe]`: what is traded and over which window.
#[derive(Debug, Clone, PartialEq)]
pub struct UniverseSection {
    pub data_source: Option<PathBuf>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub interval: Interval,
    pub missing_data: MissingDataPolicy,
    pub assets: Vec<String>,
}

/// `[commands]`: how the strategy allocates.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyCommands {
    pub strategy_start: NaiveDate,
    pub lookback: LookbackSpec,
    pub rebalance: bool,
    pub cadence: RebalanceCadence,
    pub bounds: BoundsPolicy,
    pub bound_overrides: Vec<BoundOverride>,
    /// `None` means the default budget-only constraint set.
    pub constraints: Option<ConstraintSpec>,
    pub objective: Objective,
    pub solver: SolverSettings,
    pub failure_policy: FailurePolicy,
    /// 0 uses the global rayon pool.
    pub workers: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UniverseSpec {
    pub universe: UniverseSection,
    pub commands: StrategyCommands,
    /// Free-form `[description]` entries, kept as written.
    pub description: Vec<(String, String)>,
}

impl UniverseSpec {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, RebalancerError> {
        let spec = Self {
            universe: read_universe_section(config)?,
            commands: read_commands_section(config)?,
            description: config.section_entries(DESCRIPTION_SECTION),
        };
        validate_universe_spec(&spec)?;
        Ok(spec)
    }

    pub fn name(&self) -> Option<&str> {
        self.description
            .iter()
            .find(|(k, _)| k == "name")
            .map(|(_, v)| v.as_str())
    }
}
