//! Domain error types.

use chrono::NaiveDate;
use std::fmt;

/// Stage of the per-period pipeline in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Slice,
    Statistics,
    Solve,
    Track,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Slice => "slice",
            PipelineStage::Statistics => "statistics",
            PipelineStage::Solve => "solve",
            PipelineStage::Track => "track",
        };
        f.write_str(name)
    }
}

/// Top-level error type for rebalancer.
#[derive(Debug, thiserror::Error)]
pub enum RebalancerError {
    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid rebalance cadence {cadence}: {reason}")]
    InvalidCadence { cadence: String, reason: String },

    #[error("invalid lookback {lookback}: {reason}")]
    InvalidLookback { lookback: String, reason: String },

    #[error("data error: {reason}")]
    Data { reason: String },

    #[error("no rows between {start} and {end}")]
    EmptySlice { start: NaiveDate, end: NaiveDate },

    #[error("insufficient data: have {rows} rows, need {minimum}")]
    InsufficientData { rows: usize, minimum: usize },

    #[error("solver timed out after {elapsed_ms} ms ({iterations} iterations)")]
    SolverTimeout { elapsed_ms: u128, iterations: usize },

    #[error("period {index} failed at {stage} stage: {source}")]
    Period {
        index: usize,
        stage: PipelineStage,
        source: Box<RebalancerError>,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RebalancerError {
    pub fn config_invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        RebalancerError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn config_missing(section: &str, key: &str) -> Self {
        RebalancerError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    /// Wrap a stage failure with the period it belongs to.
    pub fn in_period(self, index: usize, stage: PipelineStage) -> Self {
        RebalancerError::Period {
            index,
            stage,
            source: Box::new(self),
        }
    }

    /// True for per-period failures a sequence may skip over: short or empty
    /// lookback data and solver timeouts. Configuration errors never qualify.
    pub fn is_skippable(&self) -> bool {
        match self {
            RebalancerError::Period { source, .. } => source.is_skippable(),
            RebalancerError::EmptySlice { .. }
            | RebalancerError::InsufficientData { .. }
            | RebalancerError::SolverTimeout { .. } => true,
            _ => false,
        }
    }
}

impl From<&RebalancerError> for std::process::ExitCode {
    fn from(err: &RebalancerError) -> Self {
        let code: u8 = match err {
            RebalancerError::Io(_) => 1,
            RebalancerError::ConfigParse { .. }
            | RebalancerError::ConfigMissing { .. }
            | RebalancerError::ConfigInvalid { .. } => 2,
            RebalancerError::Data { .. }
            | RebalancerError::EmptySlice { .. }
            | RebalancerError::InsufficientData { .. } => 3,
            RebalancerError::InvalidCadence { .. } | RebalancerError::InvalidLookback { .. } => 4,
            RebalancerError::SolverTimeout { .. } | RebalancerError::Period { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_error_names_index_and_stage() {
        let err = RebalancerError::InsufficientData {
            rows: 2,
            minimum: 4,
        }
        .in_period(7, PipelineStage::Statistics);
        let msg = err.to_string();
        assert!(msg.contains("period 7"));
        assert!(msg.contains("statistics"));
        assert!(msg.contains("have 2 rows, need 4"));
    }

    #[test]
    fn skippable_errors() {
        let insufficient = RebalancerError::InsufficientData {
            rows: 0,
            minimum: 3,
        }
        .in_period(1, PipelineStage::Statistics);
        assert!(insufficient.is_skippable());

        let timeout = RebalancerError::SolverTimeout {
            elapsed_ms: 10,
            iterations: 3,
        }
        .in_period(2, PipelineStage::Solve);
        assert!(timeout.is_skippable());

        let config = RebalancerError::config_invalid("commands", "long_floor", "bad");
        assert!(!config.is_skippable());
        assert!(!config.in_period(3, PipelineStage::Solve).is_skippable());
    }

    #[test]
    fn config_helpers_fill_fields() {
        let err = RebalancerError::config_missing("universe", "assets");
        assert!(
            matches!(err, RebalancerError::ConfigMissing { ref section, ref key } if section == "universe" && key == "assets")
        );
        assert_eq!(err.to_string(), "missing config key [universe] assets");
    }
}
