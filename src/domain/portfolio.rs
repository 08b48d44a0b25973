//! One rebalance period's allocation and what it earned.

use crate::domain::series::SeriesTable;
use crate::domain::timeline::RebalancePeriod;
use chrono::NaiveDate;
use std::fmt;

/// Simple portfolio return on one date of the active window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Value of one unit invested at the start of the sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub id: String,
    pub period: RebalancePeriod,
    pub assets: Vec<String>,
    /// Log returns the statistics were estimated from.
    pub lookback: SeriesTable,
    pub expected_returns: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    pub weights: Vec<f64>,
    pub converged: bool,
    pub iterations: usize,
    pub solver_message: String,
    pub realized: Vec<ReturnPoint>,
}

impl Portfolio {
    pub fn weight(&self, asset: &str) -> Option<f64> {
        self.assets
            .iter()
            .position(|a| a == asset)
            .map(|i| self.weights[i])
    }

    /// Compounded return over the realized part of the active window.
    pub fn cumulative_return(&self) -> f64 {
        self.realized.iter().fold(1.0, |acc, p| acc * (1.0 + p.value)) - 1.0
    }

    pub fn is_in_progress(&self, as_of: NaiveDate) -> bool {
        self.period.is_in_progress(as_of)
    }
}

impl fmt::Display for Portfolio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} .. {}]",
            self.id, self.period.active_start, self.period.active_end
        )?;
        for (asset, w) in self.assets.iter().zip(self.weights.iter()) {
            write!(f, " {}={:.4}", asset, w)?;
        }
        write!(f, " return={:+.4}%", self.cumulative_return() * 100.0)?;
        if !self.converged {
            write!(f, " (not converged: {})", self.solver_message)?;
        }
        Ok(())
    }
}
