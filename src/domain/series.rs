//! Date-indexed numeric table shared by price and log-return data.
//!
//! Rows are observations (strictly increasing dates), columns are assets.
//! Missing observations are stored as `NaN`.

use crate::domain::calendar::Interval;
use crate::domain::error::RebalancerError;
use chrono::{Datelike, NaiveDate};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Which rows to drop when observations are missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MissingDataPolicy {
    /// Drop a row if any asset is missing.
    #[default]
    Any,
    /// Drop a row only if every asset is missing.
    All,
}

impl fmt::Display for MissingDataPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingDataPolicy::Any => f.write_str("any"),
            MissingDataPolicy::All => f.write_str("all"),
        }
    }
}

impl FromStr for MissingDataPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" => Ok(MissingDataPolicy::Any),
            "all" => Ok(MissingDataPolicy::All),
            _ => Err(format!("unknown dropna policy '{}'", s.trim())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesTable {
    dates: Vec<NaiveDate>,
    assets: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl SeriesTable {
    pub fn new(
        dates: Vec<NaiveDate>,
        assets: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, RebalancerError> {
        if dates.len() != rows.len() {
            return Err(RebalancerError::Data {
                reason: format!("{} dates but {} rows", dates.len(), rows.len()),
            });
        }
        let mut seen = HashSet::new();
        for asset in &assets {
            if !seen.insert(asset.as_str()) {
                return Err(RebalancerError::Data {
                    reason: format!("duplicate asset column {}", asset),
                });
            }
        }
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != assets.len())
        {
            return Err(RebalancerError::Data {
                reason: format!(
                    "row {} ({}) has {} values, expected {}",
                    i,
                    dates[i],
                    row.len(),
                    assets.len()
                ),
            });
        }
        if let Some(w) = dates.windows(2).find(|w| w[0] >= w[1]) {
            return Err(RebalancerError::Data {
                reason: format!("dates not strictly increasing at {} -> {}", w[0], w[1]),
            });
        }
        Ok(Self {
            dates,
            assets,
            rows,
        })
    }

    pub fn empty(assets: Vec<String>) -> Self {
        Self {
            dates: Vec::new(),
            assets,
            rows: Vec::new(),
        }
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.rows[i]
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.dates.first().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn asset_index(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    pub fn column(&self, j: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |row| row[j])
    }

    fn index_range(&self, start: NaiveDate, end: NaiveDate) -> (usize, usize) {
        let lo = self.dates.partition_point(|d| *d < start);
        let hi = self.dates.partition_point(|d| *d <= end);
        (lo, hi.max(lo))
    }

    fn take_rows(&self, lo: usize, hi: usize) -> SeriesTable {
        SeriesTable {
            dates: self.dates[lo..hi].to_vec(),
            assets: self.assets.clone(),
            rows: self.rows[lo..hi].to_vec(),
        }
    }

    /// Rows with `start <= date <= end`; empty when nothing falls in range.
    pub fn restrict(&self, start: NaiveDate, end: NaiveDate) -> SeriesTable {
        let (lo, hi) = self.index_range(start, end);
        self.take_rows(lo, hi)
    }

    /// Like [`restrict`](Self::restrict) but an empty result is an error.
    pub fn slice(&self, start: NaiveDate, end: NaiveDate) -> Result<SeriesTable, RebalancerError> {
        let (lo, hi) = self.index_range(start, end);
        if lo == hi {
            return Err(RebalancerError::EmptySlice { start, end });
        }
        Ok(self.take_rows(lo, hi))
    }

    /// Reorder/subset columns to `assets`.
    pub fn select(&self, assets: &[String]) -> Result<SeriesTable, RebalancerError> {
        let indices = assets
            .iter()
            .map(|a| {
                self.asset_index(a).ok_or_else(|| RebalancerError::Data {
                    reason: format!("asset {} not present in price table", a),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&j| row[j]).collect())
            .collect();
        Ok(SeriesTable {
            dates: self.dates.clone(),
            assets: assets.to_vec(),
            rows,
        })
    }

    pub fn drop_missing(&self, policy: MissingDataPolicy) -> SeriesTable {
        let keep = |row: &Vec<f64>| match policy {
            MissingDataPolicy::Any => row.iter().all(|v| v.is_finite()),
            MissingDataPolicy::All => row.iter().any(|v| v.is_finite()),
        };
        let (dates, rows) = self
            .dates
            .iter()
            .zip(self.rows.iter())
            .filter(|(_, row)| keep(row))
            .map(|(d, row)| (*d, row.clone()))
            .unzip();
        SeriesTable {
            dates,
            assets: self.assets.clone(),
            rows,
        }
    }

    /// Keep the last observation of each ISO week or calendar month.
    pub fn resample(&self, interval: Interval) -> SeriesTable {
        let bucket = |d: &NaiveDate| -> (i32, u32) {
            match interval {
                Interval::Daily => (d.year(), d.ordinal()),
                Interval::Weekly => (d.iso_week().year(), d.iso_week().week()),
                Interval::Monthly => (d.year(), d.month()),
            }
        };
        if interval == Interval::Daily {
            return self.clone();
        }

        let mut dates = Vec::new();
        let mut rows = Vec::new();
        for i in 0..self.dates.len() {
            let is_last = i + 1 == self.dates.len()
                || bucket(&self.dates[i]) != bucket(&self.dates[i + 1]);
            if is_last {
                dates.push(self.dates[i]);
                rows.push(self.rows[i].clone());
            }
        }
        SeriesTable {
            dates,
            assets: self.assets.clone(),
            rows,
        }
    }

    /// Natural-log returns between consecutive rows, dated at the later row.
    ///
    /// The first row has no predecessor and is dropped. Rows whose return is
    /// not finite for some asset (gaps, non-positive prices) are dropped too.
    pub fn log_returns(&self) -> SeriesTable {
        let mut dates = Vec::with_capacity(self.len().saturating_sub(1));
        let mut rows = Vec::with_capacity(self.len().saturating_sub(1));
        let mut dropped = 0usize;

        for i in 1..self.rows.len() {
            let prev = &self.rows[i - 1];
            let curr = &self.rows[i];
            let row: Vec<f64> = prev
                .iter()
                .zip(curr.iter())
                .map(|(p0, p1)| (p1 / p0).ln())
                .collect();
            if row.iter().all(|v| v.is_finite()) {
                dates.push(self.dates[i]);
                rows.push(row);
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            debug!(dropped, "dropped log-return rows with non-finite values");
        }

        SeriesTable {
            dates,
            assets: self.assets.clone(),
            rows,
        }
    }
}
