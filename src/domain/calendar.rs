//! Calendar vocabulary: rebalance cadences, lookback lengths and
//! sampling intervals.
//!
//! Date arithmetic lives behind [`CalendarPort`](crate::ports::calendar_port::CalendarPort);
//! this module only names the rules and parses them from configuration text.

use std::fmt;
use std::str::FromStr;

/// How often the allocation is recomputed.
///
/// Named cadences end on the calendar boundary containing the period start
/// (e.g. `Monthly` from 2020-01-15 ends 2020-01-31). `Days(n)` spans `n`
/// calendar days starting at the period start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RebalanceCadence {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    SemiAnnually,
    Annually,
    Days(u32),
}

impl fmt::Display for RebalanceCadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceCadence::Daily => f.write_str("daily"),
            RebalanceCadence::Weekly => f.write_str("weekly"),
            RebalanceCadence::Monthly => f.write_str("monthly"),
            RebalanceCadence::Quarterly => f.write_str("quarterly"),
            RebalanceCadence::SemiAnnually => f.write_str("semiannually"),
            RebalanceCadence::Annually => f.write_str("annually"),
            RebalanceCadence::Days(n) => write!(f, "{}d", n),
        }
    }
}

impl FromStr for RebalanceCadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        match lower.as_str() {
            "daily" | "day" | "d" => Ok(RebalanceCadence::Daily),
            "weekly" | "week" | "w" => Ok(RebalanceCadence::Weekly),
            "monthly" | "month" | "m" => Ok(RebalanceCadence::Monthly),
            "quarterly" | "quarter" | "q" => Ok(RebalanceCadence::Quarterly),
            "semiannually" | "semiannual" | "biannually" => Ok(RebalanceCadence::SemiAnnually),
            "annually" | "annual" | "yearly" | "y" => Ok(RebalanceCadence::Annually),
            other => match other.strip_suffix('d') {
                Some(n) => match n.trim().parse::<u32>() {
                    Ok(0) => Err(format!(
                        "rebalance frequency '{}' must span at least one day",
                        s.trim()
                    )),
                    Ok(days) => Ok(RebalanceCadence::Days(days)),
                    Err(_) => Err(format!("unknown rebalance frequency '{}'", s.trim())),
                },
                None => Err(format!("unknown rebalance frequency '{}'", s.trim())),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LookbackUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl fmt::Display for LookbackUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LookbackUnit::Days => "days",
            LookbackUnit::Weeks => "weeks",
            LookbackUnit::Months => "months",
            LookbackUnit::Years => "years",
        };
        f.write_str(name)
    }
}

impl FromStr for LookbackUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "day" | "days" => Ok(LookbackUnit::Days),
            "week" | "weeks" => Ok(LookbackUnit::Weeks),
            "month" | "months" => Ok(LookbackUnit::Months),
            "year" | "years" => Ok(LookbackUnit::Years),
            _ => Err(format!("unknown lookback unit '{}'", s.trim())),
        }
    }
}

/// The single `{unit: length}` pair handed to the calendar when computing a
/// lookback window start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LookbackSpec {
    pub length: i64,
    pub unit: LookbackUnit,
}

impl LookbackSpec {
    pub fn new(length: i64, unit: LookbackUnit) -> Self {
        Self { length, unit }
    }
}

impl fmt::Display for LookbackSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.length, self.unit)
    }
}

/// Sampling interval of the price table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interval {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Interval::Daily => "1d",
            Interval::Weekly => "1wk",
            Interval::Monthly => "1mo",
        };
        f.write_str(name)
    }
}

impl Interval {
    /// Observations per year, used to annualize statistics.
    pub fn periods_per_year(&self) -> f64 {
        match self {
            Interval::Daily => 252.0,
            Interval::Weekly => 52.0,
            Interval::Monthly => 12.0,
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1d" | "daily" => Ok(Interval::Daily),
            "1wk" | "1w" | "weekly" => Ok(Interval::Weekly),
            "1mo" | "1m" | "monthly" => Ok(Interval::Monthly),
            _ => Err(format!("unknown interval '{}'", s.trim())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_named_cadences() {
        assert_eq!("monthly".parse(), Ok(RebalanceCadence::Monthly));
        assert_eq!(" Weekly ".parse(), Ok(RebalanceCadence::Weekly));
        assert_eq!("yearly".parse(), Ok(RebalanceCadence::Annually));
        assert_eq!("quarterly".parse(), Ok(RebalanceCadence::Quarterly));
        assert_eq!("semiannually".parse(), Ok(RebalanceCadence::SemiAnnually));
    }

    #[test]
    fn parse_day_count_cadence() {
        assert_eq!("10d".parse(), Ok(RebalanceCadence::Days(10)));
        assert!("0d".parse::<RebalanceCadence>().is_err());
        assert!("xd".parse::<RebalanceCadence>().is_err());
        assert!("fortnightly".parse::<RebalanceCadence>().is_err());
    }

    #[test]
    fn cadence_display_round_trips_text() {
        assert_eq!(RebalanceCadence::Days(5).to_string(), "5d");
        assert_eq!(RebalanceCadence::Monthly.to_string(), "monthly");
    }

    #[test]
    fn parse_lookback_units() {
        assert_eq!("month".parse(), Ok(LookbackUnit::Months));
        assert_eq!("Years".parse(), Ok(LookbackUnit::Years));
        assert!("fortnights".parse::<LookbackUnit>().is_err());
    }

    #[test]
    fn parse_intervals() {
        assert_eq!("1d".parse(), Ok(Interval::Daily));
        assert_eq!("1wk".parse(), Ok(Interval::Weekly));
        assert_eq!("1mo".parse(), Ok(Interval::Monthly));
        assert!("5m".parse::<Interval>().is_err());
        assert_eq!(Interval::default(), Interval::Daily);
    }

    #[test]
    fn lookback_display() {
        let spec = LookbackSpec::new(6, LookbackUnit::Months);
        assert_eq!(spec.to_string(), "6 months");
    }

    #[test]
    fn periods_per_year_by_interval() {
        assert_eq!(Interval::Daily.periods_per_year(), 252.0);
        assert_eq!(Interval::Weekly.periods_per_year(), 52.0);
        assert_eq!(Interval::Monthly.periods_per_year(), 12.0);
    }
}
