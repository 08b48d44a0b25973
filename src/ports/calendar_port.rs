//! Calendar policy port: date arithmetic consumed by the timeline builder.

use crate::domain::calendar::{LookbackSpec, RebalanceCadence};
use chrono::NaiveDate;

pub trait CalendarPort: Send + Sync {
    /// Last day (inclusive) of the rebalance period starting at `start`.
    ///
    /// `None` when the result is not representable.
    fn period_end(&self, start: NaiveDate, cadence: RebalanceCadence) -> Option<NaiveDate>;

    /// First day (inclusive) of the lookback window ending at `end`.
    fn lookback_start(&self, end: NaiveDate, lookback: LookbackSpec) -> Option<NaiveDate>;
}
