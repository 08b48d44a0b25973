//! Rebalance timeline: consecutive active windows from the strategy start to
//! "now", each paired with the lookback window that feeds its allocation.

use crate::domain::calendar::{LookbackSpec, RebalanceCadence};
use crate::domain::error::RebalancerError;
use crate::ports::calendar_port::CalendarPort;
use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebalancePeriod {
    /// 1-based, contiguous.
    pub index: usize,
    pub active_start: NaiveDate,
    pub active_end: NaiveDate,
    pub lookback_start: NaiveDate,
    /// Always the day before `active_start`.
    pub lookback_end: NaiveDate,
}

impl RebalancePeriod {
    pub fn id(&self) -> String {
        format!("portfolio_{:04}", self.index)
    }

    /// The active window has not finished as of `as_of`.
    pub fn is_in_progress(&self, as_of: NaiveDate) -> bool {
        self.active_end >= as_of
    }

    pub fn active_days(&self) -> i64 {
        (self.active_end - self.active_start).num_days() + 1
    }
}

impl fmt::Display for RebalancePeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: active {} .. {}, lookback {} .. {}",
            self.id(),
            self.active_start,
            self.active_end,
            self.lookback_start,
            self.lookback_end
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineRequest {
    pub strategy_start: NaiveDate,
    pub cadence: RebalanceCadence,
    pub lookback: LookbackSpec,
    pub rebalance: bool,
    pub as_of: NaiveDate,
}

fn lookback_window(
    calendar: &dyn CalendarPort,
    active_start: NaiveDate,
    lookback: LookbackSpec,
) -> Result<(NaiveDate, NaiveDate), RebalancerError> {
    let lookback_end = active_start
        .pred_opt()
        .ok_or_else(|| RebalancerError::InvalidLookback {
            lookback: lookback.to_string(),
            reason: format!("no day precedes {}", active_start),
        })?;
    let lookback_start = calendar
        .lookback_start(lookback_end, lookback)
        .filter(|start| *start <= lookback_end)
        .ok_or_else(|| RebalancerError::InvalidLookback {
            lookback: lookback.to_string(),
            reason: format!("cannot compute lookback start from {}", lookback_end),
        })?;
    Ok((lookback_start, lookback_end))
}

/// Generate the ordered rebalance periods.
///
/// A period is admitted while its *start* precedes `as_of`, so the final
/// period's active window may extend past `as_of`. With rebalancing disabled
/// a single buy-and-hold period spans `strategy_start ..= as_of`.
pub fn build_timeline(
    calendar: &dyn CalendarPort,
    request: &TimelineRequest,
) -> Result<Vec<RebalancePeriod>, RebalancerError> {
    if request.lookback.length <= 0 {
        return Err(RebalancerError::InvalidLookback {
            lookback: request.lookback.to_string(),
            reason: "lookback length must be positive".into(),
        });
    }

    if !request.rebalance {
        if request.strategy_start >= request.as_of {
            return Ok(Vec::new());
        }
        let (lookback_start, lookback_end) =
            lookback_window(calendar, request.strategy_start, request.lookback)?;
        return Ok(vec![RebalancePeriod {
            index: 1,
            active_start: request.strategy_start,
            active_end: request.as_of,
            lookback_start,
            lookback_end,
        }]);
    }

    let mut periods = Vec::new();
    let mut cursor = request.strategy_start;
    let mut index = 1;

    while cursor < request.as_of {
        let active_end = calendar
            .period_end(cursor, request.cadence)
            .ok_or_else(|| RebalancerError::InvalidCadence {
                cadence: request.cadence.to_string(),
                reason: format!("cannot compute period end from {}", cursor),
            })?;
        if active_end < cursor {
            return Err(RebalancerError::InvalidCadence {
                cadence: request.cadence.to_string(),
                reason: format!(
                    "period starting {} ends {}, cadence does not advance",
                    cursor, active_end
                ),
            });
        }
        let (lookback_start, lookback_end) = lookback_window(calendar, cursor, request.lookback)?;

        periods.push(RebalancePeriod {
            index,
            active_start: cursor,
            active_end,
            lookback_start,
            lookback_end,
        });

        cursor = match active_end.succ_opt() {
            Some(next) => next,
            None => break,
        };
        index += 1;
    }

    Ok(periods)
}
