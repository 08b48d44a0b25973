//! Gregorian calendar policy built on chrono.

use crate::domain::calendar::{LookbackSpec, LookbackUnit, RebalanceCadence};
use crate::ports::calendar_port::CalendarPort;
use chrono::{Datelike, Days, Months, NaiveDate};

#[derive(Debug, Clone, Copy, Default)]
pub struct GregorianCalendar;

impl GregorianCalendar {
    pub fn new() -> Self {
        Self
    }
}

fn month_end(year: i32, month: u32) -> Option<NaiveDate> {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.pred_opt()
}

impl CalendarPort for GregorianCalendar {
    fn period_end(&self, start: NaiveDate, cadence: RebalanceCadence) -> Option<NaiveDate> {
        match cadence {
            RebalanceCadence::Daily => Some(start),
            RebalanceCadence::Weekly => {
                let to_sunday = 6 - start.weekday().num_days_from_monday();
                start.checked_add_days(Days::new(u64::from(to_sunday)))
            }
            RebalanceCadence::Monthly => month_end(start.year(), start.month()),
            RebalanceCadence::Quarterly => {
                let quarter_last = ((start.month() - 1) / 3 + 1) * 3;
                month_end(start.year(), quarter_last)
            }
            RebalanceCadence::SemiAnnually => {
                let half_last = if start.month() <= 6 { 6 } else { 12 };
                month_end(start.year(), half_last)
            }
            RebalanceCadence::Annually => NaiveDate::from_ymd_opt(start.year(), 12, 31),
            // Zero days yields the day before `start`, which callers reject.
            RebalanceCadence::Days(0) => start.pred_opt(),
            RebalanceCadence::Days(n) => start.checked_add_days(Days::new(u64::from(n) - 1)),
        }
    }

    fn lookback_start(&self, end: NaiveDate, lookback: LookbackSpec) -> Option<NaiveDate> {
        let length = u32::try_from(lookback.length).ok()?;
        match lookback.unit {
            LookbackUnit::Days => end.checked_sub_days(Days::new(u64::from(length))),
            LookbackUnit::Weeks => end.checked_sub_days(Days::new(u64::from(length) * 7)),
            LookbackUnit::Months => end.checked_sub_months(Months::new(length)),
            LookbackUnit::Years => end.checked_sub_months(Months::new(length.checked_mul(12)?)),
        }
    }
}
