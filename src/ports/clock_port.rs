//! Source of "now" for timeline generation.

use chrono::NaiveDate;

pub trait ClockPort {
    fn today(&self) -> NaiveDate;
}
