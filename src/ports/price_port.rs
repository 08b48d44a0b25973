//! Price series access port trait.

use crate::domain::error::RebalancerError;
use crate::domain::series::SeriesTable;
use chrono::NaiveDate;

pub trait PricePort: Send + Sync {
    /// Load a date-indexed price table with one column per requested asset,
    /// in the order given. Missing observations are `NaN`.
    fn load_prices(&self, assets: &[String]) -> Result<SeriesTable, RebalancerError>;

    /// Asset columns available from this source.
    fn list_assets(&self) -> Result<Vec<String>, RebalancerError>;

    /// First date, last date and row count, or `None` when the source is empty.
    fn data_range(&self) -> Result<Option<(NaiveDate, NaiveDate, usize)>, RebalancerError>;
}
