//! CSV price file adapter.
//!
//! Reads a wide table: a `date` column (`YYYY-MM-DD`) followed by one close
//! price column per asset. Blank cells and `NA`/`NaN` become missing values.

use crate::domain::error::RebalancerError;
use crate::domain::series::SeriesTable;
use crate::ports::price_port::PricePort;
use chrono::NaiveDate;
use std::fs;
use std::path::PathBuf;

pub struct CsvPriceAdapter {
    path: PathBuf,
}

impl CsvPriceAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_table(&self) -> Result<SeriesTable, RebalancerError> {
        let content = fs::read_to_string(&self.path).map_err(|e| RebalancerError::Data {
            reason: format!("failed to read {}: {}", self.path.display(), e),
        })?;

        let mut rdr = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = rdr.headers().map_err(|e| RebalancerError::Data {
            reason: format!("CSV header error: {}", e),
        })?;
        match headers.get(0) {
            Some(first) if first.eq_ignore_ascii_case("date") => {}
            _ => {
                return Err(RebalancerError::Data {
                    reason: format!("{}: first column must be 'date'", self.path.display()),
                });
            }
        }
        let assets: Vec<String> = headers.iter().skip(1).map(|h| h.to_uppercase()).collect();

        let mut observations: Vec<(NaiveDate, Vec<f64>)> = Vec::new();
        for result in rdr.records() {
            let record = result.map_err(|e| RebalancerError::Data {
                reason: format!("CSV parse error: {}", e),
            })?;

            let date_str = record.get(0).ok_or_else(|| RebalancerError::Data {
                reason: "missing date column".into(),
            })?;
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d").map_err(|e| {
                RebalancerError::Data {
                    reason: format!("invalid date '{}': {}", date_str, e),
                }
            })?;

            let mut row = Vec::with_capacity(assets.len());
            for (j, asset) in assets.iter().enumerate() {
                let cell = record.get(j + 1).unwrap_or("");
                row.push(parse_price(cell).map_err(|e| RebalancerError::Data {
                    reason: format!("invalid {} price on {}: {}", asset, date, e),
                })?);
            }
            observations.push((date, row));
        }

        observations.sort_by_key(|(date, _)| *date);
        let (dates, rows) = observations.into_iter().unzip();
        SeriesTable::new(dates, assets, rows)
    }
}

fn parse_price(cell: &str) -> Result<f64, std::num::ParseFloatError> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("na") || cell.eq_ignore_ascii_case("null") {
        return Ok(f64::NAN);
    }
    cell.parse()
}

impl PricePort for CsvPriceAdapter {
    fn load_prices(&self, assets: &[String]) -> Result<SeriesTable, RebalancerError> {
        self.read_table()?.select(assets)
    }

    fn list_assets(&self) -> Result<Vec<String>, RebalancerError> {
        Ok(self.read_table()?.assets().to_vec())
    }

    fn data_range(&self) -> Result<Option<(NaiveDate, NaiveDate, usize)>, RebalancerError> {
        let table = self.read_table()?;
        Ok(table
            .first_date()
            .zip(table.last_date())
            .map(|(first, last)| (first, last, table.len())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_data(content: &str) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prices.csv");
        fs::write(&path, content).unwrap();
        (dir, path)
    }

    const PRICES: &str = "date,AAA,BBB,CCC\n\
        2024-01-16,101.0,50.5,\n\
        2024-01-15,100.0,50.0,20.0\n\
        2024-01-17,102.0,NA,21.0\n";

    fn assets(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn load_prices_sorts_by_date_and_selects_columns() {
        let (_dir, path) = setup_test_data(PRICES);
        let adapter = CsvPriceAdapter::new(path);

        let table = adapter.load_prices(&assets(&["CCC", "AAA"])).unwrap();
        assert_eq!(table.assets(), assets(&["CCC", "AAA"]).as_slice());
        assert_eq!(table.len(), 3);
        assert_eq!(table.dates()[0], NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(table.row(0), &[20.0, 100.0]);
        assert!(table.row(1)[0].is_nan());
    }

    #[test]
    fn na_cells_are_missing() {
        let (_dir, path) = setup_test_data(PRICES);
        let table = CsvPriceAdapter::new(path)
            .load_prices(&assets(&["BBB"]))
            .unwrap();
        assert!(table.row(2)[0].is_nan());
    }

    #[test]
    fn unknown_asset_is_data_error() {
        let (_dir, path) = setup_test_data(PRICES);
        let result = CsvPriceAdapter::new(path).load_prices(&assets(&["ZZZ"]));
        assert!(matches!(result, Err(RebalancerError::Data { .. })));
    }

    #[test]
    fn missing_file_is_data_error() {
        let adapter = CsvPriceAdapter::new(PathBuf::from("/nonexistent/prices.csv"));
        assert!(adapter.load_prices(&assets(&["AAA"])).is_err());
    }

    #[test]
    fn bad_price_is_rejected() {
        let (_dir, path) = setup_test_data("date,AAA\n2024-01-15,abc\n");
        let result = CsvPriceAdapter::new(path).load_prices(&assets(&["AAA"]));
        assert!(matches!(result, Err(RebalancerError::Data { .. })));
    }

    #[test]
    fn duplicate_dates_are_rejected() {
        let (_dir, path) = setup_test_data("date,AAA\n2024-01-15,1\n2024-01-15,2\n");
        let result = CsvPriceAdapter::new(path).load_prices(&assets(&["AAA"]));
        assert!(result.is_err());
    }

    #[test]
    fn list_assets_and_range() {
        let (_dir, path) = setup_test_data(PRICES);
        let adapter = CsvPriceAdapter::new(path);
        assert_eq!(adapter.list_assets().unwrap(), assets(&["AAA", "BBB", "CCC"]));
        let (first, last, rows) = adapter.data_range().unwrap().unwrap();
        assert_eq!(first, NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
        assert_eq!(last, NaiveDate::from_ymd_opt(2024, 1, 17).unwrap());
        assert_eq!(rows, 3);
    }

    #[test]
    fn header_only_file_has_no_range() {
        let (_dir, path) = setup_test_data("date,AAA\n");
        assert_eq!(CsvPriceAdapter::new(path).data_range().unwrap(), None);
    }
}
