//! INI file configuration adapter.

use crate::domain::error::RebalancerError;
use crate::ports::config_port::ConfigPort;
use configparser::ini::Ini;
use std::path::Path;

pub struct FileConfigAdapter {
    config: Ini,
}

impl FileConfigAdapter {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RebalancerError> {
        let path = path.as_ref();
        let mut config = Ini::new();
        config
            .load(path)
            .map_err(|reason| RebalancerError::ConfigParse {
                file: path.display().to_string(),
                reason,
            })?;
        Ok(Self { config })
    }

    pub fn from_string(content: &str) -> Result<Self, RebalancerError> {
        let mut config = Ini::new();
        config
            .read(content.to_string())
            .map_err(|reason| RebalancerError::ConfigParse {
                file: "<string>".to_string(),
                reason,
            })?;
        Ok(Self { config })
    }
}

impl ConfigPort for FileConfigAdapter {
    fn get_string(&self, section: &str, key: &str) -> Option<String> {
        self.config
            .get(section, key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn section_entries(&self, section: &str) -> Vec<(String, String)> {
        let map = self.config.get_map_ref();
        let mut entries: Vec<(String, String)> = map
            .get(&section.to_lowercase())
            .map(|keys| {
                keys.iter()
                    .map(|(k, v)| (k.clone(), v.clone().unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default();
        entries.sort();
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    const UNIVERSE: &str = r#"
[universe]
data_source = prices.csv
start_date = 2018-01-01
end_date = 2021-12-31
assets = AAA, BBB, CCC

[commands]
strategy_start = 2019-01-01
lookback_length = 6
rebalance = yes
risk_free_rate = 0.0001
max_iterations = 250

[description]
name = Three asset demo
owner = research
"#;

    #[test]
    fn from_string_parses_sections() {
        let adapter = FileConfigAdapter::from_string(UNIVERSE).unwrap();
        assert_eq!(
            adapter.get_string("universe", "data_source"),
            Some("prices.csv".to_string())
        );
        assert_eq!(
            adapter.get_string("universe", "assets"),
            Some("AAA, BBB, CCC".to_string())
        );
    }

    #[test]
    fn get_string_returns_none_for_missing_or_blank() {
        let adapter = FileConfigAdapter::from_string("[commands]\nbounds =\n").unwrap();
        assert_eq!(adapter.get_string("commands", "bounds"), None);
        assert_eq!(adapter.get_string("commands", "missing"), None);
        assert_eq!(adapter.get_string("missing_section", "key"), None);
    }

    #[test]
    fn get_date_parses_iso_dates() {
        let adapter = FileConfigAdapter::from_string(UNIVERSE).unwrap();
        assert_eq!(
            adapter.get_date("commands", "strategy_start"),
            NaiveDate::from_ymd_opt(2019, 1, 1)
        );
        assert_eq!(adapter.get_date("universe", "data_source"), None);
    }

    #[test]
    fn section_entries_are_sorted() {
        let adapter = FileConfigAdapter::from_string(UNIVERSE).unwrap();
        assert_eq!(
            adapter.section_entries("description"),
            vec![
                ("name".to_string(), "Three asset demo".to_string()),
                ("owner".to_string(), "research".to_string()),
            ]
        );
        assert!(adapter.section_entries("nothing").is_empty());
    }

    #[test]
    fn from_file_reads_config() {
        let file = create_temp_config(UNIVERSE);
        let adapter = FileConfigAdapter::from_file(file.path()).unwrap();
        assert_eq!(
            adapter.get_string("universe", "end_date"),
            Some("2021-12-31".to_string())
        );
    }

    #[test]
    fn from_file_missing_is_parse_error() {
        let result = FileConfigAdapter::from_file("/nonexistent/path/universe.ini");
        assert!(matches!(result, Err(RebalancerError::ConfigParse { .. })));
    }
}
