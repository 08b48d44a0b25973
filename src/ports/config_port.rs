//! Configuration access port trait.

use chrono::NaiveDate;

pub trait ConfigPort {
    /// Trimmed value, `None` if missing or blank.
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    /// All key/value pairs of a section, sorted by key. Empty if absent.
    fn section_entries(&self, section: &str) -> Vec<(String, String)>;

    /// `YYYY-MM-DD` date, `None` if missing or malformed.
    fn get_date(&self, section: &str, key: &str) -> Option<NaiveDate> {
        self.get_string(section, key)
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
    }
}
