//! Daily bar schema shared by the fetch, merge, and storage layers.
//!
//! Every dataset is built from [`DailyRecord`]s, whose `date` is always a
//! calendar date and serializes as canonical `YYYY-MM-DD`. Column order on
//! disk follows [`DailyRecord::COLUMNS`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Canonical date format used everywhere a date is written out.
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses the date representations seen from providers and older files.
///
/// Accepts `YYYY-MM-DD`, RFC 3339 timestamps, `YYYY-MM-DD HH:MM:SS`
/// and `YYYY/MM/DD`. Timestamps keep only their date part.
#[must_use]
pub fn parse_canonical_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, CANONICAL_DATE_FORMAT) {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.date());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some(ts.date());
    }
    NaiveDate::parse_from_str(raw, "%Y/%m/%d").ok()
}

/// Formats a date in the canonical `YYYY-MM-DD` form.
#[must_use]
pub fn format_canonical_date(date: NaiveDate) -> String {
    date.format(CANONICAL_DATE_FORMAT).to_string()
}

/// Serde adapter writing canonical dates and reading any accepted form.
pub mod canonical_date {
    use super::{format_canonical_date, parse_canonical_date};
    use chrono::NaiveDate;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_canonical_date(*date))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_canonical_date(&raw).ok_or_else(|| D::Error::custom(format!("invalid date: {raw}")))
    }
}

/// One trading day of OHLCV data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyRecord {
    #[serde(with = "canonical_date")]
    pub date: NaiveDate,
    #[serde(with = "rust_decimal::serde::str")]
    pub open: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub low: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub close: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub volume: Decimal,
}

impl DailyRecord {
    /// Stable on-disk column order.
    pub const COLUMNS: [&'static str; 6] = ["date", "open", "high", "low", "close", "volume"];

    #[must_use]
    pub fn new(
        date: NaiveDate,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// An ordered series of daily records for one entity.
///
/// Construction does not reorder; datasets produced by the merger are
/// ascending by date with unique dates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dataset {
    records: Vec<DailyRecord>,
}

impl Dataset {
    #[must_use]
    pub fn new(records: Vec<DailyRecord>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> &[DailyRecord] {
        &self.records
    }

    #[must_use]
    pub fn into_records(self) -> Vec<DailyRecord> {
        self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Latest date present, regardless of storage order.
    #[must_use]
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.records.iter().map(|r| r.date).max()
    }

    /// True when dates are strictly ascending (sorted, no duplicates).
    #[must_use]
    pub fn is_canonical(&self) -> bool {
        self.records.windows(2).all(|w| w[0].date < w[1].date)
    }
}

impl From<Vec<DailyRecord>> for Dataset {
    fn from(records: Vec<DailyRecord>) -> Self {
        Self::new(records)
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.records.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Dataset {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Vec::<DailyRecord>::deserialize(deserializer).map(Self::new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn record(date: NaiveDate) -> DailyRecord {
        DailyRecord::new(date, dec!(10), dec!(11), dec!(9), dec!(10.5), dec!(1000))
    }

    #[test]
    fn test_parse_canonical_date_formats() {
        let expected = Some(day(2024, 1, 10));
        assert_eq!(parse_canonical_date("2024-01-10"), expected);
        assert_eq!(parse_canonical_date(" 2024-01-10 "), expected);
        assert_eq!(parse_canonical_date("2024-01-10T00:00:00Z"), expected);
        assert_eq!(parse_canonical_date("2024-01-10T16:00:00-05:00"), expected);
        assert_eq!(parse_canonical_date("2024-01-10 09:30:00"), expected);
        assert_eq!(parse_canonical_date("2024/01/10"), expected);
    }

    #[test]
    fn test_parse_canonical_date_rejects_garbage() {
        assert_eq!(parse_canonical_date(""), None);
        assert_eq!(parse_canonical_date("yesterday"), None);
        assert_eq!(parse_canonical_date("2024-13-40"), None);
    }

    #[test]
    fn test_record_json_uses_canonical_date() {
        let json = serde_json::to_value(record(day(2024, 1, 10))).unwrap();
        assert_eq!(json["date"], "2024-01-10");
        assert_eq!(json["close"], "10.5");
    }

    #[test]
    fn test_record_json_accepts_timestamp_date() {
        let parsed: DailyRecord = serde_json::from_str(
            r#"{"date":"2024-01-10T00:00:00Z","open":"1","high":"2","low":"0.5","close":"1.5","volume":"10"}"#,
        )
        .unwrap();
        assert_eq!(parsed.date, day(2024, 1, 10));
        assert_eq!(parsed.close, dec!(1.5));
    }

    #[test]
    fn test_dataset_bounds() {
        let dataset = Dataset::new(vec![record(day(2024, 1, 3)), record(day(2024, 1, 1))]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.last_date(), Some(day(2024, 1, 3)));
        assert!(!dataset.is_canonical());
    }

    #[test]
    fn test_empty_dataset() {
        let dataset = Dataset::empty();
        assert!(dataset.is_empty());
        assert_eq!(dataset.last_date(), None);
        assert!(dataset.is_canonical());
    }
}
