//! Data models for stored records.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::{Date, OffsetDateTime, UtcOffset};

use episeries_types::Granularity;

/// The UTC calendar date of an instant, time-of-day stripped.
pub fn strip_time(at: OffsetDateTime) -> Date {
    at.to_offset(UtcOffset::UTC).date()
}

/// A record to be written to the store.
///
/// Column-backed fields are explicit; every indicator-specific field
/// (value fields and split dimensions) goes into `attributes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
    /// Indicator collection the record belongs to.
    pub collection: String,
    /// Reporting date (UTC).
    pub date: Date,
    /// Location code.
    pub location: Option<String>,
    /// Daily or weekly record.
    pub period_type: Granularity,
    /// Upstream data-source identifier.
    pub source_id: Option<String>,
    /// Denormalized roll-up row for its date.
    pub is_date_total: bool,
    /// Indicator-specific fields.
    pub attributes: Map<String, Value>,
}

impl NewRecord {
    /// Create a record with no location, source or attributes.
    pub fn new(collection: &str, date: Date, period_type: Granularity) -> Self {
        Self {
            collection: collection.to_string(),
            date,
            location: None,
            period_type,
            source_id: None,
            is_date_total: false,
            attributes: Map::new(),
        }
    }

    /// Create a record from a full timestamp, keeping only its UTC date.
    pub fn at_instant(collection: &str, at: OffsetDateTime, period_type: Granularity) -> Self {
        Self::new(collection, strip_time(at), period_type)
    }

    /// Set the location code.
    pub fn at(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }

    /// Set the data-source identifier.
    pub fn source(mut self, source_id: &str) -> Self {
        self.source_id = Some(source_id.to_string());
        self
    }

    /// Mark the record as the roll-up row of its date.
    pub fn date_total(mut self) -> Self {
        self.is_date_total = true;
        self
    }

    /// Set an indicator-specific attribute.
    pub fn attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Unix timestamp of the record date at UTC midnight.
    pub(crate) fn date_timestamp(&self) -> i64 {
        self.date.midnight().assume_utc().unix_timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn test_strip_time_uses_utc_date() {
        let late_evening = datetime!(2024-01-01 23:30:00 -02:00);
        assert_eq!(strip_time(late_evening), date!(2024 - 01 - 02));
    }

    #[test]
    fn test_at_instant_strips_time() {
        let record =
            NewRecord::at_instant("cases", datetime!(2024-03-10 17:45:12 UTC), Granularity::Daily);
        assert_eq!(record.date, date!(2024 - 03 - 10));
        assert_eq!(record.date_timestamp(), 1_710_028_800);
    }

    #[test]
    fn test_builder_chaining() {
        let record = NewRecord::new("deaths", date!(2024 - 01 - 01), Granularity::Weekly)
            .at("DE-BY")
            .source("src-1")
            .date_total()
            .attr("value", 3)
            .attr("gender", "female");

        assert_eq!(record.location.as_deref(), Some("DE-BY"));
        assert_eq!(record.source_id.as_deref(), Some("src-1"));
        assert!(record.is_date_total);
        assert_eq!(record.attributes["value"], 3);
        assert_eq!(record.attributes["gender"], "female");
    }
}
