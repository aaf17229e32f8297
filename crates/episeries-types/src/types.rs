//! Core types for indicator time series.

use core::fmt;
use core::str::FromStr;
use std::collections::BTreeMap;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime, macros::format_description};

use crate::error::{ParseError, ParseResult};

/// Bucketing of an output series.
///
/// The same value is stored on every record as its `period_type`, so it
/// doubles as a retrieval predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Granularity {
    /// One entry per calendar day.
    #[default]
    Daily,
    /// One entry per anchored week.
    Weekly,
}

impl Granularity {
    /// The stored `period_type` value for this granularity.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Daily => "Daily",
            Granularity::Weekly => "Weekly",
        }
    }

    /// The other granularity.
    #[must_use]
    pub fn alternate(&self) -> Self {
        match self {
            Granularity::Daily => Granularity::Weekly,
            Granularity::Weekly => Granularity::Daily,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = ParseError;

    /// Parse a period type, ignoring ASCII case.
    ///
    /// # Examples
    ///
    /// ```
    /// use episeries_types::Granularity;
    ///
    /// assert_eq!("Weekly".parse::<Granularity>(), Ok(Granularity::Weekly));
    /// assert_eq!("daily".parse::<Granularity>(), Ok(Granularity::Daily));
    /// assert!("Monthly".parse::<Granularity>().is_err());
    /// ```
    fn from_str(s: &str) -> ParseResult<Self> {
        if s.eq_ignore_ascii_case("daily") {
            Ok(Granularity::Daily)
        } else if s.eq_ignore_ascii_case("weekly") {
            Ok(Granularity::Weekly)
        } else {
            Err(ParseError::InvalidPeriodType(s.to_string()))
        }
    }
}

/// Format a date as an ISO `YYYY-MM-DD` string.
#[must_use]
pub fn iso_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Parse an ISO `YYYY-MM-DD` string.
pub fn parse_iso_date(s: &str) -> ParseResult<Date> {
    Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
        .map_err(|_| ParseError::InvalidDate(s.to_string()))
}

/// A single comparable value in a predicate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

/// Constraint on one stored field.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Constraint {
    /// Field equals the value.
    Eq(Scalar),
    /// Field equals one of the values.
    In(Vec<Scalar>),
    /// Field is present (and not null).
    Exists,
    /// Field is absent.
    NotExists,
}

/// The predicate set handed to the storage collaborator.
///
/// Date bounds are inclusive and expressed in UTC.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Field constraints, all of which must hold.
    pub predicates: BTreeMap<String, Constraint>,
    /// Only records dated at or after this instant.
    pub date_from: Option<OffsetDateTime>,
    /// Only records dated at or before this instant.
    pub date_to: Option<OffsetDateTime>,
}

impl Filter {
    /// Create an empty filter matching every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a constraint on a field.
    pub fn with(mut self, field: &str, constraint: Constraint) -> Self {
        self.predicates.insert(field.to_string(), constraint);
        self
    }

    /// Constrain a field to a single value.
    pub fn eq(self, field: &str, value: impl Into<Scalar>) -> Self {
        self.with(field, Constraint::Eq(value.into()))
    }

    /// Set the lower date bound.
    pub fn since(mut self, from: OffsetDateTime) -> Self {
        self.date_from = Some(from);
        self
    }

    /// Set the upper date bound.
    pub fn until(mut self, to: OffsetDateTime) -> Self {
        self.date_to = Some(to);
        self
    }
}

/// How several stored values for the same date combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Aggregation {
    /// Flows (new cases, doses given): values add up.
    #[default]
    Sum,
    /// Stocks (occupied beds): duplicate reports must not add up.
    Max,
}

impl Aggregation {
    /// Fold `value` into an accumulator.
    #[must_use]
    pub fn combine(&self, acc: Option<f64>, value: f64) -> f64 {
        match (self, acc) {
            (_, None) => value,
            (Aggregation::Sum, Some(a)) => a + value,
            (Aggregation::Max, Some(a)) => a.max(value),
        }
    }
}

/// Projection requested from storage: which field carries the number, and
/// which (if any) carries the split value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowShape {
    /// Numeric field that becomes [`RawRow::total`].
    pub value_field: String,
    /// Categorical field that becomes [`RawRow::split_value`].
    pub split_field: Option<String>,
    /// Combination rule used by grouped retrieval.
    pub aggregation: Aggregation,
}

impl RowShape {
    /// Shape with no split dimension.
    pub fn new(value_field: &str, aggregation: Aggregation) -> Self {
        Self {
            value_field: value_field.to_string(),
            split_field: None,
            aggregation,
        }
    }

    /// Add a split dimension.
    pub fn split_by(mut self, field: Option<&str>) -> Self {
        self.split_field = field.map(str::to_string);
        self
    }
}

/// Sort order on the record date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// One row returned by storage.
///
/// Grouped retrieval yields one row per date (or date and split value);
/// raw retrieval yields one row per stored record. `total` is `None` when
/// the stored record lacks the value field.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    /// Calendar date in UTC, time-of-day stripped.
    pub date: Date,
    /// The projected value.
    pub total: Option<f64>,
    /// The projected split value, if a split field was requested.
    pub split_value: Option<String>,
    /// Location code of the record (raw retrieval only).
    pub location: Option<String>,
}

impl RawRow {
    /// Row with a value and nothing else.
    pub fn new(date: Date, total: f64) -> Self {
        Self {
            date,
            total: Some(total),
            split_value: None,
            location: None,
        }
    }

    /// Attach a split value.
    pub fn with_split(mut self, value: &str) -> Self {
        self.split_value = Some(value.to_string());
        self
    }

    /// Attach a location code.
    pub fn at(mut self, location: &str) -> Self {
        self.location = Some(location.to_string());
        self
    }
}

/// Total for one split value.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SplitTotal {
    pub total: f64,
    pub split_value: String,
}

/// One date (or week) of a series.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DailyEntry {
    /// ISO date; for weekly series, the anchored week key.
    pub date: String,
    pub total: f64,
    pub split: Vec<SplitTotal>,
}

impl DailyEntry {
    /// The zero-value entry for a date.
    pub fn zero(date: &str) -> Self {
        Self {
            date: date.to_string(),
            total: 0.0,
            split: Vec::new(),
        }
    }
}

/// One location within a date (or week) of a location series.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocationEntry {
    /// Location code.
    pub code: String,
    pub total: f64,
    pub split: Vec<SplitTotal>,
}

impl LocationEntry {
    /// The zero-value entry for a location.
    pub fn zero(code: &str) -> Self {
        Self {
            code: code.to_string(),
            total: 0.0,
            split: Vec::new(),
        }
    }
}

/// One date (or week) of a location series: every requested location.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LocationDay {
    pub date: String,
    pub locations: Vec<LocationEntry>,
}

/// A reference entity resolved from a split value (e.g. a virus variant).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ReferenceEntity {
    pub id: String,
    pub kind: String,
    pub name: String,
    /// Free-form attributes kept as JSON text.
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub attributes: Option<String>,
}

/// First and last stored date matching a query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DateInterval {
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub start_date: Option<String>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub end_date: Option<String>,
}
