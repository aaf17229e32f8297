//! Query specification builder.
//!
//! Turns the loosely-typed filter parameters of a request into a
//! [`QuerySpec`]: a normalized predicate set, the split dimension, the
//! requested granularity and inclusive date bounds. The spec is built once
//! per request and never mutated; [`QuerySpec::filter`] derives the storage
//! [`Filter`] for each retrieval attempt.

use std::collections::{BTreeMap, BTreeSet};

use time::macros::time;
use time::{Date, OffsetDateTime, PrimitiveDateTime};

use episeries_types::{Constraint, Filter, Granularity, RowShape, Scalar, parse_iso_date};

use crate::error::ValidationError;
use crate::indicators::Indicator;

/// A filter value as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterValue {
    /// Becomes an equality predicate.
    One(String),
    /// Becomes a set-membership predicate.
    Many(Vec<String>),
}

impl FilterValue {
    fn into_constraint(self) -> Constraint {
        match self {
            FilterValue::One(v) => Constraint::Eq(Scalar::Text(v)),
            FilterValue::Many(values) => {
                Constraint::In(values.into_iter().map(Scalar::Text).collect())
            }
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::One(value.to_string())
    }
}

impl From<Vec<&str>> for FilterValue {
    fn from(values: Vec<&str>) -> Self {
        FilterValue::Many(values.into_iter().map(str::to_string).collect())
    }
}

/// Raw request parameters.
#[derive(Debug, Clone, Default)]
pub struct FilterParams {
    pub subcategory: Option<FilterValue>,
    pub location: Option<FilterValue>,
    pub total_type: Option<FilterValue>,
    /// Split dimension field name.
    pub split: Option<String>,
    /// Inclusive `YYYY-MM-DD` lower bound.
    pub start_date: Option<String>,
    /// Inclusive `YYYY-MM-DD` upper bound.
    pub end_date: Option<String>,
    /// `Daily` or `Weekly`; absent means unspecified.
    pub period_type: Option<String>,
    /// Fields that must be absent from matching records.
    pub empty_fields: Vec<String>,
    /// Indicator-specific filters (e.g. `bed_type`).
    pub extra: BTreeMap<String, FilterValue>,
}

impl FilterParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subcategory(mut self, value: impl Into<FilterValue>) -> Self {
        self.subcategory = Some(value.into());
        self
    }

    pub fn location(mut self, value: impl Into<FilterValue>) -> Self {
        self.location = Some(value.into());
        self
    }

    pub fn total_type(mut self, value: impl Into<FilterValue>) -> Self {
        self.total_type = Some(value.into());
        self
    }

    pub fn split(mut self, field: &str) -> Self {
        self.split = Some(field.to_string());
        self
    }

    pub fn start_date(mut self, date: &str) -> Self {
        self.start_date = Some(date.to_string());
        self
    }

    pub fn end_date(mut self, date: &str) -> Self {
        self.end_date = Some(date.to_string());
        self
    }

    pub fn period_type(mut self, period_type: &str) -> Self {
        self.period_type = Some(period_type.to_string());
        self
    }

    pub fn empty_field(mut self, field: &str) -> Self {
        self.empty_fields.push(field.to_string());
        self
    }

    pub fn extra(mut self, field: &str, value: impl Into<FilterValue>) -> Self {
        self.extra.insert(field.to_string(), value.into());
        self
    }
}

/// Inclusive calendar bounds of a query. Either side may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateBounds {
    pub start: Option<Date>,
    pub end: Option<Date>,
}

impl DateBounds {
    /// `start` at UTC midnight.
    pub fn from_instant(&self) -> Option<OffsetDateTime> {
        self.start.map(|d| d.midnight().assume_utc())
    }

    /// `end` at UTC 23:59:59.999.
    pub fn to_instant(&self) -> Option<OffsetDateTime> {
        self.end
            .map(|d| PrimitiveDateTime::new(d, time!(23:59:59.999)).assume_utc())
    }
}

/// A normalized, immutable query.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub indicator: &'static Indicator,
    pub predicates: BTreeMap<String, Constraint>,
    pub split: Option<String>,
    /// Granularity the caller asked for; `None` when unspecified.
    pub period_type: Option<Granularity>,
    pub date_range: DateBounds,
    pub empty_fields: BTreeSet<String>,
}

fn check_field(field: &str) -> Result<(), ValidationError> {
    if !field.is_empty() && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(ValidationError::InvalidField(field.to_string()))
    }
}

fn parse_bound(field: &'static str, value: Option<&str>) -> Result<Option<Date>, ValidationError> {
    value
        .map(|v| {
            parse_iso_date(v).map_err(|_| ValidationError::InvalidDate {
                field,
                value: v.to_string(),
            })
        })
        .transpose()
}

/// Remove repeated locations, keeping first occurrences.
fn dedup_locations(value: FilterValue) -> FilterValue {
    match value {
        FilterValue::Many(values) => {
            let mut seen = BTreeSet::new();
            FilterValue::Many(
                values
                    .into_iter()
                    .filter(|v| seen.insert(v.clone()))
                    .collect(),
            )
        }
        one => one,
    }
}

impl QuerySpec {
    /// Build a spec for an indicator from request parameters.
    pub fn build(
        indicator: &'static Indicator,
        params: &FilterParams,
    ) -> Result<Self, ValidationError> {
        let mut predicates = BTreeMap::new();

        if let Some(value) = &params.subcategory {
            predicates.insert("subcategory".to_string(), value.clone().into_constraint());
        }
        if let Some(value) = &params.total_type {
            predicates.insert("total_type".to_string(), value.clone().into_constraint());
        }
        if let Some(value) = &params.location {
            if matches!(value, FilterValue::Many(v) if v.is_empty()) {
                return Err(ValidationError::EmptyLocations);
            }
            predicates.insert(
                "location".to_string(),
                dedup_locations(value.clone()).into_constraint(),
            );
        }
        for (field, value) in &params.extra {
            check_field(field)?;
            if !indicator.accepts_filter(field) {
                return Err(ValidationError::UnknownFilter {
                    indicator: indicator.name.to_string(),
                    field: field.clone(),
                });
            }
            predicates.insert(field.clone(), value.clone().into_constraint());
        }

        let split = params.split.as_deref().filter(|s| !s.is_empty());
        if let Some(field) = split {
            check_field(field)?;
            if !indicator.accepts_split(field) {
                return Err(ValidationError::UnknownSplit {
                    indicator: indicator.name.to_string(),
                    field: field.to_string(),
                });
            }
        }

        let default_filtered = indicator
            .default_split
            .is_some_and(|d| predicates.contains_key(d));
        match split {
            None if !default_filtered => {
                predicates.insert("is_date_total".to_string(), Constraint::Eq(true.into()));
            }
            Some(field) if indicator.default_split != Some(field) => {
                predicates
                    .entry(field.to_string())
                    .or_insert(Constraint::Exists);
            }
            _ => {
                predicates.insert("is_date_total".to_string(), Constraint::Eq(false.into()));
            }
        }

        let start = parse_bound("start_date", params.start_date.as_deref())?;
        let end = parse_bound("end_date", params.end_date.as_deref())?;
        if let (Some(s), Some(e)) = (start, end)
            && s > e
        {
            return Err(ValidationError::InvertedRange {
                start: episeries_types::iso_date(s),
                end: episeries_types::iso_date(e),
            });
        }

        let period_type = params
            .period_type
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| {
                p.parse::<Granularity>()
                    .map_err(|_| ValidationError::InvalidPeriodType(p.to_string()))
            })
            .transpose()?;

        let mut empty_fields = BTreeSet::new();
        for field in &params.empty_fields {
            check_field(field)?;
            empty_fields.insert(field.clone());
        }

        Ok(Self {
            indicator,
            predicates,
            split: split.map(str::to_string),
            period_type,
            date_range: DateBounds { start, end },
            empty_fields,
        })
    }

    /// Granularity of the first retrieval attempt.
    pub fn granularity(&self) -> Granularity {
        self.period_type.unwrap_or_default()
    }

    /// Granularity of the second attempt when the first comes back empty.
    ///
    /// Explicit Weekly falls back to Daily and an unspecified period type
    /// falls back to Weekly. Explicit Daily never falls back.
    pub fn fallback_granularity(&self) -> Option<Granularity> {
        match self.period_type {
            Some(Granularity::Daily) => None,
            requested => Some(requested.unwrap_or_default().alternate()),
        }
    }

    /// Storage filter, constrained to a period type when one is given.
    pub fn filter(&self, granularity: Option<Granularity>) -> Filter {
        let mut filter = Filter {
            predicates: self.predicates.clone(),
            date_from: self.date_range.from_instant(),
            date_to: self.date_range.to_instant(),
        };
        for field in &self.empty_fields {
            filter
                .predicates
                .insert(field.clone(), Constraint::NotExists);
        }
        if let Some(g) = granularity {
            filter = filter.eq("period_type", g.as_str());
        }
        filter
    }

    /// Row projection for this query.
    pub fn shape(&self) -> RowShape {
        self.indicator.shape(self.split.as_deref())
    }

    /// Locations named by the location predicate, in request order.
    pub fn locations(&self) -> Vec<String> {
        let scalars = match self.predicates.get("location") {
            Some(Constraint::Eq(value)) => std::slice::from_ref(value),
            Some(Constraint::In(values)) => values.as_slice(),
            _ => &[],
        };
        scalars
            .iter()
            .filter_map(|s| match s {
                Scalar::Text(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }
}
