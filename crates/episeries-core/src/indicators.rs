//! The indicator catalogue.
//!
//! Every indicator is stored as one denormalized roll-up record per date
//! (`is_date_total = true`) plus one detail record per value of its default
//! split field. Which field plays that role differs per indicator, so it is
//! declared here once instead of being re-derived by each query.

use serde::Serialize;

use episeries_types::{Aggregation, RowShape};

/// Declaration of one queryable indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Indicator {
    /// Public name used in routes.
    pub name: &'static str,
    /// Storage collection holding the records.
    pub collection: &'static str,
    /// Numeric field summed (or maxed) into totals.
    pub value_field: &'static str,
    /// The field the per-date roll-up record is split by, if any.
    pub default_split: Option<&'static str>,
    /// Fields accepted as a split dimension.
    pub splits: &'static [&'static str],
    /// Indicator-specific filters accepted besides the common ones.
    pub extra_filters: &'static [&'static str],
    /// Split field whose values are reference-entity ids.
    pub reference_split: Option<&'static str>,
    /// How values for the same date combine.
    pub aggregation: Aggregation,
}

/// Every indicator the engine serves.
pub const INDICATORS: &[Indicator] = &[
    Indicator {
        name: "cases",
        collection: "cases",
        value_field: "value",
        default_split: Some("subcategory"),
        splits: &["subcategory", "gender", "age_group"],
        extra_filters: &["gender", "age_group"],
        reference_split: None,
        aggregation: Aggregation::Sum,
    },
    Indicator {
        name: "deaths",
        collection: "deaths",
        value_field: "value",
        default_split: Some("subcategory"),
        splits: &["subcategory", "gender", "age_group"],
        extra_filters: &["gender", "age_group"],
        reference_split: None,
        aggregation: Aggregation::Sum,
    },
    Indicator {
        name: "tests",
        collection: "tests",
        value_field: "value",
        default_split: Some("test_type"),
        splits: &["test_type", "result"],
        extra_filters: &["test_type", "result"],
        reference_split: None,
        aggregation: Aggregation::Sum,
    },
    Indicator {
        name: "vaccinations",
        collection: "vaccinations",
        value_field: "doses",
        default_split: Some("dose_type"),
        splits: &["dose_type", "vaccine", "age_group"],
        extra_filters: &["dose_type", "vaccine"],
        reference_split: None,
        aggregation: Aggregation::Sum,
    },
    Indicator {
        name: "hospital_admissions",
        collection: "hospital_admissions",
        value_field: "value",
        default_split: Some("admission_type"),
        splits: &["admission_type", "age_group"],
        extra_filters: &["admission_type"],
        reference_split: None,
        aggregation: Aggregation::Sum,
    },
    Indicator {
        name: "icu_beds",
        collection: "icu_beds",
        value_field: "occupied",
        default_split: Some("bed_type"),
        splits: &["bed_type"],
        extra_filters: &["bed_type"],
        reference_split: None,
        aggregation: Aggregation::Max,
    },
    Indicator {
        name: "variants",
        collection: "variants",
        value_field: "value",
        default_split: Some("variant_id"),
        splits: &["variant_id"],
        extra_filters: &[],
        reference_split: Some("variant_id"),
        aggregation: Aggregation::Sum,
    },
];

impl Indicator {
    /// Look up an indicator by its public name.
    pub fn by_name(name: &str) -> Option<&'static Indicator> {
        INDICATORS.iter().find(|i| i.name == name)
    }

    /// Whether `field` may be used as a split dimension.
    pub fn accepts_split(&self, field: &str) -> bool {
        self.splits.contains(&field)
    }

    /// Whether `field` may be used as an extra filter.
    pub fn accepts_filter(&self, field: &str) -> bool {
        self.extra_filters.contains(&field) || self.default_split == Some(field)
    }

    /// Row projection for this indicator with an optional split field.
    pub fn shape(&self, split: Option<&str>) -> RowShape {
        RowShape::new(self.value_field, self.aggregation).split_by(split)
    }
}
