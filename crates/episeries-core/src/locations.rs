//! Location fan-out entry builder.
//!
//! Each date (or week) of a location series carries exactly one
//! [`LocationEntry`] per requested location. Locations with rows come first,
//! in the order their rows appear; requested locations without rows follow
//! as zero entries. Rows for locations that were not requested are ignored.

use std::collections::BTreeSet;

use episeries_types::{Aggregation, LocationDay, LocationEntry, RawRow};

use crate::entries::SplitAccumulator;
use crate::error::Result;
use crate::series::{Built, DateBucketMap};

/// Builder for [`LocationDay`] series.
///
/// With `split` set, every present location lists every split value seen on
/// that date, zero-filled where the location has none. Absent locations
/// always carry `total = 0` and no split.
pub fn location_entry_builder(
    locations: Vec<String>,
    aggregation: Aggregation,
    split: bool,
) -> impl Fn(&str, &DateBucketMap) -> Result<Built<LocationDay>> {
    move |key, buckets| {
        let rows = buckets.get(key).map(Vec::as_slice).unwrap_or_default();

        // Present locations in first-appearance order
        let mut present: Vec<(&str, Vec<&RawRow>)> = Vec::new();
        for row in rows {
            let Some(code) = row.location.as_deref() else {
                continue;
            };
            if !locations.iter().any(|l| l == code) {
                continue;
            }
            match present.iter_mut().find(|(c, _)| *c == code) {
                Some((_, group)) => group.push(row),
                None => present.push((code, vec![row])),
            }
        }

        let mut accumulators = Vec::with_capacity(present.len());
        let mut split_values = BTreeSet::new();
        for (code, group) in &present {
            let mut acc = SplitAccumulator::new(aggregation);
            for row in group {
                acc.add(key, row)?;
            }
            split_values.extend(acc.split_values().cloned());
            accumulators.push((*code, acc));
        }

        let mut entries = Vec::with_capacity(locations.len());
        for (code, mut acc) in accumulators {
            if split {
                for value in &split_values {
                    acc.zero_fill(value);
                }
            }
            let (total, totals) = acc.finish();
            entries.push(LocationEntry {
                code: code.to_string(),
                total,
                split: totals,
            });
        }
        for code in &locations {
            if !present.iter().any(|(c, _)| *c == code.as_str()) {
                entries.push(LocationEntry::zero(code));
            }
        }

        Ok(Built {
            entry: LocationDay {
                date: key.to_string(),
                locations: entries,
            },
            split_values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::bucket_by_date;
    use episeries_types::SplitTotal;
    use time::macros::date;

    fn codes(day: &LocationDay) -> Vec<&str> {
        day.locations.iter().map(|l| l.code.as_str()).collect()
    }

    fn locs(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_absent_location_zero_filled() {
        let buckets = bucket_by_date(vec![RawRow::new(date!(2024 - 01 - 01), 5.0).at("A")]);
        let builder = location_entry_builder(locs(&["A", "B"]), Aggregation::Sum, false);
        let day = builder("2024-01-01", &buckets).unwrap().entry;

        assert_eq!(day.date, "2024-01-01");
        assert_eq!(codes(&day), vec!["A", "B"]);
        assert_eq!(day.locations[0].total, 5.0);
        assert_eq!(day.locations[1], LocationEntry::zero("B"));
    }

    #[test]
    fn test_present_locations_first_in_row_order() {
        let buckets = bucket_by_date(vec![
            RawRow::new(date!(2024 - 01 - 01), 1.0).at("C"),
            RawRow::new(date!(2024 - 01 - 01), 2.0).at("A"),
            RawRow::new(date!(2024 - 01 - 01), 3.0).at("C"),
        ]);
        let builder = location_entry_builder(locs(&["A", "B", "C"]), Aggregation::Sum, false);
        let day = builder("2024-01-01", &buckets).unwrap().entry;

        assert_eq!(codes(&day), vec!["C", "A", "B"]);
        assert_eq!(day.locations[0].total, 4.0);
    }

    #[test]
    fn test_unrequested_location_dropped() {
        let buckets = bucket_by_date(vec![
            RawRow::new(date!(2024 - 01 - 01), 1.0).at("Z"),
            RawRow::new(date!(2024 - 01 - 01), 2.0),
        ]);
        let builder = location_entry_builder(locs(&["A"]), Aggregation::Sum, false);
        let day = builder("2024-01-01", &buckets).unwrap().entry;
        assert_eq!(codes(&day), vec!["A"]);
        assert_eq!(day.locations[0].total, 0.0);
    }

    #[test]
    fn test_missing_date_all_zero() {
        let builder = location_entry_builder(locs(&["A", "B"]), Aggregation::Sum, true);
        let day = builder("2024-01-02", &DateBucketMap::new()).unwrap().entry;
        assert_eq!(
            day.locations,
            vec![LocationEntry::zero("A"), LocationEntry::zero("B")]
        );
    }

    #[test]
    fn test_split_zero_fills_pairs() {
        let buckets = bucket_by_date(vec![
            RawRow::new(date!(2024 - 01 - 01), 3.0).at("A").with_split("female"),
            RawRow::new(date!(2024 - 01 - 01), 2.0).at("A").with_split("male"),
            RawRow::new(date!(2024 - 01 - 01), 6.0).at("B").with_split("female"),
        ]);
        let builder = location_entry_builder(locs(&["A", "B", "C"]), Aggregation::Sum, true);
        let built = builder("2024-01-01", &buckets).unwrap();
        let day = built.entry;

        assert_eq!(day.locations[0].total, 5.0);
        assert_eq!(day.locations[1].total, 6.0);
        assert_eq!(
            day.locations[1].split,
            vec![
                SplitTotal {
                    total: 6.0,
                    split_value: "female".to_string()
                },
                SplitTotal {
                    total: 0.0,
                    split_value: "male".to_string()
                },
            ]
        );
        assert_eq!(day.locations[2], LocationEntry::zero("C"));
        assert_eq!(built.split_values.len(), 2);
    }
}
