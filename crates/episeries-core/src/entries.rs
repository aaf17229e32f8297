//! Entry builders for plain (non-location) series.

use std::collections::{BTreeMap, BTreeSet};

use tracing::error;

use episeries_types::{Aggregation, DailyEntry, RawRow, SplitTotal};

use crate::error::{Error, Result};
use crate::series::{Built, DateBucketMap};

/// Per-date accumulation of row values, by split value.
#[derive(Debug)]
pub(crate) struct SplitAccumulator {
    aggregation: Aggregation,
    splits: BTreeMap<String, f64>,
    unsplit: Option<f64>,
}

impl SplitAccumulator {
    pub(crate) fn new(aggregation: Aggregation) -> Self {
        Self {
            aggregation,
            splits: BTreeMap::new(),
            unsplit: None,
        }
    }

    /// Fold one row in. Rows without a value cannot be accumulated.
    pub(crate) fn add(&mut self, key: &str, row: &RawRow) -> Result<()> {
        let Some(value) = row.total else {
            error!("Row without a value for {}: {:?}", key, row);
            return Err(Error::reconstruction(key, "stored record has no value"));
        };
        match &row.split_value {
            Some(split) => {
                let acc = self.splits.get(split).copied();
                self.splits
                    .insert(split.clone(), self.aggregation.combine(acc, value));
            }
            None => self.unsplit = Some(self.aggregation.combine(self.unsplit, value)),
        }
        Ok(())
    }

    /// Split values seen so far.
    pub(crate) fn split_values(&self) -> impl Iterator<Item = &String> {
        self.splits.keys()
    }

    /// Ensure a split value is present, with zero if unseen.
    pub(crate) fn zero_fill(&mut self, split: &str) {
        self.splits.entry(split.to_string()).or_insert(0.0);
    }

    /// Date total and per-split totals, ordered by split value.
    pub(crate) fn finish(self) -> (f64, Vec<SplitTotal>) {
        let total = self.splits.values().sum::<f64>() + self.unsplit.unwrap_or(0.0);
        let split = self
            .splits
            .into_iter()
            .map(|(split_value, total)| SplitTotal { total, split_value })
            .collect();
        (total, split)
    }
}

/// Builder for [`DailyEntry`] series.
///
/// A date without rows yields [`DailyEntry::zero`].
pub fn daily_entry_builder(
    aggregation: Aggregation,
) -> impl Fn(&str, &DateBucketMap) -> Result<Built<DailyEntry>> {
    move |key, buckets| {
        let Some(rows) = buckets.get(key) else {
            return Ok(Built::plain(DailyEntry::zero(key)));
        };

        let mut acc = SplitAccumulator::new(aggregation);
        for row in rows {
            acc.add(key, row)?;
        }
        let split_values: BTreeSet<String> = acc.split_values().cloned().collect();
        let (total, split) = acc.finish();

        Ok(Built {
            entry: DailyEntry {
                date: key.to_string(),
                total,
                split,
            },
            split_values,
        })
    }
}
