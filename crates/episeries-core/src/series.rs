//! Gap-free series reconstruction.
//!
//! Storage returns sparse rows: only the dates that have records. The
//! reconstructor walks every calendar date of the resolved range and asks an
//! entry builder for each one, so the output has exactly one entry per date
//! (daily) or per anchored week (weekly).
//!
//! The entry builder is the only per-indicator piece. It receives the date
//! key and the full [`DateBucketMap`] and returns a zero entry when the key
//! is absent.

use std::collections::{BTreeMap, BTreeSet};

use time::Date;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use episeries_types::{DailyEntry, Granularity, LocationDay, RawRow, iso_date};

use crate::error::{Error, Result};
use crate::query::DateBounds;
use crate::weekly::{anchor_weekday, week_key};

/// Rows grouped by ISO date string.
pub type DateBucketMap = BTreeMap<String, Vec<RawRow>>;

/// Group rows by their calendar date.
pub fn bucket_by_date(rows: Vec<RawRow>) -> DateBucketMap {
    let mut map = DateBucketMap::new();
    for row in rows {
        map.entry(iso_date(row.date)).or_default().push(row);
    }
    map
}

/// Output of an entry builder: the entry plus the split values it saw.
#[derive(Debug, Clone, PartialEq)]
pub struct Built<E> {
    pub entry: E,
    pub split_values: BTreeSet<String>,
}

impl<E> Built<E> {
    /// An entry that saw no split values.
    pub fn plain(entry: E) -> Self {
        Self {
            entry,
            split_values: BTreeSet::new(),
        }
    }
}

/// Entries keyed by a date string.
pub trait Dated {
    /// Replace the date key (weekly series report the week key).
    fn relabel(self, key: &str) -> Self;
}

impl Dated for DailyEntry {
    fn relabel(mut self, key: &str) -> Self {
        self.date = key.to_string();
        self
    }
}

impl Dated for LocationDay {
    fn relabel(mut self, key: &str) -> Self {
        self.date = key.to_string();
        self
    }
}

/// A reconstructed series and every split value its entries saw.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconstruction<E> {
    pub entries: Vec<E>,
    pub split_values: BTreeSet<String>,
}

impl<E> Default for Reconstruction<E> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            split_values: BTreeSet::new(),
        }
    }
}

/// Output range: explicit bounds win, otherwise the first and last row.
///
/// Rows must be sorted ascending by date. Returns `None` without rows.
pub fn resolve_range(rows: &[RawRow], bounds: &DateBounds) -> Option<(Date, Date)> {
    let first = rows.first()?.date;
    let last = rows.last().map_or(first, |r| r.date);
    Some((bounds.start.unwrap_or(first), bounds.end.unwrap_or(last)))
}

/// Every calendar date in `[start, end]`.
pub(crate) fn days(start: Date, end: Date) -> impl Iterator<Item = Date> {
    std::iter::successors(Some(start), |d| d.next_day()).take_while(move |d| *d <= end)
}

/// Number of calendar days in `[start, end]`.
pub fn range_days(start: Date, end: Date) -> i64 {
    (end - start).whole_days() + 1
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

/// Build a gap-free series.
///
/// `range` is the resolved output range (see [`resolve_range`]). Missing
/// dates are zero-filled by the builder; builder failures propagate.
pub fn reconstruct<E, B>(
    buckets: &DateBucketMap,
    granularity: Granularity,
    range: (Date, Date),
    builder: B,
    cancel: &CancellationToken,
) -> Result<Reconstruction<E>>
where
    E: Dated,
    B: Fn(&str, &DateBucketMap) -> Result<Built<E>>,
{
    match granularity {
        Granularity::Daily => reconstruct_daily(buckets, range, builder, cancel),
        Granularity::Weekly => reconstruct_weekly(buckets, range, builder, cancel),
    }
}

fn reconstruct_daily<E, B>(
    buckets: &DateBucketMap,
    (start, end): (Date, Date),
    builder: B,
    cancel: &CancellationToken,
) -> Result<Reconstruction<E>>
where
    B: Fn(&str, &DateBucketMap) -> Result<Built<E>>,
{
    let mut out = Reconstruction::default();
    for date in days(start, end) {
        check_cancelled(cancel)?;
        let built = builder(&iso_date(date), buckets)?;
        out.split_values.extend(built.split_values);
        out.entries.push(built.entry);
    }
    Ok(out)
}

fn reconstruct_weekly<E, B>(
    buckets: &DateBucketMap,
    (start, end): (Date, Date),
    builder: B,
    cancel: &CancellationToken,
) -> Result<Reconstruction<E>>
where
    E: Dated,
    B: Fn(&str, &DateBucketMap) -> Result<Built<E>>,
{
    let data_dates = buckets.values().filter_map(|rows| rows.first()).map(|r| r.date);
    let Some(anchor) = anchor_weekday(data_dates) else {
        return Ok(Reconstruction::default());
    };
    debug!("Weekly reconstruction anchored on {}", anchor);

    // Week key -> representative entry (first data-bearing date of the week)
    let mut weeks: BTreeMap<Date, Option<Built<E>>> = BTreeMap::new();

    for date in days(start, end) {
        check_cancelled(cancel)?;
        let key = week_key(date, anchor);
        if key < start || key > end {
            continue;
        }
        let slot = weeks.entry(key).or_default();
        let date_key = iso_date(date);
        if slot.is_none() && buckets.contains_key(&date_key) {
            let built = builder(&date_key, buckets)?;
            *slot = Some(Built {
                entry: built.entry.relabel(&iso_date(key)),
                split_values: built.split_values,
            });
        }
    }

    let mut out = Reconstruction::default();
    for (key, slot) in weeks {
        let built = match slot {
            Some(built) => built,
            None => builder(&iso_date(key), buckets)?,
        };
        out.split_values.extend(built.split_values);
        out.entries.push(built.entry);
    }
    Ok(out)
}
