//! Weekday anchoring for weekly series.
//!
//! Weekly records are not reported on a fixed weekday: one source reports
//! on Tuesdays, another on Thursdays. The anchor weekday is elected by
//! majority over the dates that actually carry data, and every calendar
//! date maps to the occurrence of that weekday in its Monday-based week.

use time::{Date, Duration, Weekday};

/// Weekday for an index counted from Monday.
fn weekday_from_index(index: usize) -> Weekday {
    let mut day = Weekday::Monday;
    for _ in 0..index {
        day = day.next();
    }
    day
}

/// Elect the anchor weekday over the given data dates.
///
/// The weekday with the strictly greatest count wins; ties go to the
/// lowest index (Monday first). Returns `None` when there are no dates.
pub fn anchor_weekday(dates: impl IntoIterator<Item = Date>) -> Option<Weekday> {
    let mut counts = [0usize; 7];
    for date in dates {
        counts[usize::from(date.weekday().number_days_from_monday())] += 1;
    }

    let mut best: Option<(usize, usize)> = None;
    for (index, &count) in counts.iter().enumerate() {
        if count > best.map_or(0, |(_, c)| c) {
            best = Some((index, count));
        }
    }
    best.map(|(index, _)| weekday_from_index(index))
}

/// The anchor weekday in the same Monday-based week as `date`.
pub fn week_key(date: Date, anchor: Weekday) -> Date {
    let offset = i64::from(anchor.number_days_from_monday())
        - i64::from(date.weekday().number_days_from_monday());
    date + Duration::days(offset)
}
