//! Granularity-fallback retrieval.
//!
//! Some indicators are only published weekly upstream, others only daily.
//! When the requested granularity yields no rows, one more attempt is made
//! at the alternate granularity:
//!
//! | Requested | First attempt | Second attempt |
//! |-----------|---------------|----------------|
//! | unspecified | Daily | Weekly |
//! | Weekly | Weekly | Daily |
//! | Daily | Daily | none |
//!
//! Only a successful, empty result moves to the second attempt. Errors are
//! returned as-is.

use std::future::Future;

use tracing::debug;

use episeries_types::{Granularity, RawRow};

use crate::error::Result;
use crate::query::QuerySpec;

/// Retrieval state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    /// Fetching at the requested (or default) granularity.
    Requested,
    /// Fetching at the fallback granularity.
    Alternate,
    /// No further attempts.
    Done,
}

/// Rows and the granularity they were fetched at.
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub rows: Vec<RawRow>,
    pub granularity: Granularity,
    /// Number of fetches made (1 or 2).
    pub attempts: u8,
}

impl Fetched {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Fetch rows, falling back to the alternate granularity on an empty result.
///
/// `fetch` is called with the granularity to constrain `period_type` to.
pub async fn fetch_with_fallback<F, Fut>(spec: &QuerySpec, mut fetch: F) -> Result<Fetched>
where
    F: FnMut(Granularity) -> Fut,
    Fut: Future<Output = Result<Vec<RawRow>>>,
{
    let mut state = Attempt::Requested;
    let mut granularity = spec.granularity();
    let mut attempts = 0;

    loop {
        match state {
            Attempt::Requested | Attempt::Alternate => {
                attempts += 1;
                let rows = fetch(granularity).await?;
                if !rows.is_empty() {
                    debug!(
                        "{}: {} rows at {} after {} attempt(s)",
                        spec.indicator.name,
                        rows.len(),
                        granularity,
                        attempts
                    );
                    return Ok(Fetched {
                        rows,
                        granularity,
                        attempts,
                    });
                }

                state = match (state, spec.fallback_granularity()) {
                    (Attempt::Requested, Some(alternate)) => {
                        debug!(
                            "{}: no rows at {}, retrying at {}",
                            spec.indicator.name, granularity, alternate
                        );
                        granularity = alternate;
                        Attempt::Alternate
                    }
                    _ => Attempt::Done,
                };
            }
            Attempt::Done => {
                debug!("{}: no rows at any granularity", spec.indicator.name);
                return Ok(Fetched {
                    rows: Vec::new(),
                    granularity,
                    attempts,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use time::macros::date;

    use crate::error::Error;
    use crate::indicators::Indicator;
    use crate::query::FilterParams;

    fn spec(period_type: Option<&str>) -> QuerySpec {
        let mut params = FilterParams::new();
        if let Some(p) = period_type {
            params = params.period_type(p);
        }
        QuerySpec::build(Indicator::by_name("cases").unwrap(), &params).unwrap()
    }

    fn row() -> Vec<RawRow> {
        vec![RawRow::new(date!(2024 - 01 - 01), 1.0)]
    }

    /// Runs the retriever with rows available only at `available`, recording calls.
    async fn run(spec: &QuerySpec, available: Option<Granularity>) -> (Fetched, Vec<Granularity>) {
        let calls = Mutex::new(Vec::new());
        let fetched = fetch_with_fallback(spec, |g| {
            calls.lock().unwrap().push(g);
            async move { Ok(if Some(g) == available { row() } else { Vec::new() }) }
        })
        .await
        .unwrap();
        (fetched, calls.into_inner().unwrap())
    }

    #[tokio::test]
    async fn test_requested_non_empty_single_fetch() {
        let (fetched, calls) = run(&spec(None), Some(Granularity::Daily)).await;
        assert_eq!(fetched.granularity, Granularity::Daily);
        assert_eq!(fetched.attempts, 1);
        assert_eq!(calls, vec![Granularity::Daily]);
    }

    #[tokio::test]
    async fn test_unspecified_falls_back_to_weekly() {
        let (fetched, calls) = run(&spec(None), Some(Granularity::Weekly)).await;
        assert_eq!(fetched.granularity, Granularity::Weekly);
        assert_eq!(fetched.rows.len(), 1);
        assert_eq!(calls, vec![Granularity::Daily, Granularity::Weekly]);
    }

    #[tokio::test]
    async fn test_weekly_falls_back_to_daily() {
        let (fetched, calls) = run(&spec(Some("Weekly")), Some(Granularity::Daily)).await;
        assert_eq!(fetched.granularity, Granularity::Daily);
        assert_eq!(calls, vec![Granularity::Weekly, Granularity::Daily]);
    }

    #[tokio::test]
    async fn test_explicit_daily_never_falls_back() {
        let (fetched, calls) = run(&spec(Some("Daily")), Some(Granularity::Weekly)).await;
        assert!(fetched.is_empty());
        assert_eq!(fetched.attempts, 1);
        assert_eq!(calls, vec![Granularity::Daily]);
    }

    #[tokio::test]
    async fn test_both_empty_stops_after_two() {
        let (fetched, calls) = run(&spec(None), None).await;
        assert!(fetched.is_empty());
        assert_eq!(fetched.attempts, 2);
        assert_eq!(calls.len(), 2);
    }

    #[tokio::test]
    async fn test_error_does_not_fall_back() {
        let calls = Mutex::new(0);
        let result = fetch_with_fallback(&spec(None), |_| {
            *calls.lock().unwrap() += 1;
            async { Err(Error::Cancelled) }
        })
        .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls.into_inner().unwrap(), 1);
    }
}
