//! The series engine facade.
//!
//! [`SeriesService`] answers the three query kinds the HTTP layer exposes:
//! a plain series, a per-location series and the stored date interval.
//! Every storage call goes through a [`CallGuard`] so that the caller's
//! cancellation and the configured timeout apply to it.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use episeries_store::Storage;
use episeries_types::{
    Constraint, DailyEntry, DateInterval, Filter, Granularity, LocationDay, Scalar, SortOrder,
    iso_date,
};

use crate::entries::daily_entry_builder;
use crate::error::{Result, ValidationError};
use crate::fallback::{Fetched, fetch_with_fallback};
use crate::guard::CallGuard;
use crate::locations::location_entry_builder;
use crate::metadata::{Metadata, assemble_metadata};
use crate::query::QuerySpec;
use crate::series::{
    Built, DateBucketMap, Dated, bucket_by_date, range_days, reconstruct, resolve_range,
};

/// Engine limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Upper bound for each storage call.
    pub query_timeout: Duration,
    /// Longest resolved range a series may span, in days.
    pub max_range_days: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            query_timeout: Duration::from_secs(30),
            max_range_days: 3660,
        }
    }
}

/// A gap-filled series with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesResponse<E> {
    pub data: Vec<E>,
    pub metadata: Metadata,
}

/// Series engine over a storage collaborator.
pub struct SeriesService<S: ?Sized> {
    storage: Arc<S>,
    options: EngineOptions,
}

impl<S: ?Sized> Clone for SeriesService<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            options: self.options.clone(),
        }
    }
}

impl<S: Storage + ?Sized> SeriesService<S> {
    pub fn new(storage: Arc<S>, options: EngineOptions) -> Self {
        Self { storage, options }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn guard(&self, cancel: &CancellationToken) -> CallGuard {
        CallGuard::new(cancel.clone(), self.options.query_timeout)
    }

    /// Gap-filled series of grouped totals.
    pub async fn get_series(
        &self,
        spec: &QuerySpec,
        cancel: &CancellationToken,
    ) -> Result<SeriesResponse<DailyEntry>> {
        let guard = self.guard(cancel);
        let storage = self.storage.as_ref();
        let collection = spec.indicator.collection;
        let shape = spec.shape();

        let filter_at = |granularity: Granularity| spec.filter(Some(granularity));

        let fetched = fetch_with_fallback(spec, |granularity| {
            let filter = filter_at(granularity);
            let guard = &guard;
            let shape = &shape;
            async move {
                guard
                    .run(
                        "aggregate_by_date",
                        storage.aggregate_by_date(collection, &filter, shape),
                    )
                    .await
            }
        })
        .await?;

        let builder = daily_entry_builder(spec.indicator.aggregation);
        self.respond(spec, &guard, fetched, filter_at, builder).await
    }

    /// Gap-filled series with one entry per requested location per date.
    pub async fn get_location_series(
        &self,
        spec: &QuerySpec,
        locations: &[String],
        cancel: &CancellationToken,
    ) -> Result<SeriesResponse<LocationDay>> {
        let mut requested: Vec<String> = Vec::with_capacity(locations.len());
        for code in locations {
            if !requested.contains(code) {
                requested.push(code.clone());
            }
        }
        if requested.is_empty() {
            return Err(ValidationError::EmptyLocations.into());
        }

        let guard = self.guard(cancel);
        let storage = self.storage.as_ref();
        let collection = spec.indicator.collection;
        let shape = spec.shape();
        let location_constraint = Constraint::In(
            requested
                .iter()
                .map(|code| Scalar::Text(code.clone()))
                .collect(),
        );

        let filter_at = |granularity: Granularity| {
            spec.filter(Some(granularity))
                .with("location", location_constraint.clone())
        };

        let fetched = fetch_with_fallback(spec, |granularity| {
            let filter = filter_at(granularity);
            let guard = &guard;
            let shape = &shape;
            async move {
                guard
                    .run("find_raw", storage.find_raw(collection, &filter, shape))
                    .await
            }
        })
        .await?;

        let builder = location_entry_builder(
            requested,
            spec.indicator.aggregation,
            spec.split.is_some(),
        );
        self.respond(spec, &guard, fetched, filter_at, builder).await
    }

    /// First and last stored date matching the query.
    ///
    /// Constrained to a period type only when the caller named one.
    pub async fn get_date_interval(
        &self,
        spec: &QuerySpec,
        cancel: &CancellationToken,
    ) -> Result<DateInterval> {
        let guard = self.guard(cancel);
        let storage = self.storage.as_ref();
        let collection = spec.indicator.collection;
        let filter = spec.filter(spec.period_type);
        let shape = spec.shape();

        let (first, last) = tokio::try_join!(
            guard.run(
                "find_one",
                storage.find_one(collection, &filter, &shape, SortOrder::Ascending)
            ),
            guard.run(
                "find_one",
                storage.find_one(collection, &filter, &shape, SortOrder::Descending)
            ),
        )?;

        Ok(DateInterval {
            start_date: first.map(|r| iso_date(r.date)),
            end_date: last.map(|r| iso_date(r.date)),
        })
    }

    /// Reconstruct fetched rows and attach metadata.
    ///
    /// `filter_at` rebuilds the fetch filter, so metadata describes the
    /// same records the series was built from.
    async fn respond<E, F, B>(
        &self,
        spec: &QuerySpec,
        guard: &CallGuard,
        fetched: Fetched,
        filter_at: F,
        builder: B,
    ) -> Result<SeriesResponse<E>>
    where
        E: Dated,
        F: Fn(Granularity) -> Filter,
        B: Fn(&str, &DateBucketMap) -> Result<Built<E>>,
    {
        let Fetched {
            rows, granularity, ..
        } = fetched;

        let Some((start, end)) = resolve_range(&rows, &spec.date_range) else {
            debug!("{}: empty series", spec.indicator.name);
            return Ok(SeriesResponse {
                data: Vec::new(),
                metadata: Metadata::bare(granularity),
            });
        };

        let days = range_days(start, end);
        if days > i64::from(self.options.max_range_days) {
            return Err(ValidationError::RangeTooLong {
                days,
                max: self.options.max_range_days,
            }
            .into());
        }

        let buckets = bucket_by_date(rows);
        let series = reconstruct(&buckets, granularity, (start, end), builder, guard.token())?;
        info!(
            "{}: {} {} entries from {} to {}",
            spec.indicator.name,
            series.entries.len(),
            granularity,
            iso_date(start),
            iso_date(end)
        );

        let metadata = assemble_metadata(
            self.storage.as_ref(),
            guard,
            spec,
            &filter_at(granularity),
            granularity,
            &series.split_values,
        )
        .await?;

        Ok(SeriesResponse {
            data: series.entries,
            metadata,
        })
    }
}
