//! Mock storage implementation for testing.
//!
//! [`MockStorage`] implements the [`Storage`] trait with scripted rows per
//! granularity, so engine behaviour (fallback, gap-filling, metadata) can be
//! tested without a database.
//!
//! # Features
//!
//! - **Scripted rows**: separate grouped and raw rows for Daily and Weekly
//! - **Call log**: every storage call is recorded with the granularity it asked for
//! - **Failure injection**: fail every call, or only the metadata lookups
//! - **Latency simulation**: delay every call to exercise timeouts and cancellation

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use episeries_store::{Error as StoreError, Result as StoreResult, Storage};
use episeries_types::{
    Constraint, Filter, Granularity, RawRow, ReferenceEntity, RowShape, Scalar, SortOrder,
};

/// One recorded storage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: &'static str,
    /// The `period_type` the call was constrained to, if any.
    pub granularity: Option<Granularity>,
}

/// A scripted [`Storage`] for tests.
///
/// # Example
///
/// ```
/// use episeries_core::{MockStorageBuilder, Storage};
/// use episeries_types::{Aggregation, Filter, Granularity, RawRow, RowShape};
/// use time::macros::date;
///
/// #[tokio::main]
/// async fn main() {
///     let storage = MockStorageBuilder::new()
///         .aggregate(Granularity::Weekly, vec![RawRow::new(date!(2024 - 01 - 02), 4.0)])
///         .build();
///
///     let filter = Filter::new().eq("period_type", "Weekly");
///     let shape = RowShape::new("value", Aggregation::Sum);
///     let rows = storage.aggregate_by_date("cases", &filter, &shape).await.unwrap();
///     assert_eq!(rows.len(), 1);
///     assert_eq!(storage.call_count("aggregate_by_date"), 1);
/// }
/// ```
pub struct MockStorage {
    aggregate: RwLock<HashMap<Granularity, Vec<RawRow>>>,
    raw: RwLock<HashMap<Granularity, Vec<RawRow>>>,
    sources: RwLock<Vec<String>>,
    references: RwLock<Vec<ReferenceEntity>>,
    should_fail: AtomicBool,
    fail_message: RwLock<String>,
    metadata_fails: AtomicBool,
    /// Simulated latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    calls: Mutex<Vec<MockCall>>,
}

impl std::fmt::Debug for MockStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStorage")
            .field("should_fail", &self.should_fail.load(Ordering::Relaxed))
            .field("metadata_fails", &self.metadata_fails.load(Ordering::Relaxed))
            .field("latency_ms", &self.latency_ms.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockStorage {
    fn default() -> Self {
        MockStorageBuilder::new().build()
    }
}

/// The granularity a filter constrains `period_type` to.
fn filter_granularity(filter: &Filter) -> Option<Granularity> {
    match filter.predicates.get("period_type") {
        Some(Constraint::Eq(Scalar::Text(value))) => value.parse().ok(),
        _ => None,
    }
}

fn matches_location(filter: &Filter, row: &RawRow) -> bool {
    let wanted = |value: &Scalar| match (value, &row.location) {
        (Scalar::Text(code), Some(location)) => code == location,
        _ => false,
    };
    match filter.predicates.get("location") {
        Some(Constraint::Eq(value)) => wanted(value),
        Some(Constraint::In(values)) => values.iter().any(wanted),
        _ => true,
    }
}

fn matches_dates(filter: &Filter, row: &RawRow) -> bool {
    let from = filter.date_from.map(|d| d.date());
    let to = filter.date_to.map(|d| d.date());
    from.is_none_or(|from| row.date >= from) && to.is_none_or(|to| row.date <= to)
}

impl MockStorage {
    /// Create an empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the grouped rows served at a granularity.
    pub async fn set_aggregate(&self, granularity: Granularity, rows: Vec<RawRow>) {
        self.aggregate.write().await.insert(granularity, rows);
    }

    /// Replace the raw rows served at a granularity.
    pub async fn set_raw(&self, granularity: Granularity, rows: Vec<RawRow>) {
        self.raw.write().await.insert(granularity, rows);
    }

    /// Make every call fail.
    pub async fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self.fail_message.write().await = msg.to_string();
        }
    }

    /// Make only source and reference lookups fail.
    pub fn set_metadata_failure(&self, fail: bool) {
        self.metadata_fails.store(fail, Ordering::Relaxed);
    }

    /// Set simulated latency.
    ///
    /// Every call will be delayed by this duration.
    /// Set to `Duration::ZERO` to disable latency simulation.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of calls made to one operation.
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// Forget recorded calls.
    pub fn reset_calls(&self) {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    async fn enter(&self, operation: &'static str, filter: Option<&Filter>) -> StoreResult<()> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall {
                operation,
                granularity: filter.and_then(filter_granularity),
            });

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if self.should_fail.load(Ordering::Relaxed) {
            let msg = self.fail_message.read().await.clone();
            return Err(StoreError::Io(std::io::Error::other(msg)));
        }
        Ok(())
    }

    async fn check_metadata(&self) -> StoreResult<()> {
        if self.metadata_fails.load(Ordering::Relaxed) {
            return Err(StoreError::Io(std::io::Error::other(
                "Mock metadata failure",
            )));
        }
        Ok(())
    }

    /// Scripted rows matching a filter, date ascending.
    fn select(table: &HashMap<Granularity, Vec<RawRow>>, filter: &Filter) -> Vec<RawRow> {
        let mut rows: Vec<RawRow> = match filter_granularity(filter) {
            Some(g) => table.get(&g).cloned().unwrap_or_default(),
            None => table.values().flatten().cloned().collect(),
        };
        rows.retain(|r| matches_dates(filter, r) && matches_location(filter, r));
        rows.sort_by_key(|r| r.date);
        rows
    }
}

#[async_trait]
impl Storage for MockStorage {
    async fn aggregate_by_date(
        &self,
        _collection: &str,
        filter: &Filter,
        _shape: &RowShape,
    ) -> StoreResult<Vec<RawRow>> {
        self.enter("aggregate_by_date", Some(filter)).await?;
        Ok(Self::select(&*self.aggregate.read().await, filter))
    }

    async fn find_raw(
        &self,
        _collection: &str,
        filter: &Filter,
        _shape: &RowShape,
    ) -> StoreResult<Vec<RawRow>> {
        self.enter("find_raw", Some(filter)).await?;
        Ok(Self::select(&*self.raw.read().await, filter))
    }

    async fn find_one(
        &self,
        _collection: &str,
        filter: &Filter,
        _shape: &RowShape,
        order: SortOrder,
    ) -> StoreResult<Option<RawRow>> {
        self.enter("find_one", Some(filter)).await?;
        let mut rows = Self::select(&*self.raw.read().await, filter);
        if rows.is_empty() {
            rows = Self::select(&*self.aggregate.read().await, filter);
        }
        Ok(match order {
            SortOrder::Ascending => rows.into_iter().next(),
            SortOrder::Descending => rows.pop(),
        })
    }

    async fn find_distinct_sources(
        &self,
        _collection: &str,
        filter: &Filter,
    ) -> StoreResult<Vec<String>> {
        self.enter("find_distinct_sources", Some(filter)).await?;
        self.check_metadata().await?;
        Ok(self.sources.read().await.clone())
    }

    async fn find_by_ids(&self, ids: &[String]) -> StoreResult<Vec<ReferenceEntity>> {
        self.enter("find_by_ids", None).await?;
        self.check_metadata().await?;
        Ok(self
            .references
            .read()
            .await
            .iter()
            .filter(|r| ids.contains(&r.id))
            .cloned()
            .collect())
    }
}

/// Builder for [`MockStorage`].
#[derive(Debug, Default)]
pub struct MockStorageBuilder {
    aggregate: HashMap<Granularity, Vec<RawRow>>,
    raw: HashMap<Granularity, Vec<RawRow>>,
    sources: Vec<String>,
    references: Vec<ReferenceEntity>,
    latency: Duration,
}

impl MockStorageBuilder {
    /// Create a builder with no scripted data.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grouped rows served at a granularity.
    pub fn aggregate(mut self, granularity: Granularity, rows: Vec<RawRow>) -> Self {
        self.aggregate.insert(granularity, rows);
        self
    }

    /// Raw rows served at a granularity.
    pub fn raw(mut self, granularity: Granularity, rows: Vec<RawRow>) -> Self {
        self.raw.insert(granularity, rows);
        self
    }

    /// Data-source ids returned by source lookups.
    pub fn sources(mut self, sources: &[&str]) -> Self {
        self.sources = sources.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Reference entities available to id lookups.
    pub fn references(mut self, references: Vec<ReferenceEntity>) -> Self {
        self.references = references;
        self
    }

    /// Delay every call.
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Build the mock.
    pub fn build(self) -> MockStorage {
        MockStorage {
            aggregate: RwLock::new(self.aggregate),
            raw: RwLock::new(self.raw),
            sources: RwLock::new(self.sources),
            references: RwLock::new(self.references),
            should_fail: AtomicBool::new(false),
            fail_message: RwLock::new("Mock failure".to_string()),
            metadata_fails: AtomicBool::new(false),
            latency_ms: AtomicU64::new(self.latency.as_millis() as u64),
            calls: Mutex::new(Vec::new()),
        }
    }
}
