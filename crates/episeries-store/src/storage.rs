//! The storage facade consumed by the aggregation engine.
//!
//! [`Storage`] abstracts the retrieval modes the engine needs so that the
//! engine can run against SQLite in production and scripted mocks in tests.

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::Mutex;

use episeries_types::{Filter, RawRow, ReferenceEntity, RowShape, SortOrder};

use crate::error::Result;
use crate::store::Store;

/// Read-only retrieval operations on indicator records.
///
/// All row-returning operations return rows sorted by date in the requested
/// (or ascending) order. Implementations must not retry on their own.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Filtered and grouped retrieval: one row per date, or per date and
    /// split value when `shape.split_field` is set.
    async fn aggregate_by_date(
        &self,
        collection: &str,
        filter: &Filter,
        shape: &RowShape,
    ) -> Result<Vec<RawRow>>;

    /// Filtered retrieval of one row per stored record, date ascending.
    async fn find_raw(
        &self,
        collection: &str,
        filter: &Filter,
        shape: &RowShape,
    ) -> Result<Vec<RawRow>>;

    /// The first matching record in the given date order.
    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        shape: &RowShape,
        order: SortOrder,
    ) -> Result<Option<RawRow>>;

    /// Distinct data-source identifiers of matching records.
    async fn find_distinct_sources(&self, collection: &str, filter: &Filter)
    -> Result<Vec<String>>;

    /// Reference entities for the given ids.
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<ReferenceEntity>>;
}

/// [`Storage`] backed by a SQLite [`Store`].
///
/// The connection is guarded by a mutex, held only for the duration of a
/// single query.
pub struct SqliteStorage {
    store: Mutex<Store>,
}

impl SqliteStorage {
    /// Wrap an open store.
    pub fn new(store: Store) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// Open a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Store::open(path)?))
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Store::open_in_memory()?))
    }

    /// Direct access to the underlying store (seeding, maintenance).
    pub fn store(&self) -> &Mutex<Store> {
        &self.store
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn aggregate_by_date(
        &self,
        collection: &str,
        filter: &Filter,
        shape: &RowShape,
    ) -> Result<Vec<RawRow>> {
        let store = self.store.lock().await;
        store.aggregate_by_date(collection, filter, shape)
    }

    async fn find_raw(
        &self,
        collection: &str,
        filter: &Filter,
        shape: &RowShape,
    ) -> Result<Vec<RawRow>> {
        let store = self.store.lock().await;
        store.find_raw(collection, filter, shape, SortOrder::Ascending, None)
    }

    async fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
        shape: &RowShape,
        order: SortOrder,
    ) -> Result<Option<RawRow>> {
        let store = self.store.lock().await;
        store.find_one(collection, filter, shape, order)
    }

    async fn find_distinct_sources(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<String>> {
        let store = self.store.lock().await;
        store.find_distinct_sources(collection, filter)
    }

    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<ReferenceEntity>> {
        let store = self.store.lock().await;
        store.find_by_ids(ids)
    }
}
