//! Storage collaborator for epidemiological indicator records.
//!
//! This crate provides the [`Storage`] facade the aggregation engine
//! consumes, and a SQLite-backed implementation of it.
//!
//! # Features
//!
//! - Grouped retrieval by date (and an optional split field)
//! - Raw per-record retrieval for location fan-out
//! - First/last record lookups for date intervals
//! - Distinct data-source and reference-entity lookups for metadata
//!
//! # Example
//!
//! ```no_run
//! use episeries_store::{NewRecord, Store};
//! use episeries_types::{Aggregation, Filter, Granularity, RowShape};
//! use time::macros::date;
//!
//! let store = Store::open(episeries_store::default_db_path())?;
//! store.insert_record(
//!     &NewRecord::new("cases", date!(2024 - 01 - 01), Granularity::Daily)
//!         .at("DE")
//!         .attr("value", 5),
//! )?;
//!
//! let rows = store.aggregate_by_date(
//!     "cases",
//!     &Filter::new().eq("location", "DE"),
//!     &RowShape::new("value", Aggregation::Sum),
//! )?;
//! # Ok::<(), episeries_store::Error>(())
//! ```

mod error;
mod models;
mod queries;
mod schema;
mod storage;
mod store;

pub use error::{Error, Result};
pub use models::{NewRecord, strip_time};
pub use storage::{SqliteStorage, Storage};
pub use store::Store;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/episeries/data.db`
/// - macOS: `~/Library/Application Support/episeries/data.db`
/// - Windows: `C:\Users\<user>\AppData\Local\episeries\data.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("episeries")
        .join("data.db")
}
