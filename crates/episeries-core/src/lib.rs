//! Gap-filling time-series engine for epidemiological indicators.
//!
//! This crate turns sparse indicator records into continuous daily or
//! weekly series, optionally split by a categorical dimension and fanned
//! out per location.
//!
//! # Features
//!
//! - **Query building**: normalized predicates from loosely-typed parameters
//! - **Granularity fallback**: one retry at the alternate granularity on empty results
//! - **Gap-filling**: one entry per calendar date or anchored week, zero where no data
//! - **Weekday anchoring**: weekly keys follow the weekday most data falls on
//! - **Location fan-out**: every requested location on every date
//! - **Metadata**: data sources and reference lookups, fetched concurrently
//! - **Cancellation**: caller tokens and query timeouts bound every storage call
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use episeries_core::{EngineOptions, FilterParams, Indicator, QuerySpec, SeriesService};
//! use episeries_store::SqliteStorage;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let storage = Arc::new(SqliteStorage::open("data.db")?);
//!     let engine = SeriesService::new(storage, EngineOptions::default());
//!
//!     let cases = Indicator::by_name("cases").ok_or("unknown indicator")?;
//!     let params = FilterParams::new()
//!         .location("DE")
//!         .split("age_group")
//!         .start_date("2024-01-01")
//!         .end_date("2024-03-31");
//!     let spec = QuerySpec::build(cases, &params)?;
//!
//!     let series = engine.get_series(&spec, &CancellationToken::new()).await?;
//!     for entry in &series.data {
//!         println!("{}: {}", entry.date, entry.total);
//!     }
//!     Ok(())
//! }
//! ```

pub mod entries;
pub mod error;
pub mod fallback;
pub mod guard;
pub mod indicators;
pub mod locations;
pub mod metadata;
pub mod mock;
pub mod query;
pub mod series;
pub mod service;
pub mod weekly;

pub use entries::daily_entry_builder;
pub use error::{Error, Result, ValidationError};
pub use fallback::{Attempt, Fetched, fetch_with_fallback};
pub use guard::CallGuard;
pub use indicators::{INDICATORS, Indicator};
pub use locations::location_entry_builder;
pub use metadata::{Metadata, assemble_metadata};
pub use mock::{MockCall, MockStorage, MockStorageBuilder};
pub use query::{DateBounds, FilterParams, FilterValue, QuerySpec};
pub use series::{
    Built, DateBucketMap, Dated, Reconstruction, bucket_by_date, reconstruct, resolve_range,
};
pub use service::{EngineOptions, SeriesResponse, SeriesService};
pub use weekly::{anchor_weekday, week_key};

// Re-export the storage facade so engine users need one import
pub use episeries_store::Storage;
