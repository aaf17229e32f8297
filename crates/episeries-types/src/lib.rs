//! Shared value types for epidemiological indicator time series.
//!
//! This crate provides the vocabulary used by the store (episeries-store),
//! the aggregation engine (episeries-core) and the HTTP service.
//!
//! # Features
//!
//! - Granularity (`Daily` / `Weekly`) parsing
//! - Predicate types handed to the storage collaborator
//! - Raw rows and the gap-filled series entry shapes
//! - ISO date helpers
//!
//! # Example
//!
//! ```
//! use episeries_types::{DailyEntry, Granularity, iso_date, parse_iso_date};
//!
//! let date = parse_iso_date("2024-01-02").unwrap();
//! assert_eq!(iso_date(date), "2024-01-02");
//! assert_eq!(DailyEntry::zero("2024-01-02").total, 0.0);
//! assert_eq!(Granularity::default(), Granularity::Daily);
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{
    Aggregation, Constraint, DailyEntry, DateInterval, Filter, Granularity, LocationDay,
    LocationEntry, RawRow, ReferenceEntity, RowShape, Scalar, SortOrder, SplitTotal, iso_date,
    parse_iso_date,
};
