//! Error types for episeries-core.
//!
//! | Error Type | Surfaced as | Retried |
//! |------------|-------------|---------|
//! | [`Error::Validation`] | caller error | never |
//! | [`Error::Storage`] | server error | never (no local retries) |
//! | [`Error::Reconstruction`] | server error, logged with the offending row | never |
//! | [`Error::Timeout`] | gateway timeout | never |
//! | [`Error::Cancelled`] | request abandoned | never |
//!
//! Granularity fallback is driven by empty results only. No variant in
//! this module ever triggers a second retrieval attempt.

use std::time::Duration;

use thiserror::Error;

/// Errors produced while answering a series query.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller supplied malformed or unsupported parameters.
    #[error("Invalid query: {0}")]
    Validation(#[from] ValidationError),

    /// The storage collaborator failed.
    #[error("Storage error: {0}")]
    Storage(#[from] episeries_store::Error),

    /// An entry builder could not turn stored rows into an entry.
    #[error("Cannot reconstruct entry for {date}: {reason}")]
    Reconstruction {
        /// The date (or week key) being built.
        date: String,
        /// What was wrong with the stored rows.
        reason: String,
    },

    /// A storage call exceeded the configured query timeout.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The storage operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// The caller cancelled the request.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a reconstruction error for a date key.
    pub fn reconstruction(date: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Reconstruction {
            date: date.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Whether this error is the caller's fault.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

/// Caller errors detected while building a query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ValidationError {
    /// A date parameter is not `YYYY-MM-DD`.
    #[error("{field}: '{value}' is not a valid YYYY-MM-DD date")]
    InvalidDate { field: &'static str, value: String },

    /// `period_type` is present but neither Daily nor Weekly.
    #[error("period_type: '{0}' must be Daily or Weekly")]
    InvalidPeriodType(String),

    /// The split field is not declared for the indicator.
    #[error("split: '{field}' is not a split dimension of {indicator}")]
    UnknownSplit { indicator: String, field: String },

    /// An extra filter is not declared for the indicator.
    #[error("'{field}' is not a filter of {indicator}")]
    UnknownFilter { indicator: String, field: String },

    /// A field name contains characters other than `[A-Za-z0-9_]`.
    #[error("'{0}' is not a valid field name")]
    InvalidField(String),

    /// A location series was requested without locations.
    #[error("location: at least one location is required")]
    EmptyLocations,

    /// `start_date` is after `end_date`.
    #[error("start_date {start} is after end_date {end}")]
    InvertedRange { start: String, end: String },

    /// The explicit range is longer than allowed.
    #[error("date range of {days} days exceeds the maximum of {max} days")]
    RangeTooLong { days: i64, max: u32 },
}

/// Result type alias using episeries-core's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display() {
        let err = Error::from(ValidationError::InvalidDate {
            field: "start_date",
            value: "2024-13-01".to_string(),
        });
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Invalid query: start_date: '2024-13-01' is not a valid YYYY-MM-DD date"
        );
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::timeout("aggregate_by_date", Duration::from_secs(5));
        assert!(!err.is_validation());
        assert!(err.to_string().contains("aggregate_by_date"));
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_reconstruction_display() {
        let err = Error::reconstruction("2024-01-01", "row has no value");
        assert_eq!(
            err.to_string(),
            "Cannot reconstruct entry for 2024-01-01: row has no value"
        );
    }

    #[test]
    fn test_storage_from() {
        let err: Error = episeries_store::Error::InvalidField("a b".to_string()).into();
        assert!(matches!(err, Error::Storage(_)));
    }
}
