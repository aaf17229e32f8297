//! Error types for value parsing in episeries-types.

use thiserror::Error;

/// Errors that can occur when parsing indicator values at the boundary.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A date string was not in `YYYY-MM-DD` form or named an impossible day.
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// A period type other than `Daily` or `Weekly`.
    #[error("Invalid period type '{0}': expected Daily or Weekly")]
    InvalidPeriodType(String),
}

/// Result type alias using episeries-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
