//! Validation errors raised at the record boundary.

use thiserror::Error;

/// Reasons a record is rejected before it reaches the replica.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The amount is zero or negative.
    #[error("amount must be positive, got {0}")]
    NonPositiveAmount(String),

    /// The amount exceeds the largest accepted value.
    #[error("amount must not exceed 999999999999.99, got {0}")]
    AmountTooLarge(String),

    /// The amount is not a decimal number.
    #[error("invalid amount: {0:?}")]
    InvalidAmount(String),

    /// The category is not one of the known tags.
    #[error("unknown category: {0:?}")]
    UnknownCategory(String),

    /// The description is empty or whitespace.
    #[error("description must not be empty")]
    EmptyDescription,

    /// The expense date lies after today.
    #[error("date {date} is in the future (today is {today})")]
    FutureDate {
        /// The rejected date.
        date: chrono::NaiveDate,
        /// The reference date.
        today: chrono::NaiveDate,
    },

    /// An identifier could not be parsed.
    #[error("invalid expense id: {0:?}")]
    InvalidId(String),
}
