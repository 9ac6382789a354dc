//! Core error types.
//!
//! Database-agnostic: the storage layer converts backend-specific errors
//! into [`DatabaseError`] before they reach this crate.

use chrono::NaiveDate;
use thiserror::Error;

use fundsnap_market_data::MarketDataError;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the valuation pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Market data operation failed: {0}")]
    MarketData(#[from] MarketDataError),

    #[error(
        "Snapshot verification failed for fund '{fund}' on {date}: wrote {expected} rows, store holds {actual}"
    )]
    PersistenceMismatch {
        fund: String,
        date: NaiveDate,
        expected: usize,
        actual: usize,
    },

    #[error("Input validation failed: {0}")]
    Validation(String),
}

/// Database-agnostic error for storage operations.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    #[error("Database query failed: {0}")]
    QueryFailed(String),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl From<Error> for String {
    fn from(err: Error) -> Self {
        err.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_mismatch_display() {
        let err = Error::PersistenceMismatch {
            fund: "alpha".to_string(),
            date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            expected: 12,
            actual: 7,
        };
        let message = err.to_string();
        assert!(message.contains("alpha"));
        assert!(message.contains("12"));
        assert!(message.contains("7"));
    }

    #[test]
    fn test_database_error_wraps_into_root() {
        let err: Error = DatabaseError::QueryFailed("locked".to_string()).into();
        assert!(matches!(err, Error::Database(_)));
    }
}
