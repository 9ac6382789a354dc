//! Storage-specific error types for SQLite operations.
//!
//! Wraps rusqlite errors and converts them to the database-agnostic
//! error types defined in `fundsnap_core` at the crate boundary.

use rusqlite::Error as SqliteError;
use thiserror::Error;

use fundsnap_core::errors::{DatabaseError, Error};

/// Errors internal to the storage layer. Converted to
/// `fundsnap_core::Error` before being returned to callers.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database open failed: {0}")]
    OpenFailed(String),

    #[error("Query execution failed: {0}")]
    QueryFailed(#[from] SqliteError),

    #[error("Stored value could not be decoded: {0}")]
    Decode(String),

    #[error("Core error: {0}")]
    CoreError(String),
}

/// Conversion for closures run on the writer actor, which return core
/// errors but execute inside a storage-level transaction wrapper.
impl From<Error> for StorageError {
    fn from(err: Error) -> Self {
        StorageError::CoreError(err.to_string())
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::OpenFailed(e) => Error::Database(DatabaseError::ConnectionFailed(e)),
            StorageError::QueryFailed(SqliteError::QueryReturnedNoRows) => {
                Error::Database(DatabaseError::NotFound("Record not found".to_string()))
            }
            StorageError::QueryFailed(SqliteError::SqliteFailure(code, message))
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::Database(DatabaseError::UniqueViolation(
                    message.unwrap_or_else(|| code.to_string()),
                ))
            }
            StorageError::QueryFailed(e) => {
                Error::Database(DatabaseError::QueryFailed(e.to_string()))
            }
            StorageError::Decode(e) => Error::Database(DatabaseError::Internal(e)),
            StorageError::CoreError(e) => Error::Database(DatabaseError::Internal(e)),
        }
    }
}
