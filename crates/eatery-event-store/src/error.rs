//! Mapping of sqlx errors onto the domain error taxonomy.
//!
//! | sqlx error | `DomainError` |
//! |---|---|
//! | `Database` with SQLSTATE `23505` | decided by the caller (`Conflict` or a duplicate outcome) |
//! | `Database` (other) | `Transient` |
//! | `PoolTimedOut`, `PoolClosed`, `Io`, `Tls`, `Protocol` | `Transient` |
//! | `ColumnDecode`, `Decode`, `ColumnNotFound` | `Serialization` |
//! | anything else | `Transient` |

use eatery_core::error::DomainError;

const UNIQUE_VIOLATION: &str = "23505";

/// Whether `err` is a unique-constraint violation.
#[must_use]
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| code.as_ref() == UNIQUE_VIOLATION),
        _ => false,
    }
}

/// Name of the constraint `err` violated, if the database reported one.
#[must_use]
pub fn violated_constraint(err: &sqlx::Error) -> Option<&str> {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint(),
        _ => None,
    }
}

/// Converts an sqlx error raised by `operation` into a `DomainError`.
#[must_use]
pub fn map_sqlx_error(operation: &str, err: sqlx::Error) -> DomainError {
    match err {
        sqlx::Error::Database(db_err) => {
            DomainError::Transient(format!("database error in {operation}: {}", db_err.message()))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) | sqlx::Error::ColumnNotFound(_) => {
            DomainError::Serialization(format!("malformed row in {operation}: {err}"))
        }
        sqlx::Error::PoolTimedOut => {
            DomainError::Transient(format!("connection pool timed out in {operation}"))
        }
        sqlx::Error::PoolClosed => {
            DomainError::Transient(format!("connection pool closed in {operation}"))
        }
        _ => DomainError::Transient(format!("sqlx error in {operation}: {err}")),
    }
}
