//! Store-level error classification (spec.md §4.1 failure model): the
//! engine retries `Transient` failures and gives up immediately on
//! `Permanent` ones.

use std::fmt;

#[derive(Debug)]
pub enum StoreError {
    /// Network hiccup, connection-pool exhaustion, serialization failure
    /// under contention — safe, and expected, to retry.
    Transient(String),
    /// Constraint violation or a logic error; retrying would just fail the
    /// same way again.
    Permanent(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            StoreError::Transient(m) | StoreError::Permanent(m) => m,
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Transient(m) => write!(f, "transient store error: {m}"),
            StoreError::Permanent(m) => write!(f, "permanent store error: {m}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Transient(err.to_string())
            }
            sqlx::Error::Database(db) if db.is_unique_violation() || db.is_check_violation() => {
                StoreError::Permanent(err.to_string())
            }
            _ => StoreError::Transient(err.to_string()),
        }
    }
}

impl From<StoreError> for crosspost_core::AppError {
    fn from(err: StoreError) -> Self {
        let kind = if err.is_transient() {
            crosspost_core::ErrorKind::BackendUnreachable
        } else {
            crosspost_core::ErrorKind::Internal
        };
        crosspost_core::AppError::new(kind, err.message().to_string())
    }
}
