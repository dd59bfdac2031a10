//! Error types shared by the query and ingestion layers.

use thiserror::Error;

use crate::value::Kind;

/// A failure reported by the underlying database client.
///
/// Drivers only hand back the message text; the reader inspects it for the
/// unknown-column phrasings it knows how to heal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DriverError {
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Positional bulk-load failure: where the batch stopped and what it was binding.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "bulk load failed at row {row}, column {column} (last value {value}, detected {kind}): {source}"
)]
pub struct LoadError {
    pub row: usize,
    pub column: usize,
    pub value: String,
    pub kind: Kind,
    pub source: DriverError,
}

/// Errors raised by the query, ingestion and connection layers.
#[derive(Debug, Error)]
pub enum DbError {
    /// Unsupported dialect, missing required field and the like. Never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing arguments, malformed filters. Fatal to the single call.
    #[error("validation error: {0}")]
    Validation(String),

    /// A row in a batch does not line up with the column list.
    #[error("row {row} has {found} values for {expected} columns (column index {column})")]
    Arity {
        row: usize,
        column: usize,
        found: usize,
        expected: usize,
    },

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}
