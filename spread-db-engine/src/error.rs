// SPDX-FileCopyrightText: 2025 spread-db contributors
// SPDX-License-Identifier: MIT

//! Error types for engine operations.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::config::ConfigError;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or executing statements.
///
/// Errors are recorded on the [`Db`](crate::Db) handle that produced them and
/// are cheap to clone, so every handle derived from an errored one carries the
/// same value.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[source] Arc<rusqlite::Error>),

    /// Failed to open database with context
    #[error("Failed to open database at '{path}': {source}")]
    DatabaseOpen {
        path: String,
        #[source]
        source: Arc<rusqlite::Error>,
    },

    /// No pooled connection became free in time
    #[error("Failed to check out a connection: {0}")]
    Pool(#[source] Arc<r2d2::Error>),

    /// Configuration could not be turned into a handle
    #[error("Configuration error: {0}")]
    Config(#[source] Arc<ConfigError>),

    /// Database file not found
    #[error("Database not found at: {0}")]
    DatabaseNotFound(PathBuf),

    /// A single-row lookup matched nothing
    #[error("record not found")]
    RecordNotFound,

    /// Malformed query fragment
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Neither a table nor a model was given
    #[error("No table to operate on, use table() or model()")]
    MissingTable,

    /// Update or delete without conditions
    #[error("WHERE conditions required for update or delete")]
    MissingWhereClause,

    /// Transaction control on a handle that is not (or already) in a transaction
    #[error("Invalid transaction")]
    InvalidTransaction,

    /// COMMIT failed; the transaction has been rolled back
    #[error("Failed to commit transaction: {0}")]
    Commit(#[source] Arc<rusqlite::Error>),

    /// ROLLBACK failed
    #[error("Failed to roll back transaction: {0}")]
    Rollback(#[source] Arc<rusqlite::Error>),

    /// A read-only handle was asked to run a statement that writes
    #[error("Statement would modify data through a read-only handle: {0}")]
    ReadOnly(String),

    /// The handle's context was cancelled
    #[error("Context cancelled")]
    Cancelled,

    /// The handle's context deadline passed
    #[error("Context deadline exceeded")]
    DeadlineExceeded,

    /// Converting between rows and Rust values failed
    #[error("Row mapping error: {0}")]
    Mapping(#[source] Arc<serde_json::Error>),
}

impl Error {
    /// Whether this is the not-found sentinel of single-row lookups.
    pub fn is_record_not_found(&self) -> bool {
        matches!(self, Error::RecordNotFound)
    }

    /// Whether SQLite stopped the statement through an interrupt.
    pub(crate) fn is_interrupt(&self) -> bool {
        match self {
            Error::Sqlite(e) => e.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted),
            _ => false,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidQuery(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Sqlite(Arc::new(e))
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(Arc::new(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Mapping(Arc::new(e))
    }
}
