//! Error types for the reportdb access layer.
//!
//! All errors use `thiserror` for ergonomic handling. Callers see exactly two
//! failure shapes: a timeout (retry later) and a query/command error (inspect
//! and decide); pool-internal bookkeeping failures are contained by the pool
//! itself and never surface here.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// The pool was at capacity and no connection became available within the
    /// acquire deadline. Transient; never indicates data corruption.
    #[error("Connection pool acquire timed out after {elapsed_secs}s")]
    PoolTimeout { elapsed_secs: u64 },

    /// The pool has been closed and will never hand out a connection again.
    #[error("Connection pool is closed")]
    PoolClosed,

    /// A connection failed its liveness probe. The pool discards it and
    /// replaces it on next demand; callers only see this when the probe
    /// failure happened while opening a connection on their behalf.
    #[error("Connection failed health check: {message}")]
    ConnectionInvalid { message: String },

    /// The driver rejected a query or command. Carries the original driver
    /// message; the transactional scope has already rolled back.
    #[error("Query failed: {message}")]
    Query { message: String },

    /// Commit failed during scope teardown. Transaction state is unknown and
    /// the connection has been discarded.
    #[error("Commit failed: {message}")]
    CommitFailed { message: String },

    /// Rollback failed during scope teardown. The connection has been
    /// discarded.
    #[error("Rollback failed: {message}")]
    RollbackFailed { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a pool timeout error.
    pub fn pool_timeout(elapsed_secs: u64) -> Self {
        Self::PoolTimeout { elapsed_secs }
    }

    /// Create a connection-invalid error.
    pub fn connection_invalid(message: impl Into<String>) -> Self {
        Self::ConnectionInvalid {
            message: message.into(),
        }
    }

    /// Create a query error carrying the driver's message.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query {
            message: message.into(),
        }
    }

    /// Create a commit failure error.
    pub fn commit_failed(message: impl Into<String>) -> Self {
        Self::CommitFailed {
            message: message.into(),
        }
    }

    /// Create a rollback failure error.
    pub fn rollback_failed(message: impl Into<String>) -> Self {
        Self::RollbackFailed {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is retryable.
    ///
    /// Only a pool timeout is safe to retry blindly; a closed pool requires a
    /// fresh registry lookup and everything else needs inspection.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PoolTimeout { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection_invalid(msg.to_string()),
            sqlx::Error::Database(db_err) => DbError::query(db_err.message()),
            sqlx::Error::Io(io_err) => DbError::query(format!("I/O error: {}", io_err)),
            sqlx::Error::RowNotFound => DbError::query("No rows returned"),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::query(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
