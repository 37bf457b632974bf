//! Driver abstraction over the native database engine.
//!
//! The pool, scope, and access layer are written against these two traits so
//! the concurrency machinery stays independent of any one engine. The
//! production implementation is [`SqliteDriver`](crate::db::sqlite::SqliteDriver).

use crate::db::value::{DbValue, Row};
use crate::error::DbResult;
use async_trait::async_trait;

/// Factory for native connections to one engine.
#[async_trait]
pub trait Driver: Clone + Send + Sync + 'static {
    /// The native connection type this driver opens.
    type Conn: DriverConnection;

    /// Open a new native connection.
    async fn open(&self, connection_string: &str) -> DbResult<Self::Conn>;
}

/// One native connection.
///
/// Transaction boundaries are explicit: the transactional scope brackets
/// every unit of work with `begin` and exactly one of `commit`/`rollback`.
/// Implementations must not auto-commit between those calls.
#[async_trait]
pub trait DriverConnection: Send + 'static {
    /// Run a read-only statement and decode all result rows.
    async fn query(&mut self, sql: &str, params: &[DbValue]) -> DbResult<Vec<Row>>;

    /// Run a mutating statement, returning the number of affected rows.
    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> DbResult<u64>;

    /// Begin an explicit transaction.
    async fn begin(&mut self) -> DbResult<()>;

    /// Commit the current transaction.
    async fn commit(&mut self) -> DbResult<()>;

    /// Roll back the current transaction.
    async fn rollback(&mut self) -> DbResult<()>;

    /// Cheap liveness probe. Expected failures return `false`; this never
    /// errors, so probing stays out of the error path.
    async fn ping(&mut self) -> bool;

    /// Close the native handle.
    async fn close(self) -> DbResult<()>;
}
