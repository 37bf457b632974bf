//! Transactional scope.
//!
//! Turns one acquire/release pair into an all-or-nothing unit of work with
//! deterministic cleanup on every exit path. This is the only place commit
//! and rollback boundaries are decided; nothing above this layer manages
//! transactions.

use crate::db::driver::{Driver, DriverConnection};
use crate::db::pool::Pool;
use crate::error::{DbError, DbResult};
use futures_util::future::BoxFuture;
use tracing::warn;

/// One checkout bound to one commit-or-rollback outcome.
///
/// Read scopes run concurrently; write scopes additionally hold the pool's
/// write mutex across the operation and its commit, since the engine can
/// corrupt state when two different connections write at once.
pub struct TransactionScope<'a, D: Driver> {
    pool: &'a Pool<D>,
    serialize_writes: bool,
}

impl<'a, D: Driver> TransactionScope<'a, D> {
    /// Scope for a read-only operation. Does not touch the write mutex.
    pub fn read(pool: &'a Pool<D>) -> Self {
        Self {
            pool,
            serialize_writes: false,
        }
    }

    /// Scope for a mutating operation, serialized behind the write mutex.
    pub fn write(pool: &'a Pool<D>) -> Self {
        Self {
            pool,
            serialize_writes: true,
        }
    }

    /// Run `operation` inside an explicit transaction.
    ///
    /// On success the transaction commits; on any error it rolls back
    /// (best effort, secondary failures logged and swallowed) and the
    /// original error is re-surfaced after cleanup. The connection is always
    /// released or discarded, never leaked: a connection whose teardown
    /// left transaction state unknown is discarded rather than requeued.
    pub async fn run<T, F>(self, operation: F) -> DbResult<T>
    where
        F: for<'c> FnOnce(&'c mut D::Conn) -> BoxFuture<'c, DbResult<T>>,
    {
        let mut checkout = self.pool.acquire().await?;

        // Lock order: Pool -> Connection -> WriteLock.
        let write_guard = if self.serialize_writes {
            Some(self.pool.write_guard().await)
        } else {
            None
        };

        if let Err(e) = checkout.conn_mut().begin().await {
            drop(write_guard);
            self.pool.record_failed();
            self.pool.release(checkout, false).await;
            return Err(e);
        }

        let outcome = operation(checkout.conn_mut()).await;

        let (healthy, result) = match outcome {
            Ok(value) => match checkout.conn_mut().commit().await {
                Ok(()) => {
                    self.pool.record_completed();
                    (true, Ok(value))
                }
                Err(commit_err) => {
                    warn!(
                        pool = %self.pool.name(),
                        error = %commit_err,
                        "Commit failed, attempting rollback"
                    );
                    if let Err(rollback_err) = checkout.conn_mut().rollback().await {
                        warn!(
                            pool = %self.pool.name(),
                            error = %rollback_err,
                            "Rollback after failed commit also failed"
                        );
                    }
                    self.pool.record_failed();
                    // Transaction state is unknown either way: discard.
                    (false, Err(DbError::commit_failed(commit_err.to_string())))
                }
            },
            Err(operation_err) => {
                let healthy = match checkout.conn_mut().rollback().await {
                    Ok(()) => true,
                    Err(rollback_err) => {
                        warn!(
                            pool = %self.pool.name(),
                            error = %rollback_err,
                            "Rollback failed, discarding connection"
                        );
                        false
                    }
                };
                self.pool.record_failed();
                (healthy, Err(operation_err))
            }
        };

        // The write mutex is never held across a release that may block.
        drop(write_guard);
        self.pool.release(checkout, healthy).await;

        result
    }
}
