//! Checked-out connection wrapper.
//!
//! A [`PooledConnection`] represents exclusive, temporary ownership of one
//! native connection together with its admission permit. Exactly one caller
//! holds it at a time; returning it to the pool goes through
//! `Pool::release`, which decides between requeue and eviction.

use crate::db::driver::Driver;
use crate::db::pool::PoolInner;
use std::sync::Arc;
use tokio::sync::OwnedSemaphorePermit;

/// A native connection owned by the pool, plus its validity marker and
/// creation sequence number.
pub(crate) struct Connection<C> {
    pub(crate) handle: C,
    pub(crate) sequence: u64,
    pub(crate) valid: bool,
}

/// Exclusive checkout of one connection.
///
/// Prefer returning it with `Pool::release`. Dropping it without a release
/// (a bug or a panic path) discards the connection and repairs the pool's
/// counters; the native handle is then closed by its own drop rather than an
/// orderly shutdown.
pub struct PooledConnection<D: Driver> {
    pub(crate) conn: Option<Connection<D::Conn>>,
    pub(crate) permit: Option<OwnedSemaphorePermit>,
    pub(crate) pool: Arc<PoolInner<D>>,
}

impl<D: Driver> PooledConnection<D> {
    pub(crate) fn new(
        conn: Connection<D::Conn>,
        permit: OwnedSemaphorePermit,
        pool: Arc<PoolInner<D>>,
    ) -> Self {
        Self {
            conn: Some(conn),
            permit: Some(permit),
            pool,
        }
    }

    /// Creation sequence number of the underlying connection.
    pub fn sequence(&self) -> u64 {
        self.conn.as_ref().expect("connection taken").sequence
    }

    /// Whether the connection is still considered usable.
    pub fn is_valid(&self) -> bool {
        self.conn.as_ref().expect("connection taken").valid
    }

    /// Mark the connection unusable. Release will discard it regardless of
    /// the caller's healthy flag.
    pub fn invalidate(&mut self) {
        if let Some(conn) = self.conn.as_mut() {
            conn.valid = false;
        }
    }

    /// Access the native connection.
    pub fn conn_mut(&mut self) -> &mut D::Conn {
        &mut self.conn.as_mut().expect("connection taken").handle
    }
}

impl<D: Driver> Drop for PooledConnection<D> {
    fn drop(&mut self) {
        // Normal path: Pool::release took the parts and this is a no-op.
        if let Some(conn) = self.conn.take() {
            self.pool.note_dropped_connection(conn.sequence);
        }
    }
}

impl<D: Driver> std::fmt::Debug for PooledConnection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("PooledConnection");
        match &self.conn {
            Some(conn) => s
                .field("sequence", &conn.sequence)
                .field("valid", &conn.valid)
                .finish(),
            None => s.field("released", &true).finish(),
        }
    }
}
