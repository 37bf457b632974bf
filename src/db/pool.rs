//! Bounded connection pool.
//!
//! The embedded engine tolerates only a handful of simultaneous connections
//! and can corrupt state when two different connections write concurrently,
//! so the pool owns three jobs the driver does not do for us: admission
//! control (a semaphore with `max_connections` permits and an acquire
//! deadline), connection lifecycle (lazy creation, release-path health
//! probing, eviction), and write serialization (one coarse mutex over every
//! mutating operation, regardless of which connection performs it).
//!
//! # Lock discipline
//!
//! The idle queue and the statistics record use `std::sync::Mutex` and are
//! never held across an await. The write mutex is a `tokio::sync::Mutex`
//! taken only by write scopes, after the connection and released before the
//! connection goes back. Lock order is always Pool -> Connection -> WriteLock.

use crate::config::PoolConfig;
use crate::db::connection::{Connection, PooledConnection};
use crate::db::driver::{Driver, DriverConnection};
use crate::error::{DbError, DbResult};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, MutexGuard, Semaphore};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Read-only statistics snapshot (no secrets exposed).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PoolStats {
    /// Connections opened over the pool's lifetime.
    pub created: u64,
    /// Checkouts served from the idle queue.
    pub reused: u64,
    /// Operations that committed.
    pub completed_operations: u64,
    /// Operations that rolled back or failed to commit.
    pub failed_operations: u64,
    /// Connections discarded after a failure or failed probe.
    pub evicted: u64,
    /// Acquire calls that hit the deadline.
    pub timeouts: u64,
    /// Connections checked out right now.
    pub current_concurrent_operations: u32,
    /// High-water mark of concurrent checkouts.
    pub max_observed_concurrent_operations: u32,
}

pub(crate) struct PoolInner<D: Driver> {
    name: String,
    driver: D,
    config: PoolConfig,
    semaphore: Arc<Semaphore>,
    /// Idle connections. Never locked across an await.
    idle: Mutex<VecDeque<Connection<D::Conn>>>,
    /// Currently existing connections (idle + checked out). The capacity
    /// invariant is `created <= config.max_connections` at all times.
    created: AtomicU32,
    /// Monotonic creation sequence.
    sequence: AtomicU64,
    /// Serializes all mutating operations process-wide, independent of which
    /// connection each writer holds.
    write_lock: AsyncMutex<()>,
    stats: Mutex<PoolStats>,
    closed: AtomicBool,
}

impl<D: Driver> PoolInner<D> {
    /// Bookkeeping for a checkout dropped without an explicit release.
    pub(crate) fn note_dropped_connection(&self, sequence: u64) {
        self.created.fetch_sub(1, Ordering::AcqRel);
        {
            let mut stats = self.stats.lock().unwrap();
            stats.evicted += 1;
            stats.current_concurrent_operations =
                stats.current_concurrent_operations.saturating_sub(1);
        }
        warn!(
            pool = %self.name,
            sequence,
            "Connection dropped without release - discarding"
        );
    }
}

/// Bounded, shareable pool for one logical database.
///
/// Cloning is cheap and every clone addresses the same pool.
pub struct Pool<D: Driver> {
    inner: Arc<PoolInner<D>>,
}

impl<D: Driver> Clone for Pool<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Driver> Pool<D> {
    /// Create a pool. Lazy: no connection is opened until the first acquire.
    pub fn new(name: impl Into<String>, config: PoolConfig, driver: D) -> Self {
        let name = name.into();
        info!(
            pool = %name,
            max_connections = config.max_connections,
            acquire_timeout_secs = config.acquire_timeout.as_secs(),
            "Created connection pool"
        );
        Self {
            inner: Arc::new(PoolInner {
                semaphore: Arc::new(Semaphore::new(config.max_connections as usize)),
                idle: Mutex::new(VecDeque::with_capacity(config.max_connections as usize)),
                created: AtomicU32::new(0),
                sequence: AtomicU64::new(0),
                write_lock: AsyncMutex::new(()),
                stats: Mutex::new(PoolStats::default()),
                closed: AtomicBool::new(false),
                name,
                driver,
                config,
            }),
        }
    }

    /// Logical database name this pool serves.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Check out a connection, waiting up to the configured acquire deadline.
    ///
    /// Idle connections are handed out without validation; validation happens
    /// on the release path to keep the hot path cheap. At capacity the call
    /// waits for a release and fails with [`DbError::PoolTimeout`] once the
    /// deadline elapses - a transient condition the caller's own scheduling
    /// loop retries, never a hard failure of the underlying data.
    pub async fn acquire(&self) -> DbResult<PooledConnection<D>> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(DbError::PoolClosed);
        }

        let deadline = self.inner.config.acquire_timeout;
        let acquired = timeout(
            deadline,
            Arc::clone(&self.inner.semaphore).acquire_owned(),
        )
        .await;
        let permit = match acquired {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DbError::PoolClosed),
            Err(_) => {
                self.inner.stats.lock().unwrap().timeouts += 1;
                debug!(
                    pool = %self.inner.name,
                    timeout_secs = deadline.as_secs(),
                    "Acquire deadline elapsed"
                );
                return Err(DbError::pool_timeout(deadline.as_secs()));
            }
        };

        // The pool may have closed while we waited for admission.
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(DbError::PoolClosed);
        }

        let idle = self.inner.idle.lock().unwrap().pop_front();
        let (conn, reused) = match idle {
            Some(conn) => (conn, true),
            None => (self.open_connection().await?, false),
        };

        {
            let mut stats = self.inner.stats.lock().unwrap();
            if reused {
                stats.reused += 1;
            }
            stats.current_concurrent_operations += 1;
            if stats.current_concurrent_operations > stats.max_observed_concurrent_operations {
                stats.max_observed_concurrent_operations = stats.current_concurrent_operations;
            }
        }
        debug!(
            pool = %self.inner.name,
            sequence = conn.sequence,
            reused,
            "Checked out connection"
        );

        Ok(PooledConnection::new(conn, permit, Arc::clone(&self.inner)))
    }

    /// Return a checkout to the pool.
    ///
    /// An unhealthy connection (the caller observed a failure, the caller
    /// invalidated it, or the liveness probe fails) is discarded; the next
    /// acquire lazily creates a replacement up to the capacity cap. The
    /// admission permit is only released after the connection is back in the
    /// idle queue, so a waiter granted that permit finds it there.
    pub async fn release(&self, mut pooled: PooledConnection<D>, healthy: bool) {
        let Some(mut conn) = pooled.conn.take() else {
            return;
        };
        let permit = pooled.permit.take();
        drop(pooled);

        let mut keep =
            healthy && conn.valid && !self.inner.closed.load(Ordering::Acquire);
        if keep && !conn.handle.ping().await {
            warn!(
                pool = %self.inner.name,
                sequence = conn.sequence,
                "Liveness probe failed on release"
            );
            keep = false;
        }

        let mut to_discard = None;
        if keep {
            // Re-check under the idle lock: close() sets the flag before it
            // drains, so a connection queued here is always seen by the drain.
            let mut idle = self.inner.idle.lock().unwrap();
            if self.inner.closed.load(Ordering::Acquire) {
                to_discard = Some(conn);
            } else {
                idle.push_back(conn);
            }
        } else {
            to_discard = Some(conn);
        }
        if let Some(conn) = to_discard {
            self.discard(conn).await;
        }
        drop(permit);

        let mut stats = self.inner.stats.lock().unwrap();
        stats.current_concurrent_operations =
            stats.current_concurrent_operations.saturating_sub(1);
    }

    /// Hold the write mutex for the duration of the returned guard.
    ///
    /// Every mutating operation must run under it; reads must not, to keep
    /// the common read path concurrent. Callers already hold a connection
    /// (lock order Pool -> Connection -> WriteLock) and drop the guard before
    /// the connection is released.
    pub(crate) async fn write_guard(&self) -> MutexGuard<'_, ()> {
        self.inner.write_lock.lock().await
    }

    pub(crate) fn record_completed(&self) {
        self.inner.stats.lock().unwrap().completed_operations += 1;
    }

    pub(crate) fn record_failed(&self) {
        self.inner.stats.lock().unwrap().failed_operations += 1;
    }

    /// Read-only statistics snapshot.
    pub fn stats(&self) -> PoolStats {
        self.inner.stats.lock().unwrap().clone()
    }

    /// Number of currently existing connections (idle + checked out).
    pub fn created_connections(&self) -> u32 {
        self.inner.created.load(Ordering::Acquire)
    }

    /// Number of idle connections.
    pub fn idle_connections(&self) -> usize {
        self.inner.idle.lock().unwrap().len()
    }

    /// Whether the pool has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close the pool: fail waiters, drain and close idle connections.
    ///
    /// Terminal and idempotent. Connections still checked out are discarded
    /// when released.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.inner.semaphore.close();

        let drained: Vec<Connection<D::Conn>> =
            { self.inner.idle.lock().unwrap().drain(..).collect() };
        for conn in drained {
            let Connection {
                handle, sequence, ..
            } = conn;
            if let Err(e) = handle.close().await {
                warn!(
                    pool = %self.inner.name,
                    sequence,
                    error = %e,
                    "Error closing connection during pool shutdown"
                );
            }
            self.inner.created.fetch_sub(1, Ordering::AcqRel);
        }
        info!(pool = %self.inner.name, "Pool closed");
    }

    async fn open_connection(&self) -> DbResult<Connection<D::Conn>> {
        let mut handle = self
            .inner
            .driver
            .open(&self.inner.config.connection_string)
            .await?;
        if !handle.ping().await {
            let _ = handle.close().await;
            return Err(DbError::connection_invalid(
                "connection failed its liveness probe after open",
            ));
        }
        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.created.fetch_add(1, Ordering::AcqRel);
        self.inner.stats.lock().unwrap().created += 1;
        info!(pool = %self.inner.name, sequence, "Opened connection");
        Ok(Connection {
            handle,
            sequence,
            valid: true,
        })
    }

    async fn discard(&self, conn: Connection<D::Conn>) {
        let Connection {
            handle, sequence, ..
        } = conn;
        if let Err(e) = handle.close().await {
            warn!(
                pool = %self.inner.name,
                sequence,
                error = %e,
                "Error closing discarded connection"
            );
        }
        self.inner.created.fetch_sub(1, Ordering::AcqRel);
        self.inner.stats.lock().unwrap().evicted += 1;
        info!(pool = %self.inner.name, sequence, "Discarded connection");
    }
}

impl<D: Driver> std::fmt::Debug for Pool<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("max_connections", &self.inner.config.max_connections)
            .field("created", &self.created_connections())
            .field("idle", &self.idle_connections())
            .field("closed", &self.is_closed())
            .finish()
    }
}
