//! Process-wide pool registry.
//!
//! Multiple independent subsystems (report generators, task runners) target
//! the same handful of physical databases and must share admission control,
//! so each logical database gets exactly one pool per registry lifetime.
//! Construction is lazy but guarded by a single admission lock rather than
//! relying on import-time side effects.

use crate::config::PoolConfig;
use crate::db::access::Database;
use crate::db::driver::Driver;
use crate::db::pool::Pool;
use crate::db::sqlite::SqliteDriver;
use crate::error::DbResult;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::info;

/// Registry over the production SQLite driver.
pub type SqliteRegistry = PoolRegistry<SqliteDriver>;

/// Logical-database name -> shared pool.
pub struct PoolRegistry<D: Driver> {
    driver: D,
    pools: Mutex<HashMap<String, Database<D>>>,
}

impl<D: Driver> PoolRegistry<D> {
    /// Create an empty registry.
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Get the pool for `name`, constructing it on first request.
    ///
    /// The config closure runs only when the pool does not exist yet. Two
    /// concurrent calls for the same name return the identical instance.
    pub fn get_pool(
        &self,
        name: &str,
        config: impl FnOnce() -> PoolConfig,
    ) -> DbResult<Database<D>> {
        let mut pools = self.pools.lock().unwrap();
        if let Some(db) = pools.get(name) {
            return Ok(db.clone());
        }

        let config = config();
        config.validate()?;
        let db = Database::new(Pool::new(name, config, self.driver.clone()));
        pools.insert(name.to_string(), db.clone());
        info!(pool = %name, "Registered pool");
        Ok(db)
    }

    /// Close the pool for `name` and remove it. Idempotent; a later
    /// `get_pool` for the same name creates a fresh instance.
    pub async fn close_pool(&self, name: &str) {
        let removed = { self.pools.lock().unwrap().remove(name) };
        if let Some(db) = removed {
            db.pool().close().await;
            info!(pool = %name, "Closed and removed pool");
        }
    }

    /// Close every registered pool. Invoked by process shutdown code so
    /// native handles are guaranteed to be released.
    pub async fn close_all(&self) {
        let drained: Vec<(String, Database<D>)> =
            { self.pools.lock().unwrap().drain().collect() };
        for (name, db) in drained {
            db.pool().close().await;
            info!(pool = %name, "Closed pool");
        }
        info!("All pools closed");
    }

    /// Number of registered pools.
    pub fn pool_count(&self) -> usize {
        self.pools.lock().unwrap().len()
    }

    /// Check whether a pool exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.pools.lock().unwrap().contains_key(name)
    }
}

impl<D: Driver> std::fmt::Debug for PoolRegistry<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pool_count", &self.pool_count())
            .finish()
    }
}
