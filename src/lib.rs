//! reportdb
//!
//! Bounded connection pooling and transactional access for the embedded
//! databases behind a scheduled reporting suite. The underlying engine is a
//! single-process, file-based database that tolerates only a handful of
//! simultaneous connections and misbehaves under concurrent writes; this
//! crate owns admission control, connection health, write serialization, and
//! commit/rollback boundaries so business code never has to.

pub mod config;
pub mod db;
pub mod error;

pub use config::{DatabaseConfig, PoolConfig};
pub use db::{
    Database, DbValue, Driver, DriverConnection, Pool, PoolRegistry, PoolStats, PooledConnection,
    Row, SqliteDriver, SqliteRegistry, TransactionScope,
};
pub use error::{DbError, DbResult};
