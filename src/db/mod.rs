//! Database access core.
//!
//! This module provides the concurrency machinery every other component
//! depends on:
//! - Bounded connection pooling with admission control and health probing
//! - Transactional scopes (commit on success, rollback on error)
//! - Process-wide write serialization for the fragile embedded engine
//! - The public query/command API
//! - The pool registry for shared logical databases

pub mod access;
pub mod connection;
pub mod driver;
pub mod pool;
pub mod registry;
pub mod scope;
pub mod sqlite;
pub mod value;

pub use access::Database;
pub use connection::PooledConnection;
pub use driver::{Driver, DriverConnection};
pub use pool::{Pool, PoolStats};
pub use registry::{PoolRegistry, SqliteRegistry};
pub use scope::TransactionScope;
pub use sqlite::{SqliteDriver, SqliteSession};
pub use value::{DbValue, Row};
