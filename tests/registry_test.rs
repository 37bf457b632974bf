//! Registry lifecycle: one pool per logical database, idempotent close,
//! fresh instance after close.

mod common;

use common::ScriptedDriver;
use reportdb::{DbError, PoolConfig, PoolRegistry};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn small_config() -> PoolConfig {
    PoolConfig::new("scripted:mem")
        .max_connections(1)
        .acquire_timeout(Duration::from_millis(100))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_get_pool_returns_one_instance() {
    let registry = Arc::new(PoolRegistry::new(ScriptedDriver::new()));
    let factory_calls = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let registry = Arc::clone(&registry);
        let factory_calls = Arc::clone(&factory_calls);
        handles.push(tokio::spawn(async move {
            registry
                .get_pool("reports", || {
                    factory_calls.fetch_add(1, Ordering::SeqCst);
                    small_config()
                })
                .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(registry.pool_count(), 1);
    assert_eq!(factory_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn pools_fetched_by_name_share_admission_control() {
    let registry = PoolRegistry::new(ScriptedDriver::new());

    let first = registry.get_pool("reports", small_config).unwrap();
    let second = registry.get_pool("reports", small_config).unwrap();

    // With capacity 1 shared between both handles, holding a connection
    // through one must starve an acquire through the other.
    let held = first.pool().acquire().await.unwrap();
    let result = second.pool().acquire().await;
    assert!(matches!(result, Err(DbError::PoolTimeout { .. })));
    first.pool().release(held, true).await;
}

#[tokio::test]
async fn distinct_names_get_distinct_pools() {
    let registry = PoolRegistry::new(ScriptedDriver::new());

    let reports = registry.get_pool("reports", small_config).unwrap();
    let newsletter = registry.get_pool("newsletter", small_config).unwrap();
    assert_eq!(registry.pool_count(), 2);

    // Capacity is per pool: holding one database's connection does not
    // starve the other.
    let held = reports.pool().acquire().await.unwrap();
    let other = newsletter.pool().acquire().await.unwrap();
    newsletter.pool().release(other, true).await;
    reports.pool().release(held, true).await;
}

#[tokio::test]
async fn close_pool_is_idempotent_and_terminal() {
    let registry = PoolRegistry::new(ScriptedDriver::new());

    let db = registry.get_pool("reports", small_config).unwrap();
    let conn = db.pool().acquire().await.unwrap();
    db.pool().release(conn, true).await;

    registry.close_pool("reports").await;
    registry.close_pool("reports").await;
    registry.close_pool("never_existed").await;

    assert_eq!(registry.pool_count(), 0);
    assert!(db.pool().is_closed());
    assert!(matches!(
        db.pool().acquire().await,
        Err(DbError::PoolClosed)
    ));
}

#[tokio::test]
async fn get_pool_after_close_creates_fresh_instance() {
    let driver = ScriptedDriver::new();
    let registry = PoolRegistry::new(driver.clone());

    let old = registry.get_pool("reports", small_config).unwrap();
    registry.close_pool("reports").await;

    let fresh = registry.get_pool("reports", small_config).unwrap();
    assert!(old.pool().is_closed());
    assert!(!fresh.pool().is_closed());

    let conn = fresh.pool().acquire().await.unwrap();
    fresh.pool().release(conn, true).await;
    assert_eq!(driver.state().opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn close_all_drains_every_pool() {
    let driver = ScriptedDriver::new();
    let registry = PoolRegistry::new(driver.clone());

    let reports = registry.get_pool("reports", small_config).unwrap();
    let newsletter = registry.get_pool("newsletter", small_config).unwrap();

    let conn = reports.pool().acquire().await.unwrap();
    reports.pool().release(conn, true).await;
    let conn = newsletter.pool().acquire().await.unwrap();
    newsletter.pool().release(conn, true).await;

    registry.close_all().await;

    assert_eq!(registry.pool_count(), 0);
    assert!(reports.pool().is_closed());
    assert!(newsletter.pool().is_closed());
    assert_eq!(driver.state().closed.load(Ordering::SeqCst), 2);
}
