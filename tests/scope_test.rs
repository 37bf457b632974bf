//! Transactional scope properties: commit/rollback boundaries, cleanup on
//! every exit path, and write serialization.

mod common;

use common::ScriptedDriver;
use futures_util::FutureExt;
use reportdb::{Database, DbError, DbValue, Pool, PoolConfig, TransactionScope};
use std::sync::atomic::Ordering;
use std::time::Duration;

fn scripted_pool(driver: &ScriptedDriver, max: u32) -> Pool<ScriptedDriver> {
    Pool::new(
        "test",
        PoolConfig::new("scripted:mem")
            .max_connections(max)
            .acquire_timeout(Duration::from_secs(5)),
        driver.clone(),
    )
}

#[tokio::test]
async fn successful_operation_commits_and_requeues() {
    let driver = ScriptedDriver::new();
    let pool = scripted_pool(&driver, 2);

    let result = TransactionScope::read(&pool)
        .run(|_conn| async move { Ok(7) }.boxed())
        .await
        .unwrap();
    assert_eq!(result, 7);

    let state = driver.state();
    assert_eq!(state.begins.load(Ordering::SeqCst), 1);
    assert_eq!(state.commits.load(Ordering::SeqCst), 1);
    assert_eq!(state.rollbacks.load(Ordering::SeqCst), 0);

    let stats = pool.stats();
    assert_eq!(stats.completed_operations, 1);
    assert_eq!(stats.failed_operations, 0);
    assert_eq!(pool.idle_connections(), 1);
    assert_eq!(pool.created_connections(), 1);
}

#[tokio::test]
async fn failed_operation_rolls_back_exactly_once_and_never_leaks() {
    let driver = ScriptedDriver::new();
    let pool = scripted_pool(&driver, 2);

    let result: Result<(), DbError> = TransactionScope::read(&pool)
        .run(|_conn| async move { Err(DbError::query("report query exploded")) }.boxed())
        .await;

    let err = result.unwrap_err();
    assert!(err.to_string().contains("report query exploded"));

    let state = driver.state();
    assert_eq!(state.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(state.commits.load(Ordering::SeqCst), 0);

    // Rollback succeeded, so the connection survives and is back in the pool.
    let stats = pool.stats();
    assert_eq!(stats.failed_operations, 1);
    assert_eq!(stats.completed_operations, 0);
    assert_eq!(pool.idle_connections(), 1);
    assert_eq!(pool.created_connections(), 1);
}

#[tokio::test]
async fn commit_failure_rolls_back_and_discards_connection() {
    let driver = ScriptedDriver::new();
    let pool = scripted_pool(&driver, 2);
    driver.state().fail_commits.store(true, Ordering::SeqCst);

    let result: Result<(), DbError> = TransactionScope::write(&pool)
        .run(|_conn| async move { Ok(()) }.boxed())
        .await;

    assert!(matches!(result, Err(DbError::CommitFailed { .. })));
    assert_eq!(driver.state().rollbacks.load(Ordering::SeqCst), 1);

    // Transaction state was unknown: the connection must not be reused.
    assert_eq!(pool.idle_connections(), 0);
    assert_eq!(pool.created_connections(), 0);
    assert_eq!(pool.stats().failed_operations, 1);
    assert_eq!(pool.stats().evicted, 1);
}

#[tokio::test]
async fn rollback_failure_discards_connection_and_keeps_original_error() {
    let driver = ScriptedDriver::new();
    let pool = scripted_pool(&driver, 2);
    driver.state().fail_rollbacks.store(true, Ordering::SeqCst);

    let result: Result<(), DbError> = TransactionScope::read(&pool)
        .run(|_conn| async move { Err(DbError::query("original failure")) }.boxed())
        .await;

    let err = result.unwrap_err();
    assert!(
        err.to_string().contains("original failure"),
        "rollback failure must not replace the caller's error"
    );
    assert_eq!(pool.idle_connections(), 0);
    assert_eq!(pool.created_connections(), 0);
    assert_eq!(pool.stats().evicted, 1);
}

#[tokio::test]
async fn begin_failure_surfaces_and_discards() {
    let driver = ScriptedDriver::new();
    let pool = scripted_pool(&driver, 2);
    driver.state().fail_begins.store(true, Ordering::SeqCst);

    let result: Result<(), DbError> = TransactionScope::read(&pool)
        .run(|_conn| async move { Ok(()) }.boxed())
        .await;

    assert!(result.is_err());
    assert_eq!(pool.created_connections(), 0);
    assert_eq!(pool.stats().failed_operations, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_writers_never_overlap_in_the_engine() {
    let driver = ScriptedDriver::new();
    let db = Database::new(scripted_pool(&driver, 2));

    let mut handles = Vec::new();
    for i in 0..4 {
        let db = db.clone();
        handles.push(tokio::spawn(async move {
            db.update_record(
                "email_queue",
                &[("status", DbValue::Integer(i))],
                "id = ?",
                &[DbValue::Integer(i)],
            )
            .await
            .unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(
        driver.state().max_overlapping_writes.load(Ordering::SeqCst),
        1,
        "two native write calls overlapped in time"
    );
    assert_eq!(db.stats().completed_operations, 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_connection_pool_serializes_two_writers() {
    let driver = ScriptedDriver::new();
    let db = Database::new(scripted_pool(&driver, 1));

    let first = {
        let db = db.clone();
        tokio::spawn(async move { db.execute("UPDATE t SET x = 1", &[]).await })
    };
    let second = {
        let db = db.clone();
        tokio::spawn(async move { db.execute("UPDATE t SET x = 1", &[]).await })
    };

    assert_eq!(first.await.unwrap().unwrap(), 1);
    assert_eq!(second.await.unwrap().unwrap(), 1);

    let stats = db.stats();
    assert_eq!(stats.completed_operations, 2);
    assert_eq!(stats.failed_operations, 0);
    assert_eq!(
        driver.state().max_overlapping_writes.load(Ordering::SeqCst),
        1
    );
    assert_eq!(driver.state().opened.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bookkeeping_reconciles_after_mixed_outcomes() {
    let driver = ScriptedDriver::new();
    let pool = scripted_pool(&driver, 2);

    let mut handles = Vec::new();
    for i in 0..12 {
        let pool = pool.clone();
        handles.push(tokio::spawn(async move {
            let scope = TransactionScope::read(&pool);
            let _ = scope
                .run(move |_conn| {
                    async move {
                        if i % 3 == 0 {
                            Err(DbError::query("scripted"))
                        } else {
                            Ok(())
                        }
                    }
                    .boxed()
                })
                .await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Nothing is checked out: idle count must reconcile with created.
    let stats = pool.stats();
    assert_eq!(stats.current_concurrent_operations, 0);
    assert_eq!(pool.idle_connections() as u32, pool.created_connections());
    assert_eq!(stats.completed_operations + stats.failed_operations, 12);
}
