//! Shared scripted driver for exercising pool mechanics without a real
//! database engine. Failure injection flags let tests force probe, commit,
//! and rollback failures; write calls maintain an overlap counter so tests
//! can prove serialization.
#![allow(dead_code)]

use async_trait::async_trait;
use reportdb::{DbError, DbResult, DbValue, Driver, DriverConnection, Row};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct ScriptState {
    pub opened: AtomicU32,
    pub closed: AtomicU32,
    pub begins: AtomicU32,
    pub commits: AtomicU32,
    pub rollbacks: AtomicU32,
    /// One-shot: the next ping returns false.
    pub fail_next_ping: AtomicBool,
    pub fail_begins: AtomicBool,
    pub fail_commits: AtomicBool,
    pub fail_rollbacks: AtomicBool,
    pub fail_executes: AtomicBool,
    /// Write calls currently inside the engine.
    pub active_writes: AtomicU32,
    /// High-water mark of simultaneous write calls.
    pub max_overlapping_writes: AtomicU32,
    /// Canned result for query calls.
    pub rows: Mutex<Vec<Row>>,
}

#[derive(Clone, Default)]
pub struct ScriptedDriver {
    state: Arc<ScriptState>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ScriptState {
        &self.state
    }

    pub fn set_rows(&self, rows: Vec<Row>) {
        *self.state.rows.lock().unwrap() = rows;
    }
}

pub struct ScriptedConn {
    state: Arc<ScriptState>,
}

#[async_trait]
impl Driver for ScriptedDriver {
    type Conn = ScriptedConn;

    async fn open(&self, _connection_string: &str) -> DbResult<ScriptedConn> {
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedConn {
            state: Arc::clone(&self.state),
        })
    }
}

#[async_trait]
impl DriverConnection for ScriptedConn {
    async fn query(&mut self, _sql: &str, _params: &[DbValue]) -> DbResult<Vec<Row>> {
        Ok(self.state.rows.lock().unwrap().clone())
    }

    async fn execute(&mut self, _sql: &str, _params: &[DbValue]) -> DbResult<u64> {
        if self.state.fail_executes.load(Ordering::SeqCst) {
            return Err(DbError::query("scripted execute failure"));
        }
        let active = self.state.active_writes.fetch_add(1, Ordering::SeqCst) + 1;
        self.state
            .max_overlapping_writes
            .fetch_max(active, Ordering::SeqCst);
        // Keep the write "in the engine" long enough for overlap to show.
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.state.active_writes.fetch_sub(1, Ordering::SeqCst);
        Ok(1)
    }

    async fn begin(&mut self) -> DbResult<()> {
        if self.state.fail_begins.load(Ordering::SeqCst) {
            return Err(DbError::query("scripted begin failure"));
        }
        self.state.begins.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        if self.state.fail_commits.load(Ordering::SeqCst) {
            return Err(DbError::query("scripted commit failure"));
        }
        self.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        if self.state.fail_rollbacks.load(Ordering::SeqCst) {
            return Err(DbError::query("scripted rollback failure"));
        }
        self.state.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&mut self) -> bool {
        !self.state.fail_next_ping.swap(false, Ordering::SeqCst)
    }

    async fn close(self) -> DbResult<()> {
        self.state.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
