//! SQLite driver implementation.
//!
//! Opens single `SqliteConnection` handles - never sqlx's own pool, since
//! admission control and write serialization are this crate's job. Values are
//! decoded by the column's declared type, falling back through the storage
//! classes when the declaration is absent (expression columns, `MAX(...)`).

use crate::db::driver::{Driver, DriverConnection};
use crate::db::value::{DbValue, Row};
use crate::error::{DbError, DbResult};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, Connection, Row as SqlxRow, TypeInfo};
use std::str::FromStr;
use tracing::debug;

/// Driver for file-based SQLite databases.
#[derive(Debug, Clone, Default)]
pub struct SqliteDriver;

#[async_trait]
impl Driver for SqliteDriver {
    type Conn = SqliteSession;

    async fn open(&self, connection_string: &str) -> DbResult<SqliteSession> {
        let options = SqliteConnectOptions::from_str(connection_string)
            .map_err(|e| {
                DbError::invalid_input(format!("Invalid SQLite connection string: {}", e))
            })?
            .create_if_missing(true);

        let inner = SqliteConnection::connect_with(&options).await?;
        debug!("Opened SQLite connection");
        Ok(SqliteSession { inner })
    }
}

/// One open SQLite handle.
#[derive(Debug)]
pub struct SqliteSession {
    inner: SqliteConnection,
}

#[async_trait]
impl DriverConnection for SqliteSession {
    async fn query(&mut self, sql: &str, params: &[DbValue]) -> DbResult<Vec<Row>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let rows = query.fetch_all(&mut self.inner).await?;
        Ok(rows.iter().map(decode_row).collect())
    }

    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> DbResult<u64> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_param(query, param);
        }
        let result = query.execute(&mut self.inner).await?;
        Ok(result.rows_affected())
    }

    async fn begin(&mut self) -> DbResult<()> {
        sqlx::query("BEGIN").execute(&mut self.inner).await?;
        Ok(())
    }

    async fn commit(&mut self) -> DbResult<()> {
        sqlx::query("COMMIT").execute(&mut self.inner).await?;
        Ok(())
    }

    async fn rollback(&mut self) -> DbResult<()> {
        sqlx::query("ROLLBACK").execute(&mut self.inner).await?;
        Ok(())
    }

    async fn ping(&mut self) -> bool {
        self.inner.ping().await.is_ok()
    }

    async fn close(self) -> DbResult<()> {
        self.inner.close().await?;
        Ok(())
    }
}

/// Bind one value to a SQLite query.
fn bind_param<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
    param: &'q DbValue,
) -> sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>> {
    match param {
        DbValue::Null => query.bind(None::<String>),
        DbValue::Integer(v) => query.bind(*v),
        DbValue::Float(v) => query.bind(*v),
        DbValue::DateTime(v) => query.bind(*v),
        DbValue::Text(v) => query.bind(v.as_str()),
    }
}

/// Decode one driver row into the unified row model.
fn decode_row(row: &SqliteRow) -> Row {
    let columns = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let type_name = col.type_info().name();
            (col.name().to_string(), decode_column(row, idx, type_name))
        })
        .collect();
    Row::new(columns)
}

fn decode_column(row: &SqliteRow, idx: usize, type_name: &str) -> DbValue {
    let upper = type_name.to_ascii_uppercase();

    if upper.contains("INT") || upper == "BOOLEAN" {
        return decode_integer(row, idx);
    }
    if upper.contains("DATE") || upper.contains("TIME") {
        return decode_datetime(row, idx);
    }
    if upper.contains("CHAR") || upper.contains("TEXT") || upper.contains("CLOB") {
        return decode_text(row, idx);
    }
    if upper.contains("REAL")
        || upper.contains("FLOA")
        || upper.contains("DOUB")
        || upper.contains("NUMERIC")
        || upper.contains("DECIMAL")
    {
        return decode_float(row, idx);
    }

    // No usable declaration: fall back through the storage classes.
    if let Ok(Some(v)) = row.try_get::<Option<i64>, _>(idx) {
        return DbValue::Integer(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<f64>, _>(idx) {
        return DbValue::Float(v);
    }
    if let Ok(Some(v)) = row.try_get::<Option<String>, _>(idx) {
        return DbValue::Text(v);
    }
    DbValue::Null
}

fn decode_integer(row: &SqliteRow, idx: usize) -> DbValue {
    row.try_get::<Option<i64>, _>(idx)
        .ok()
        .flatten()
        .map(DbValue::Integer)
        .unwrap_or(DbValue::Null)
}

fn decode_float(row: &SqliteRow, idx: usize) -> DbValue {
    row.try_get::<Option<f64>, _>(idx)
        .ok()
        .flatten()
        .map(DbValue::Float)
        .unwrap_or(DbValue::Null)
}

fn decode_text(row: &SqliteRow, idx: usize) -> DbValue {
    row.try_get::<Option<String>, _>(idx)
        .ok()
        .flatten()
        .map(DbValue::Text)
        .unwrap_or(DbValue::Null)
}

fn decode_datetime(row: &SqliteRow, idx: usize) -> DbValue {
    if let Ok(Some(v)) = row.try_get::<Option<NaiveDateTime>, _>(idx) {
        return DbValue::DateTime(v);
    }
    // Malformed legacy date text stays readable rather than vanishing
    decode_text(row, idx)
}
