//! Public query/command API.
//!
//! [`Database`] is the only entry point business code uses: report
//! generators and task runners call these five operations and never see pool
//! internals. Reads run concurrently; every mutating operation goes through
//! a write scope and is therefore totally ordered process-wide.

use crate::db::driver::{Driver, DriverConnection};
use crate::db::pool::{Pool, PoolStats};
use crate::db::scope::TransactionScope;
use crate::db::value::{DbValue, Row};
use crate::error::{DbError, DbResult};
use futures_util::FutureExt;

/// Access layer for one logical database.
///
/// Cheap to clone; every clone shares the same pool.
#[derive(Debug)]
pub struct Database<D: Driver> {
    pool: Pool<D>,
}

impl<D: Driver> Clone for Database<D> {
    fn clone(&self) -> Self {
        Self {
            pool: self.pool.clone(),
        }
    }
}

impl<D: Driver> Database<D> {
    /// Wrap a pool in the access API.
    pub fn new(pool: Pool<D>) -> Self {
        Self { pool }
    }

    /// The underlying pool (lifecycle and introspection).
    pub fn pool(&self) -> &Pool<D> {
        &self.pool
    }

    /// Read-only statistics snapshot for logging/observability hooks.
    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Run a read-only query and return all rows as column/value records.
    pub async fn query(&self, sql: &str, params: &[DbValue]) -> DbResult<Vec<Row>> {
        let sql = sql.to_string();
        let params = params.to_vec();
        TransactionScope::read(&self.pool)
            .run(move |conn| async move { conn.query(&sql, &params).await }.boxed())
            .await
    }

    /// Run a mutating statement (INSERT, UPDATE, DELETE, DDL) and return the
    /// number of affected rows.
    pub async fn execute(&self, sql: &str, params: &[DbValue]) -> DbResult<u64> {
        let sql = sql.to_string();
        let params = params.to_vec();
        TransactionScope::write(&self.pool)
            .run(move |conn| async move { conn.execute(&sql, &params).await }.boxed())
            .await
    }

    /// Insert one record. Returns true when a row was inserted.
    pub async fn insert_record(&self, table: &str, fields: &[(&str, DbValue)]) -> DbResult<bool> {
        if fields.is_empty() {
            return Err(DbError::invalid_input("insert requires at least one field"));
        }
        validate_identifier(table)?;
        for (name, _) in fields {
            validate_identifier(name)?;
        }

        let columns: Vec<&str> = fields.iter().map(|(name, _)| *name).collect();
        let placeholders = vec!["?"; fields.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            placeholders
        );
        let values: Vec<DbValue> = fields.iter().map(|(_, value)| value.clone()).collect();

        let affected = self.execute(&sql, &values).await?;
        Ok(affected > 0)
    }

    /// Update records matching `where_clause` (a parameterized fragment such
    /// as `"id = ?"`). Returns true when at least one row changed. An empty
    /// clause updates every row.
    pub async fn update_record(
        &self,
        table: &str,
        fields: &[(&str, DbValue)],
        where_clause: &str,
        where_params: &[DbValue],
    ) -> DbResult<bool> {
        if fields.is_empty() {
            return Err(DbError::invalid_input("update requires at least one field"));
        }
        validate_identifier(table)?;
        for (name, _) in fields {
            validate_identifier(name)?;
        }

        let assignments: Vec<String> = fields
            .iter()
            .map(|(name, _)| format!("{} = ?", name))
            .collect();
        let sql = if where_clause.trim().is_empty() {
            format!("UPDATE {} SET {}", table, assignments.join(", "))
        } else {
            format!(
                "UPDATE {} SET {} WHERE {}",
                table,
                assignments.join(", "),
                where_clause
            )
        };

        let mut params: Vec<DbValue> = fields.iter().map(|(_, value)| value.clone()).collect();
        params.extend(where_params.iter().cloned());

        let affected = self.execute(&sql, &params).await?;
        Ok(affected > 0)
    }

    /// Largest value of `id_field` in `table`, or 0 when the table is empty.
    pub async fn max_id(&self, table: &str, id_field: &str) -> DbResult<i64> {
        validate_identifier(table)?;
        validate_identifier(id_field)?;

        let sql = format!("SELECT MAX({}) AS max_id FROM {}", id_field, table);
        let rows = self.query(&sql, &[]).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get("max_id"))
            .and_then(DbValue::as_i64)
            .unwrap_or(0))
    }
}

/// Reject table/column names that cannot be safely spliced into SQL.
/// Values always travel as bind parameters; only identifiers are spliced.
fn validate_identifier(name: &str) -> DbResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DbError::invalid_input(format!(
            "Invalid identifier: {:?}",
            name
        )))
    }
}
