//! Live database connections.
//!
//! The executor talks to the database through [`Connection`]: one method
//! runs a statement, the other reads back the current schema so execute
//! directives can be gated on it.

use std::future::Future;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::Result;
use crate::schema::{ColumnSchema, DatabaseSchema, IndexSchema, TableSchema};

/// A database the executor can mutate and inspect.
///
/// Statements run in order but a pool may hand each one a different
/// session. Session state set by `pre_query` (pragmas, temp tables) only
/// reaches later statements on a single-connection pool or a
/// [`PoolConnection`].
pub trait Connection: Send {
    /// Executes one SQL statement.
    fn execute(&mut self, sql: &str) -> impl Future<Output = Result<()>> + Send;

    /// Reads the current schema.
    fn inspect(&mut self) -> impl Future<Output = Result<DatabaseSchema>> + Send;
}

impl Connection for SqlitePool {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing SQL");
        sqlx::query(sql).execute(&*self).await?;
        Ok(())
    }

    async fn inspect(&mut self) -> Result<DatabaseSchema> {
        let mut conn = self.acquire().await?;
        inspect_schema(&mut conn).await
    }
}

impl Connection for PoolConnection<Sqlite> {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        debug!(sql = %sql, "Executing SQL");
        sqlx::query(sql).execute(&mut **self).await?;
        Ok(())
    }

    async fn inspect(&mut self) -> Result<DatabaseSchema> {
        inspect_schema(self).await
    }
}

async fn inspect_schema(conn: &mut SqliteConnection) -> Result<DatabaseSchema> {
    let names: Vec<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master \
         WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut schema = DatabaseSchema::new();
    for (name,) in names {
        let table = inspect_table(conn, &name).await?;
        schema = schema.table(table);
    }
    Ok(schema)
}

async fn inspect_table(conn: &mut SqliteConnection, name: &str) -> Result<TableSchema> {
    let mut table = TableSchema::new(name);

    let columns: Vec<(String, String, i64, Option<String>, i64)> = sqlx::query_as(
        "SELECT name, type, \"notnull\", dflt_value, pk \
         FROM pragma_table_info(?) ORDER BY cid",
    )
    .bind(name)
    .fetch_all(&mut *conn)
    .await?;

    for (column_name, declared_type, not_null, default, pk) in columns {
        let mut column = ColumnSchema::new(column_name, declared_type);
        if not_null != 0 {
            column = column.not_null();
        }
        if let Some(expr) = default {
            column = column.default(expr);
        }
        if pk != 0 {
            column = column.primary_key();
        }
        table = table.column(column);
    }

    // Only explicitly created indexes; skip autoindexes for UNIQUE/PK.
    let indexes: Vec<(String, i64)> = sqlx::query_as(
        "SELECT name, \"unique\" FROM pragma_index_list(?) \
         WHERE origin = 'c' ORDER BY name",
    )
    .bind(name)
    .fetch_all(&mut *conn)
    .await?;

    for (index_name, unique) in indexes {
        let columns: Vec<(Option<String>,)> =
            sqlx::query_as("SELECT name FROM pragma_index_info(?) ORDER BY seqno")
                .bind(&index_name)
                .fetch_all(&mut *conn)
                .await?;

        table = table.index(IndexSchema {
            name: index_name,
            columns: columns.into_iter().filter_map(|(c,)| c).collect(),
            unique: unique != 0,
        });
    }

    Ok(table)
}
