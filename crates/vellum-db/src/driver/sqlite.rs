//! `SQLite` driver over an `sqlx` pool.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection, TypeInfo, ValueRef};
use tracing::{debug, warn};
use vellum_core::dialect::SqliteDialect;
use vellum_core::{BoundCommand, DdlDialect, Value, Vendor};

use super::{
    native, unbindable, with_timeout, BatchError, DataCommandExecutor, DataReader,
    DataSourceLifecycle,
};
use crate::config::DbSettings;
use crate::error::Result;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

static DIALECT: SqliteDialect = SqliteDialect::new();

/// Driver for `SQLite` databases.
#[derive(Debug, Clone)]
pub struct SqliteDriver {
    pool: SqlitePool,
    timeout: Duration,
}

impl SqliteDriver {
    /// Opens a pool for the settings' URL, creating the file if missing.
    /// In-memory databases get a single connection so every command sees
    /// the same database.
    ///
    /// # Errors
    ///
    /// Fails when the URL does not parse or the database cannot be opened.
    pub async fn connect(settings: &DbSettings) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&settings.url)
            .map_err(native(Vendor::Sqlite))?
            .create_if_missing(true)
            .foreign_keys(true);
        let max_connections = if settings.url.contains(":memory:") {
            1
        } else {
            settings.max_connections
        };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(settings.command_timeout())
            .connect_with(options)
            .await
            .map_err(native(Vendor::Sqlite))?;
        Ok(Self::from_pool(pool, settings.command_timeout()))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: SqlitePool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run(&self, conn: &mut SqliteConnection, command: &BoundCommand) -> Result<u64> {
        debug!(sql = %command.sql, params = command.params.len(), "executing");
        let query = bind_all(sqlx::query(&command.sql), &command.params)?;
        let done = with_timeout(Vendor::Sqlite, self.timeout, query.execute(conn)).await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl DataReader for SqliteDriver {
    async fn fetch(&self, command: &BoundCommand) -> Result<Vec<Vec<Value>>> {
        debug!(sql = %command.sql, params = command.params.len(), "fetching");
        let query = bind_all(sqlx::query(&command.sql), &command.params)?;
        let rows = with_timeout(Vendor::Sqlite, self.timeout, query.fetch_all(&self.pool)).await?;
        rows.iter()
            .map(|row| read_row(row).map_err(native(Vendor::Sqlite)))
            .collect()
    }
}

#[async_trait]
impl DataCommandExecutor for SqliteDriver {
    async fn execute(&self, command: &BoundCommand) -> Result<u64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(native(Vendor::Sqlite))?;
        self.run(&mut conn, command).await
    }

    async fn execute_batch(
        &self,
        commands: &[BoundCommand],
        transactional: bool,
    ) -> std::result::Result<u64, BatchError> {
        let at_start = |source: sqlx::Error| BatchError {
            position: 0,
            source: native(Vendor::Sqlite)(source),
        };
        let mut total = 0;
        if transactional {
            let mut tx = self.pool.begin().await.map_err(at_start)?;
            for (position, command) in commands.iter().enumerate() {
                match self.run(&mut tx, command).await {
                    Ok(affected) => total += affected,
                    Err(source) => {
                        if let Err(e) = tx.rollback().await {
                            warn!(error = %e, "rollback failed");
                        }
                        return Err(BatchError { position, source });
                    }
                }
            }
            tx.commit().await.map_err(|e| BatchError {
                position: commands.len(),
                source: native(Vendor::Sqlite)(e),
            })?;
        } else {
            let mut conn = self.pool.acquire().await.map_err(at_start)?;
            for (position, command) in commands.iter().enumerate() {
                total += self
                    .run(&mut conn, command)
                    .await
                    .map_err(|source| BatchError { position, source })?;
            }
        }
        Ok(total)
    }
}

#[async_trait]
impl DataSourceLifecycle for SqliteDriver {
    fn vendor(&self) -> Vendor {
        Vendor::Sqlite
    }

    fn dialect(&self) -> &'static dyn DdlDialect {
        &DIALECT
    }

    async fn ping(&self) -> Result<()> {
        self.fetch_scalar(&BoundCommand::raw("SELECT 1")).await.map(|_| ())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

fn bind_all<'q>(mut query: SqliteQuery<'q>, params: &[Value]) -> Result<SqliteQuery<'q>> {
    for value in params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Decimal(d) | Value::Text(d) => query.bind(d.clone()),
            Value::Blob(b) => query.bind(b.clone()),
            Value::Uuid(u) => query.bind(u.to_string()),
            Value::DateTime(dt) => query.bind(dt.format("%Y-%m-%d %H:%M:%S%.f").to_string()),
            Value::Date(d) => query.bind(d.format("%Y-%m-%d").to_string()),
            Value::Time(t) => query.bind(t.format("%H:%M:%S%.f").to_string()),
            Value::List(_) => return Err(unbindable("sqlite", value)),
        };
    }
    Ok(query)
}

/// Reads a row by storage class; the row reader coerces values to host types.
fn read_row(row: &SqliteRow) -> std::result::Result<Vec<Value>, sqlx::Error> {
    (0..row.len())
        .map(|i| {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            let storage = raw.type_info().name().to_ascii_uppercase();
            Ok(match storage.as_str() {
                "INTEGER" | "INT" | "BIGINT" | "BOOLEAN" => Value::Int(row.try_get(i)?),
                "REAL" | "FLOAT" | "DOUBLE" => Value::Float(row.try_get(i)?),
                "BLOB" => Value::Blob(row.try_get(i)?),
                _ => Value::Text(row.try_get(i)?),
            })
        })
        .collect()
}
