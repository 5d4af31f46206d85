//! `PostgreSQL` driver over an `sqlx` pool.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::encode::IsNull;
use sqlx::error::BoxDynError;
use sqlx::postgres::{
    PgArgumentBuffer, PgArguments, PgConnectOptions, PgConnection, PgPool, PgPoolOptions, PgRow,
    PgTypeInfo, Postgres,
};
use sqlx::types::{Decimal, Uuid};
use sqlx::{Row, TypeInfo, ValueRef};
use tracing::{debug, warn};
use vellum_core::dialect::PostgresDialect;
use vellum_core::{BoundCommand, DdlDialect, Value, Vendor};

use super::{
    native, unbindable, with_timeout, BatchError, DataCommandExecutor, DataReader,
    DataSourceLifecycle,
};
use crate::config::DbSettings;
use crate::error::Result;

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

static DIALECT: PostgresDialect = PostgresDialect::new();

/// A NULL sent without a type, so the server infers it from context.
#[derive(Debug, Clone, Copy)]
struct UntypedNull;

impl sqlx::Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(sqlx::postgres::types::Oid(0))
    }
}

impl sqlx::Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> std::result::Result<IsNull, BoxDynError> {
        Ok(IsNull::Yes)
    }
}

/// Driver for `PostgreSQL` databases.
#[derive(Debug, Clone)]
pub struct PostgresDriver {
    pool: PgPool,
    timeout: Duration,
}

impl PostgresDriver {
    /// Opens a pool for the settings' URL, tagging connections with the
    /// application name.
    ///
    /// # Errors
    ///
    /// Fails when the URL does not parse or the server is unreachable.
    pub async fn connect(settings: &DbSettings) -> Result<Self> {
        let options = PgConnectOptions::from_str(&settings.url)
            .map_err(native(Vendor::Postgres))?
            .application_name(&settings.app_name);
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.command_timeout())
            .connect_with(options)
            .await
            .map_err(native(Vendor::Postgres))?;
        Ok(Self::from_pool(pool, settings.command_timeout()))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool, timeout: Duration) -> Self {
        Self { pool, timeout }
    }

    /// The underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn run(&self, conn: &mut PgConnection, command: &BoundCommand) -> Result<u64> {
        debug!(sql = %command.sql, params = command.params.len(), "executing");
        let query = bind_all(sqlx::query(&command.sql), &command.params)?;
        let done = with_timeout(Vendor::Postgres, self.timeout, query.execute(conn)).await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl DataReader for PostgresDriver {
    async fn fetch(&self, command: &BoundCommand) -> Result<Vec<Vec<Value>>> {
        debug!(sql = %command.sql, params = command.params.len(), "fetching");
        let query = bind_all(sqlx::query(&command.sql), &command.params)?;
        let rows = with_timeout(Vendor::Postgres, self.timeout, query.fetch_all(&self.pool)).await?;
        rows.iter()
            .map(|row| read_row(row).map_err(native(Vendor::Postgres)))
            .collect()
    }
}

#[async_trait]
impl DataCommandExecutor for PostgresDriver {
    async fn execute(&self, command: &BoundCommand) -> Result<u64> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(native(Vendor::Postgres))?;
        self.run(&mut conn, command).await
    }

    async fn execute_batch(
        &self,
        commands: &[BoundCommand],
        transactional: bool,
    ) -> std::result::Result<u64, BatchError> {
        let at_start = |source: sqlx::Error| BatchError {
            position: 0,
            source: native(Vendor::Postgres)(source),
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
                source: native(Vendor::Postgres)(e),
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
impl DataSourceLifecycle for PostgresDriver {
    fn vendor(&self) -> Vendor {
        Vendor::Postgres
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

fn bind_all<'q>(mut query: PgQuery<'q>, params: &[Value]) -> Result<PgQuery<'q>> {
    for value in params {
        query = match value {
            Value::Null => query.bind(UntypedNull),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Decimal(d) => match Decimal::from_str(d) {
                Ok(decimal) => query.bind(decimal),
                Err(_) => return Err(unbindable("postgres", value)),
            },
            Value::Text(s) => query.bind(s.clone()),
            Value::Blob(b) => query.bind(b.clone()),
            Value::Uuid(u) => query.bind(*u),
            Value::DateTime(dt) => query.bind(dt.naive_utc()),
            Value::Date(d) => query.bind(*d),
            Value::Time(t) => query.bind(*t),
            Value::List(_) => return Err(unbindable("postgres", value)),
        };
    }
    Ok(query)
}

/// Reads a row by wire type; unknown types are read as text.
fn read_row(row: &PgRow) -> std::result::Result<Vec<Value>, sqlx::Error> {
    (0..row.len())
        .map(|i| {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            let wire = raw.type_info().name().to_string();
            Ok(match wire.as_str() {
                "BOOL" => Value::Bool(row.try_get(i)?),
                "INT2" => Value::Int(i64::from(row.try_get::<i16, _>(i)?)),
                "INT4" => Value::Int(i64::from(row.try_get::<i32, _>(i)?)),
                "INT8" => Value::Int(row.try_get(i)?),
                "OID" => Value::Int(i64::from(row.try_get::<sqlx::postgres::types::Oid, _>(i)?.0)),
                "FLOAT4" => Value::Float(f64::from(row.try_get::<f32, _>(i)?)),
                "FLOAT8" => Value::Float(row.try_get(i)?),
                "NUMERIC" => Value::Decimal(row.try_get::<Decimal, _>(i)?.to_string()),
                "BYTEA" => Value::Blob(row.try_get(i)?),
                "UUID" => Value::Uuid(row.try_get::<Uuid, _>(i)?),
                "TIMESTAMPTZ" => Value::DateTime(row.try_get::<DateTime<Utc>, _>(i)?),
                "TIMESTAMP" => Value::DateTime(row.try_get::<NaiveDateTime, _>(i)?.and_utc()),
                "DATE" => Value::Date(row.try_get::<NaiveDate, _>(i)?),
                "TIME" => Value::Time(row.try_get::<NaiveTime, _>(i)?),
                _ => Value::Text(row.try_get(i)?),
            })
        })
        .collect()
}
