//! Database drivers.
//!
//! A driver executes bound commands and reports what its vendor can do.
//! Capabilities are split into three traits, [`DataReader`],
//! [`DataCommandExecutor`] and [`DataSourceLifecycle`], composed into
//! [`Driver`]. Native errors leave a driver already classified (see
//! [`crate::classify`]).

mod blocking;
mod postgres;
mod sqlite;

pub use blocking::BlockingDriver;
pub use postgres::PostgresDriver;
pub use sqlite::SqliteDriver;

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;
use vellum_core::{BoundCommand, DdlDialect, Features, Value, Vendor};

use crate::classify::{classify, ErrorKind};
use crate::config::DbSettings;
use crate::error::{DbError, Result};

/// A failed command inside a batch.
#[derive(Debug, thiserror::Error)]
#[error("Command #{position} of the batch failed: {source}")]
pub struct BatchError {
    /// Zero-based position of the failing command.
    pub position: usize,
    /// Why it failed.
    #[source]
    pub source: DbError,
}

/// Runs queries.
#[async_trait]
pub trait DataReader: Send + Sync {
    /// Runs a query and returns every row as raw values in select-list order.
    async fn fetch(&self, command: &BoundCommand) -> Result<Vec<Vec<Value>>>;

    /// Runs a query and returns the first column of the first row, or
    /// `Value::Null` when there is none.
    async fn fetch_scalar(&self, command: &BoundCommand) -> Result<Value> {
        let rows = self.fetch(command).await?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .unwrap_or(Value::Null))
    }
}

/// Runs non-queries.
#[async_trait]
pub trait DataCommandExecutor: Send + Sync {
    /// Runs one command and returns the affected row count.
    async fn execute(&self, command: &BoundCommand) -> Result<u64>;

    /// Runs commands in order on one connection, stopping at the first
    /// failure. With `transactional` the batch is committed only when every
    /// command succeeds; otherwise commands before the failure stay applied.
    async fn execute_batch(
        &self,
        commands: &[BoundCommand],
        transactional: bool,
    ) -> std::result::Result<u64, BatchError>;
}

/// Connection management and vendor description.
#[async_trait]
pub trait DataSourceLifecycle: Send + Sync {
    /// The vendor this driver talks to.
    fn vendor(&self) -> Vendor;

    /// The dialect commands must be rendered with.
    fn dialect(&self) -> &'static dyn DdlDialect;

    /// The vendor's capabilities.
    fn features(&self) -> Features {
        self.dialect().features()
    }

    /// Checks that a connection can be acquired and used.
    async fn ping(&self) -> Result<()>;

    /// Closes the pool; later calls fail with a connectivity error.
    async fn close(&self);
}

/// A complete driver.
pub trait Driver: DataReader + DataCommandExecutor + DataSourceLifecycle + Debug {}

impl<T> Driver for T where T: DataReader + DataCommandExecutor + DataSourceLifecycle + Debug {}

/// Connects to the database the settings describe.
///
/// # Errors
///
/// [`DbError::Config`] for vendors without a driver, a classified
/// [`DbError::DataAccess`] when the connection fails.
pub async fn connect(settings: &DbSettings) -> Result<Arc<dyn Driver>> {
    settings.validate()?;
    let vendor = settings.vendor()?;
    info!(vendor = %vendor, "connecting");
    match vendor {
        Vendor::Sqlite => Ok(Arc::new(SqliteDriver::connect(settings).await?)),
        Vendor::Postgres => Ok(Arc::new(PostgresDriver::connect(settings).await?)),
        Vendor::MsSql | Vendor::MySql => Err(DbError::Config(format!(
            "no driver for {vendor}; scripts can still be generated with `vellum plan --offline`"
        ))),
    }
}

/// Classifies a `sqlx` error for `vendor`.
pub(crate) fn native(vendor: Vendor) -> impl Fn(sqlx::Error) -> DbError {
    move |error| DbError::data_access(classify(vendor, &error), error)
}

/// Runs a driver future under the command timeout.
pub(crate) async fn with_timeout<T>(
    vendor: Vendor,
    timeout: Duration,
    future: impl Future<Output = std::result::Result<T, sqlx::Error>> + Send,
) -> Result<T> {
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result.map_err(native(vendor)),
        Err(elapsed) => Err(DbError::data_access(ErrorKind::Timeout, elapsed)),
    }
}

/// Error for a value the driver cannot bind.
pub(crate) fn unbindable(dialect: &'static str, value: &Value) -> DbError {
    DbError::from(vellum_core::SqlError::Unsupported {
        dialect,
        construct: format!("{} parameters", value.kind_name()),
    })
}
