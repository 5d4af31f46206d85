//! Blocking access for callers outside an async runtime.

use std::sync::Arc;

use tokio::runtime::{Builder, Runtime};
use vellum_core::{BoundCommand, Value};

use super::{connect, BatchError, Driver};
use crate::config::DbSettings;
use crate::error::Result;

/// Runs driver calls to completion on a private current-thread runtime.
///
/// Must not be used from inside another Tokio runtime.
#[derive(Debug)]
pub struct BlockingDriver {
    runtime: Runtime,
    driver: Arc<dyn Driver>,
}

impl BlockingDriver {
    /// Connects with a fresh runtime.
    ///
    /// # Errors
    ///
    /// Fails when the runtime cannot start or the connection fails.
    pub fn connect(settings: &DbSettings) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let driver = runtime.block_on(connect(settings))?;
        Ok(Self { runtime, driver })
    }

    /// Wraps an existing driver.
    ///
    /// # Errors
    ///
    /// Fails when the runtime cannot start.
    pub fn new(driver: Arc<dyn Driver>) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self { runtime, driver })
    }

    /// The wrapped driver.
    #[must_use]
    pub const fn driver(&self) -> &Arc<dyn Driver> {
        &self.driver
    }

    /// See [`super::DataReader::fetch`].
    ///
    /// # Errors
    ///
    /// Propagates the driver error.
    pub fn fetch(&self, command: &BoundCommand) -> Result<Vec<Vec<Value>>> {
        self.runtime.block_on(self.driver.fetch(command))
    }

    /// See [`super::DataReader::fetch_scalar`].
    ///
    /// # Errors
    ///
    /// Propagates the driver error.
    pub fn fetch_scalar(&self, command: &BoundCommand) -> Result<Value> {
        self.runtime.block_on(self.driver.fetch_scalar(command))
    }

    /// See [`super::DataCommandExecutor::execute`].
    ///
    /// # Errors
    ///
    /// Propagates the driver error.
    pub fn execute(&self, command: &BoundCommand) -> Result<u64> {
        self.runtime.block_on(self.driver.execute(command))
    }

    /// See [`super::DataCommandExecutor::execute_batch`].
    ///
    /// # Errors
    ///
    /// The failing command's position and error.
    pub fn execute_batch(
        &self,
        commands: &[BoundCommand],
        transactional: bool,
    ) -> std::result::Result<u64, BatchError> {
        self.runtime
            .block_on(self.driver.execute_batch(commands, transactional))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocking_round_trip() {
        let driver = BlockingDriver::connect(&DbSettings::new("sqlite::memory:")).unwrap();
        driver
            .execute(&BoundCommand::raw("CREATE TABLE t (id INTEGER)"))
            .unwrap();
        let inserted = driver
            .execute(&BoundCommand {
                sql: String::from("INSERT INTO t (id) VALUES (?), (?)"),
                params: vec![Value::Int(1), Value::Int(2)],
            })
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(
            driver
                .fetch_scalar(&BoundCommand::raw("SELECT SUM(id) FROM t"))
                .unwrap(),
            Value::Int(3)
        );
    }
}
