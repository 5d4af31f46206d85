//! Schema version record.
//!
//! One row per application in the `vellum_schema_version` table tracks the
//! version the database was last upgraded to, the versions of the modules
//! that contributed to the declared model, and whether the last upgrade
//! failed. The table is created on first use and is never part of a loaded
//! model.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use semver::Version;
use serde::Serialize;
use tracing::{debug, info};
use vellum_core::{BoundCommand, Clock, Value, Vendor};

use crate::driver::Driver;
use crate::error::{DbError, Result};
use crate::loader::CatalogValues;

/// Name of the version record table.
pub const VERSION_TABLE: &str = "vellum_schema_version";

const CREATE_SQLITE: &str = r"
CREATE TABLE IF NOT EXISTS vellum_schema_version (
    app_name TEXT NOT NULL PRIMARY KEY,
    version TEXT NOT NULL,
    modules TEXT NOT NULL,
    last_modified TEXT NOT NULL,
    failed INTEGER NOT NULL DEFAULT 0,
    failure_message TEXT,
    failed_script TEXT
)
";

const CREATE_POSTGRES: &str = r"
CREATE TABLE IF NOT EXISTS vellum_schema_version (
    app_name VARCHAR(100) NOT NULL PRIMARY KEY,
    version VARCHAR(50) NOT NULL,
    modules TEXT NOT NULL,
    last_modified TIMESTAMP NOT NULL,
    failed BOOLEAN NOT NULL DEFAULT FALSE,
    failure_message TEXT,
    failed_script TEXT
)
";

const SELECT: &str = "SELECT app_name, version, modules, last_modified, failed, \
     failure_message, failed_script FROM vellum_schema_version WHERE app_name = ";

/// The stored state of one application's schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionRecord {
    /// Application name.
    pub app_name: String,
    /// Version the schema was last upgraded to.
    pub version: Version,
    /// Versions of the modules that declared the model.
    pub modules: BTreeMap<String, Version>,
    /// When the record was last written.
    pub last_modified: DateTime<Utc>,
    /// Whether the last upgrade failed.
    pub failed: bool,
    /// Error message of the failed upgrade.
    pub failure_message: Option<String>,
    /// The statement that failed.
    pub failed_script: Option<String>,
}

/// What the last upgrade did, as written to the record.
#[derive(Debug, Clone, Copy)]
pub enum Outcome<'a> {
    /// Every script was applied.
    Succeeded,
    /// A script failed.
    Failed {
        /// Error message.
        message: &'a str,
        /// The failing statement, if a statement failed.
        script: Option<&'a str>,
    },
}

/// Reads and writes the version record through a driver.
pub struct VersionStore<'a> {
    driver: &'a dyn Driver,
    clock: &'a dyn Clock,
}

impl<'a> VersionStore<'a> {
    /// Creates a store stamping records with `clock`.
    #[must_use]
    pub const fn new(driver: &'a dyn Driver, clock: &'a dyn Clock) -> Self {
        Self { driver, clock }
    }

    /// Creates the version table when missing.
    ///
    /// # Errors
    ///
    /// [`DbError::Config`] for vendors without a driver, or the driver error.
    pub async fn ensure_table(&self) -> Result<()> {
        let sql = match self.driver.vendor() {
            Vendor::Sqlite => CREATE_SQLITE,
            Vendor::Postgres => CREATE_POSTGRES,
            vendor @ (Vendor::MsSql | Vendor::MySql) => {
                return Err(DbError::Config(format!("no version table for {vendor}")))
            }
        };
        self.driver.execute(&BoundCommand::raw(sql)).await?;
        Ok(())
    }

    /// Reads the record of `app_name`, if one was written.
    ///
    /// # Errors
    ///
    /// Fails when the table is missing or holds malformed values.
    pub async fn read(&self, app_name: &str) -> Result<Option<VersionRecord>> {
        let command = BoundCommand {
            sql: format!("{SELECT}{}", self.driver.dialect().parameter_marker(1)),
            params: vec![Value::Text(app_name.to_string())],
        };
        let rows = self.driver.fetch(&command).await?;
        let Some(row) = rows.first() else {
            return Ok(None);
        };
        let values = CatalogValues::new(SELECT, row);
        let version = values.text(1)?;
        Ok(Some(VersionRecord {
            app_name: values.text(0)?,
            version: Version::parse(&version)
                .map_err(|e| DbError::Config(format!("stored version `{version}`: {e}")))?,
            modules: serde_json::from_str(&values.text(2)?)?,
            last_modified: timestamp(row.get(3))?,
            failed: values.flag(4)?,
            failure_message: values.opt_text(5)?,
            failed_script: values.opt_text(6)?,
        }))
    }

    /// Replaces the record of `app_name` in one transaction.
    ///
    /// # Errors
    ///
    /// Propagates the driver error.
    pub async fn write(
        &self,
        app_name: &str,
        version: &Version,
        modules: &BTreeMap<String, Version>,
        outcome: Outcome<'_>,
    ) -> Result<VersionRecord> {
        let (failed, message, script) = match outcome {
            Outcome::Succeeded => (false, None, None),
            Outcome::Failed { message, script } => (true, Some(message), script),
        };
        let record = VersionRecord {
            app_name: app_name.to_string(),
            version: version.clone(),
            modules: modules.clone(),
            last_modified: self.clock.now(),
            failed,
            failure_message: message.map(str::to_string),
            failed_script: script.map(str::to_string),
        };

        let dialect = self.driver.dialect();
        let markers: Vec<String> = (1..=7).map(|i| dialect.parameter_marker(i)).collect();
        let text = |s: Option<&String>| s.map_or(Value::Null, |s| Value::Text(s.clone()));
        let commands = [
            BoundCommand {
                sql: format!("DELETE FROM {VERSION_TABLE} WHERE app_name = {}", markers[0]),
                params: vec![Value::Text(record.app_name.clone())],
            },
            BoundCommand {
                sql: format!(
                    "INSERT INTO {VERSION_TABLE} (app_name, version, modules, last_modified, \
                     failed, failure_message, failed_script) VALUES ({})",
                    markers.join(", ")
                ),
                params: vec![
                    Value::Text(record.app_name.clone()),
                    Value::Text(record.version.to_string()),
                    Value::Text(serde_json::to_string(&record.modules)?),
                    Value::DateTime(record.last_modified),
                    Value::Bool(record.failed),
                    text(record.failure_message.as_ref()),
                    text(record.failed_script.as_ref()),
                ],
            },
        ];
        self.driver
            .execute_batch(&commands, true)
            .await
            .map_err(|e| e.source)?;

        if record.failed {
            info!(app = %record.app_name, version = %record.version, "recorded failed upgrade");
        } else {
            debug!(app = %record.app_name, version = %record.version, "recorded version");
        }
        Ok(record)
    }
}

/// Reads a stored timestamp, either native or as `SQLite` text.
fn timestamp(value: Option<&Value>) -> Result<DateTime<Utc>> {
    match value {
        Some(Value::DateTime(dt)) => Ok(*dt),
        Some(Value::Text(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f").map(|dt| dt.and_utc()))
            .map_err(|e| DbError::Config(format!("stored timestamp `{s}`: {e}"))),
        other => Err(DbError::Config(format!(
            "stored timestamp is {}",
            other.map_or_else(|| String::from("missing"), ToString::to_string)
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use sqlx::sqlite::SqlitePoolOptions;
    use vellum_core::FixedClock;

    use super::*;
    use crate::driver::SqliteDriver;

    async fn driver() -> SqliteDriver {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        SqliteDriver::from_pool(pool, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_missing_record_reads_none() {
        let driver = driver().await;
        let clock = FixedClock(Utc::now());
        let store = VersionStore::new(&driver, &clock);
        store.ensure_table().await.unwrap();
        store.ensure_table().await.unwrap();
        assert_eq!(store.read("library").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_replaces_record() {
        let driver = driver().await;
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let clock = FixedClock(at);
        let store = VersionStore::new(&driver, &clock);
        store.ensure_table().await.unwrap();

        let modules = BTreeMap::from([(String::from("loans"), Version::new(1, 2, 0))]);
        store
            .write(
                "library",
                &Version::new(1, 0, 0),
                &modules,
                Outcome::Failed {
                    message: "boom",
                    script: Some("ALTER TABLE books ADD x INTEGER"),
                },
            )
            .await
            .unwrap();
        let failed = store.read("library").await.unwrap().unwrap();
        assert!(failed.failed);
        assert_eq!(failed.failure_message.as_deref(), Some("boom"));
        assert_eq!(failed.failed_script.as_deref(), Some("ALTER TABLE books ADD x INTEGER"));
        assert_eq!(failed.last_modified, at);
        assert_eq!(failed.modules, modules);

        store
            .write("library", &Version::new(1, 1, 0), &modules, Outcome::Succeeded)
            .await
            .unwrap();
        let record = store.read("library").await.unwrap().unwrap();
        assert!(!record.failed);
        assert_eq!(record.version, Version::new(1, 1, 0));
        assert_eq!(record.failure_message, None);
    }

    #[test]
    fn test_timestamp_formats() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(timestamp(Some(&Value::DateTime(at))).unwrap(), at);
        assert_eq!(
            timestamp(Some(&Value::Text(String::from("2024-05-01 12:30:00")))).unwrap(),
            at
        );
        assert_eq!(
            timestamp(Some(&Value::Text(String::from("2024-05-01T12:30:00Z")))).unwrap(),
            at
        );
        assert!(timestamp(Some(&Value::Null)).is_err());
    }
}
