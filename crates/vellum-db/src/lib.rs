//! # vellum-db
//!
//! Runs what `vellum-core` generates against live databases.
//!
//! This crate provides:
//! - Drivers for `SQLite` and `PostgreSQL` over `sqlx` pools, with blocking
//!   wrappers and classified errors
//! - Schema loaders that read a database's catalog into a [`DbModel`]
//! - An upgrade orchestrator that diffs the declared model against the live
//!   one, applies the scripts and keeps a version record
//! - [`DataSource`], which compiles and runs queries and commands against a
//!   declared model
//!
//! ## Upgrading a database
//!
//! ```rust,no_run
//! use vellum_core::model::{bigint, varchar, TableSpec};
//! use vellum_core::{Dialect, SystemClock};
//! use vellum_db::{connect, DbModel, DbSettings, Upgrader};
//!
//! # async fn run() -> vellum_db::Result<()> {
//! let settings = DbSettings::new("sqlite:library.db");
//! let driver = connect(&settings).await?;
//! let declared = DbModel::from_specs(
//!     driver.dialect().types(),
//!     &[TableSpec::new("books")
//!         .column(bigint("id").identity())
//!         .column(varchar("title", 200))
//!         .primary_key(&["id"])],
//! );
//!
//! let report = Upgrader::new(driver.as_ref(), &settings, &SystemClock)
//!     .upgrade(&declared)
//!     .await?;
//! println!("applied {} scripts", report.applied);
//! # Ok(())
//! # }
//! ```

pub mod classify;
pub mod config;
pub mod datasource;
pub mod driver;
pub mod error;
pub mod loader;
pub mod upgrade;
pub mod version;

pub use classify::ErrorKind;
pub use config::DbSettings;
pub use datasource::{Change, DataSource, Session};
pub use driver::{
    connect, BatchError, BlockingDriver, DataCommandExecutor, DataReader, DataSourceLifecycle,
    Driver,
};
pub use error::{DbError, Result};
pub use loader::load_schema;
pub use upgrade::{UpgradeEvent, UpgradeReport, Upgrader};
pub use vellum_core::DbModel;
pub use version::{VersionRecord, VersionStore, VERSION_TABLE};
