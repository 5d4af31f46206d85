#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use vellum_core::model::{bigint, varchar, TableSpec};
use vellum_core::{BoundCommand, DbModel, Dialect, FixedClock, Value};
use vellum_db::{connect, DbSettings, Driver, Upgrader};

pub const URL: &str = "sqlite::memory:";

/// A fresh in-memory database.
pub async fn sqlite() -> Arc<dyn Driver> {
    connect(&DbSettings::new(URL))
        .await
        .unwrap_or_else(|e| panic!("Failed to open {URL}: {e}"))
}

pub fn settings() -> DbSettings {
    let mut settings = DbSettings::new(URL);
    settings.app_name = String::from("library");
    settings
}

pub fn clock() -> FixedClock {
    FixedClock(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
}

pub fn authors() -> TableSpec {
    TableSpec::new("authors")
        .column(bigint("id").identity())
        .column(varchar("name", 100).not_null())
        .primary_key(&["id"])
}

pub fn books() -> TableSpec {
    TableSpec::new("books")
        .column(bigint("id").identity())
        .column(varchar("isbn", 20))
        .column(varchar("title", 200))
        .column(bigint("author_id").references("authors", "id"))
        .primary_key(&["id"])
}

pub fn model(driver: &dyn Driver, specs: &[TableSpec]) -> DbModel {
    DbModel::from_specs(driver.dialect().types(), specs)
}

/// Upgrades `driver` to `declared`, panicking on failure.
pub async fn upgrade(driver: &dyn Driver, declared: &DbModel) -> usize {
    Upgrader::new(driver, &settings(), &clock())
        .upgrade(declared)
        .await
        .unwrap_or_else(|e| panic!("Upgrade failed: {e}"))
        .applied
}

pub async fn exec(driver: &dyn Driver, sql: &str) -> u64 {
    driver
        .execute(&BoundCommand::raw(sql))
        .await
        .unwrap_or_else(|e| panic!("Failed to execute: {sql}\nError: {e}"))
}

pub async fn scalar(driver: &dyn Driver, sql: &str) -> Value {
    driver
        .fetch_scalar(&BoundCommand::raw(sql))
        .await
        .unwrap_or_else(|e| panic!("Failed to query: {sql}\nError: {e}"))
}
