//! Integration tests for the upgrade orchestrator.
//!
//! Every test upgrades a fresh in-memory `SQLite` database, changes the
//! declared model and upgrades again, checking the live schema, the data
//! and the version record along the way.

mod common;

use std::fs;

use common::{authors, books, clock, exec, model, scalar, settings, sqlite, upgrade};
use pretty_assertions::assert_eq;
use semver::Version;
use vellum_core::model::{bigint, boolean, integer, text, varchar, TableSpec};
use vellum_core::upgrade::ScriptType;
use vellum_core::Value;
use vellum_db::upgrade::{read_model, write_scripts};
use vellum_db::{load_schema, DbError, Upgrader, VersionStore};

// =============================================================================
// Idempotence
// =============================================================================

#[tokio::test]
async fn loaded_schema_matches_the_declared_one() {
    let driver = sqlite().await;
    let declared = model(driver.as_ref(), &[authors(), books()]);
    assert!(upgrade(driver.as_ref(), &declared).await > 0);

    let loaded = load_schema(driver.as_ref(), &[]).await.unwrap();
    let names: Vec<&str> = loaded.tables.keys().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["authors", "books"]);

    let diff = Upgrader::new(driver.as_ref(), &settings(), &clock())
        .plan(&declared)
        .await
        .unwrap();
    assert!(diff.is_empty(), "{:?}", diff.scripts());
    assert_eq!(upgrade(driver.as_ref(), &declared).await, 0);
}

#[tokio::test]
async fn computed_columns_survive_a_second_upgrade() {
    let driver = sqlite().await;
    let v1 = model(
        driver.as_ref(),
        &[TableSpec::new("books")
            .column(bigint("id").identity())
            .column(text("notes"))
            .primary_key(&["id"])],
    );
    upgrade(driver.as_ref(), &v1).await;
    exec(driver.as_ref(), "INSERT INTO books (id, notes) VALUES (1, 'twelve chars')").await;

    let v2 = model(
        driver.as_ref(),
        &[TableSpec::new("books")
            .column(bigint("id").identity())
            .column(text("notes"))
            .column(integer("pages").computed("length(notes)"))
            .primary_key(&["id"])],
    );
    assert_eq!(upgrade(driver.as_ref(), &v2).await, 1);

    let loaded = load_schema(driver.as_ref(), &[]).await.unwrap();
    let pages = loaded.table("books").unwrap().column("pages").unwrap();
    assert_eq!(pages.computed.as_deref(), Some("length(notes)"));

    let diff = Upgrader::new(driver.as_ref(), &settings(), &clock())
        .plan(&v2)
        .await
        .unwrap();
    assert!(diff.is_empty(), "{:?}", diff.scripts());
    assert_eq!(upgrade(driver.as_ref(), &v2).await, 0);
    assert_eq!(
        scalar(driver.as_ref(), "SELECT pages FROM books WHERE id = 1").await,
        Value::Int(12)
    );
}

#[tokio::test]
async fn upgrade_writes_the_version_record() {
    let driver = sqlite().await;
    let declared = model(driver.as_ref(), &[authors()]);
    let mut settings = settings();
    settings.app_version = Version::new(2, 1, 0);
    settings
        .modules
        .insert(String::from("catalog"), Version::new(0, 3, 0));

    let report = Upgrader::new(driver.as_ref(), &settings, &clock())
        .upgrade(&declared)
        .await
        .unwrap();
    assert_eq!(report.record.version, Version::new(2, 1, 0));

    let clock = clock();
    let stored = VersionStore::new(driver.as_ref(), &clock)
        .read("library")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored, report.record);
    assert_eq!(stored.modules["catalog"], Version::new(0, 3, 0));
}

// =============================================================================
// Column additions on populated tables
// =============================================================================

#[tokio::test]
async fn not_null_column_is_added_to_populated_table() {
    let driver = sqlite().await;
    upgrade(driver.as_ref(), &model(driver.as_ref(), &[authors(), books()])).await;
    exec(driver.as_ref(), "INSERT INTO authors (id, name) VALUES (1, 'Klabnik')").await;
    exec(
        driver.as_ref(),
        "INSERT INTO books (id, isbn, title, author_id) VALUES (1, '978-1', 'Rust', 1), (2, '978-2', 'More Rust', 1)",
    )
    .await;

    let v2 = model(
        driver.as_ref(),
        &[
            authors(),
            books().column(boolean("in_print").not_null().default_expr("1")),
        ],
    );
    let diff = Upgrader::new(driver.as_ref(), &settings(), &clock())
        .plan(&v2)
        .await
        .unwrap();
    assert_eq!(diff.changes.len(), 1);
    assert_eq!(diff.changes[0].steps(), 3);

    upgrade(driver.as_ref(), &v2).await;
    assert_eq!(
        scalar(driver.as_ref(), "SELECT COUNT(*) FROM books WHERE in_print = 1").await,
        Value::Int(2)
    );
    assert_eq!(
        scalar(driver.as_ref(), "SELECT title FROM books WHERE id = 2").await,
        Value::Text(String::from("More Rust"))
    );
    assert_eq!(upgrade(driver.as_ref(), &v2).await, 0);
}

#[tokio::test]
async fn dropped_tables_go_children_first() {
    let driver = sqlite().await;
    upgrade(driver.as_ref(), &model(driver.as_ref(), &[authors(), books()])).await;

    let diff = Upgrader::new(driver.as_ref(), &settings(), &clock())
        .plan(&model(driver.as_ref(), &[]))
        .await
        .unwrap();
    let drops: Vec<String> = diff
        .scripts()
        .into_iter()
        .filter(|s| s.script_type == ScriptType::TableDrop)
        .map(|s| s.sql)
        .collect();
    assert_eq!(drops, [r#"DROP TABLE "books""#, r#"DROP TABLE "authors""#]);

    upgrade(driver.as_ref(), &model(driver.as_ref(), &[])).await;
    let loaded = load_schema(driver.as_ref(), &[]).await.unwrap();
    assert!(loaded.tables.is_empty());
}

// =============================================================================
// Failures
// =============================================================================

fn unique_books() -> TableSpec {
    TableSpec::new("books")
        .column(bigint("id").identity())
        .column(varchar("isbn", 20).unique())
        .column(varchar("title", 200))
        .column(bigint("author_id").references("authors", "id"))
        .primary_key(&["id"])
}

#[tokio::test]
async fn failed_upgrade_blocks_the_next_one_until_forced() {
    let driver = sqlite().await;
    upgrade(driver.as_ref(), &model(driver.as_ref(), &[authors(), books()])).await;
    exec(driver.as_ref(), "INSERT INTO authors (id, name) VALUES (1, 'Klabnik')").await;
    exec(
        driver.as_ref(),
        "INSERT INTO books (id, isbn, title, author_id) VALUES (1, '978-1', 'Rust', 1), (2, '978-1', 'Rust', 1)",
    )
    .await;

    let v2 = model(driver.as_ref(), &[authors(), unique_books()]);
    let settings = settings();
    let clock = clock();
    let upgrader = Upgrader::new(driver.as_ref(), &settings, &clock);

    let error = upgrader.upgrade(&v2).await.unwrap_err();
    match &error {
        DbError::Upgrade { script, .. } => assert!(script.contains("ux_books_isbn"), "{script}"),
        other => panic!("expected an upgrade failure, got {other:?}"),
    }
    assert!(error.is_unique_violation());

    let record = VersionStore::new(driver.as_ref(), &clock)
        .read("library")
        .await
        .unwrap()
        .unwrap();
    assert!(record.failed);
    assert!(record.failed_script.unwrap().contains("ux_books_isbn"));

    let blocked = upgrader.upgrade(&v2).await.unwrap_err();
    assert!(matches!(blocked, DbError::PreviousUpgradeFailed { .. }), "{blocked:?}");

    exec(driver.as_ref(), "DELETE FROM books WHERE id = 2").await;
    let mut forced = settings.clone();
    forced.force = true;
    let report = Upgrader::new(driver.as_ref(), &forced, &clock)
        .upgrade(&v2)
        .await
        .unwrap();
    assert!(report.applied > 0);
    assert!(!report.record.failed);
    assert_eq!(report.record.failure_message, None);
}

// =============================================================================
// Script files and declared model files
// =============================================================================

#[tokio::test]
async fn scripts_are_written_with_the_batch_separator() {
    let driver = sqlite().await;
    let declared = model(driver.as_ref(), &[authors(), books()]);
    let diff = Upgrader::new(driver.as_ref(), &settings(), &clock())
        .plan(&declared)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("upgrade.sql");
    let written = write_scripts(&diff, driver.dialect().as_dialect(), &path).unwrap();
    assert_eq!(written, diff.scripts().len());

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.matches(";\n").count(), written, "{content}");
    assert!(content.contains(r#"CREATE TABLE "authors""#));
}

#[tokio::test]
async fn declared_model_is_read_from_json() {
    let driver = sqlite().await;
    let declared = model(driver.as_ref(), &[authors(), books()]);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("model.json");
    fs::write(&path, serde_json::to_string_pretty(&declared).unwrap()).unwrap();
    assert_eq!(read_model(&path).unwrap(), declared);

    fs::write(&path, "{ not json").unwrap();
    assert!(matches!(read_model(&path), Err(DbError::Serialization(_))));
    assert!(matches!(
        read_model(dir.path().join("missing.json")),
        Err(DbError::Io(_))
    ));
}
