//! Integration tests for the schema model and the diff engine.
//!
//! Declared models come from `Entity` derives and table specs; diffs are run
//! against an empty database and against the model itself.

mod common;

use common::{chain_specs, entity_model};
use pretty_assertions::assert_eq;
use vellum_core::dialect::{MsSqlDialect, PostgresDialect, SqliteDialect};
use vellum_core::model::{bigint, varchar, ObjectName, TableSpec};
use vellum_core::types::{HostType, TypeRegistry};
use vellum_core::upgrade::{ScriptType, SchemaUpdater};
use vellum_core::{DbModel, Dialect, Value};

// =============================================================================
// Dependency order
// =============================================================================

#[test]
fn tables_are_ordered_parents_first() {
    let dialect = PostgresDialect::new();
    let model = DbModel::from_specs(dialect.types(), &chain_specs());
    let order = model.dependency_order();
    let names: Vec<&str> = order.order.iter().map(|n| n.name.as_str()).collect();
    assert_eq!(names, ["books", "editions", "reviews"]);
    assert!(order.cyclic.is_empty());
    assert_eq!(order.position(&ObjectName::from("reviews")), Some(2));
}

#[test]
fn foreign_key_cycles_are_reported() {
    let dialect = SqliteDialect::new();
    let model = DbModel::from_specs(
        dialect.types(),
        &[
            TableSpec::new("authors")
                .column(bigint("id"))
                .column(bigint("favourite_book_id").references("books", "id"))
                .primary_key(&["id"]),
            TableSpec::new("books")
                .column(bigint("id"))
                .column(bigint("author_id").references("authors", "id"))
                .primary_key(&["id"]),
            TableSpec::new("genres").column(bigint("id")).primary_key(&["id"]),
        ],
    );
    let order = model.dependency_order();
    assert_eq!(order.order[0], ObjectName::from("genres"));
    assert_eq!(order.order.len(), 3);
    assert_eq!(order.cyclic.len(), 2);
}

#[test]
fn new_tables_are_created_before_their_constraints() {
    let dialect = PostgresDialect::new();
    let declared = DbModel::from_specs(dialect.types(), &chain_specs());
    let diff = SchemaUpdater::new(&dialect).diff(&declared, &DbModel::new());
    let scripts = diff.scripts();

    let creates: Vec<&str> = scripts
        .iter()
        .filter(|s| s.script_type == ScriptType::TableAdd)
        .map(|s| s.sql.as_str())
        .collect();
    assert_eq!(creates.len(), 3);
    assert!(creates[0].starts_with(r#"CREATE TABLE "books""#));
    assert!(creates[1].starts_with(r#"CREATE TABLE "editions""#));
    assert!(creates[2].starts_with(r#"CREATE TABLE "reviews""#));

    let last_create = scripts
        .iter()
        .rposition(|s| s.script_type == ScriptType::TableAdd)
        .unwrap();
    let first_constraint = scripts
        .iter()
        .position(|s| s.script_type == ScriptType::RefConstraintAdd)
        .unwrap();
    assert!(last_create < first_constraint);
}

// =============================================================================
// Diffing declared models
// =============================================================================

#[test]
fn entity_model_diffs_clean_against_itself() {
    let dialects: [&dyn vellum_core::DdlDialect; 3] = [
        &SqliteDialect::new(),
        &PostgresDialect::new(),
        &MsSqlDialect::new(),
    ];
    for dialect in dialects {
        let model = entity_model(dialect.as_dialect());
        let diff = SchemaUpdater::new(dialect).diff(&model, &model);
        assert!(diff.is_empty(), "{}: {:?}", dialect.vendor(), diff.scripts());
    }
}

#[test]
fn unique_fields_get_named_indexes() {
    let dialect = PostgresDialect::new();
    let model = entity_model(&dialect);
    let books = model.table("books").unwrap();
    let names: Vec<&str> = books.indexes.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, ["ux_books_isbn"]);

    let diff = SchemaUpdater::new(&dialect).diff(&model, &DbModel::new());
    assert!(diff
        .scripts()
        .iter()
        .any(|s| s.sql.contains(r#""ux_books_isbn""#)));
}

#[test]
fn undeclared_renames_are_withheld() {
    let dialect = SqliteDialect::new();
    let v1 = DbModel::from_specs(
        dialect.types(),
        &[TableSpec::new("authors")
            .column(bigint("id"))
            .column(varchar("name", 100))
            .primary_key(&["id"])],
    );
    let v2 = DbModel::from_specs(
        dialect.types(),
        &[TableSpec::new("authors")
            .column(bigint("id"))
            .column(varchar("names", 100))
            .primary_key(&["id"])],
    );
    let diff = SchemaUpdater::new(&dialect).diff(&v2, &v1);
    assert_eq!(diff.ambiguous.len(), 1);
    assert!(!diff.is_empty());
    assert!(diff
        .scripts()
        .iter()
        .all(|s| !s.sql.contains("DROP COLUMN \"name\"")));
}

#[test]
fn export_separates_scripts() {
    let dialect = MsSqlDialect::new();
    let declared = DbModel::from_specs(dialect.types(), &chain_specs());
    let diff = SchemaUpdater::new(&dialect).diff(&declared, &DbModel::new());
    let exported = diff.export(dialect.batch_separator());
    assert_eq!(
        exported.matches(dialect.batch_separator()).count(),
        diff.scripts().len()
    );
    assert!(exported.contains("CREATE TABLE [books]"), "{exported}");
}

#[test]
fn declared_models_survive_json() {
    let dialect = PostgresDialect::new();
    let model = entity_model(&dialect);
    let json = serde_json::to_string_pretty(&model).unwrap();
    let back: DbModel = serde_json::from_str(&json).unwrap();
    assert_eq!(back, model);
}

// =============================================================================
// Type registries
// =============================================================================

fn sample(host: HostType) -> Value {
    use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};

    match host {
        HostType::Bool => Value::Bool(true),
        HostType::I8
        | HostType::I16
        | HostType::I32
        | HostType::I64
        | HostType::U8
        | HostType::U16
        | HostType::U32
        | HostType::U64 => Value::Int(42),
        HostType::F32 | HostType::F64 => Value::Float(2.5),
        HostType::Decimal => Value::Decimal(String::from("12.50")),
        HostType::String => Value::Text(String::from("O'Reilly")),
        HostType::Bytes => Value::Blob(vec![0xde, 0xad]),
        HostType::Uuid => Value::Uuid(uuid::Uuid::nil()),
        HostType::DateTime => {
            Value::DateTime(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap())
        }
        HostType::Date => Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
        HostType::Time => Value::Time(NaiveTime::from_hms_opt(12, 30, 5).unwrap()),
    }
}

#[test]
fn every_registered_type_renders_literals() {
    for registry in [
        TypeRegistry::sqlite(),
        TypeRegistry::postgres(),
        TypeRegistry::mssql(),
    ] {
        for host in HostType::ALL {
            let info = registry.type_info(host, None, None, None);
            let literal = registry
                .literal_for(&info, &sample(host))
                .unwrap_or_else(|e| panic!("{} {host:?}: {e}", registry.vendor()));
            assert_ne!(literal, "NULL", "{} {host:?}", registry.vendor());
            assert_eq!(registry.literal_for(&info, &Value::Null).unwrap(), "NULL");
        }
    }
}

#[test]
fn text_literals_escape_quotes() {
    let value = Value::Text(String::from("O'Reilly"));
    assert_eq!(TypeRegistry::sqlite().literal(&value).unwrap(), "'O''Reilly'");
    assert_eq!(TypeRegistry::mssql().literal(&value).unwrap(), "N'O''Reilly'");
}

#[test]
fn empty_lists_render_as_an_empty_select() {
    for registry in [
        TypeRegistry::sqlite(),
        TypeRegistry::postgres(),
        TypeRegistry::mssql(),
    ] {
        assert_eq!(
            registry.literal(&Value::List(Vec::new())).unwrap(),
            "(SELECT NULL WHERE 1 = 0)"
        );
    }
}
