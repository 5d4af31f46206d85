//! Integration tests for query translation.
//!
//! Queries are written against `Entity` derives and compiled for every
//! vendor, then checked for the shape of the SQL and the bound parameters.

mod common;

use common::{bind, entity_model, Author, Book};
use pretty_assertions::assert_eq;
use vellum_core::dialect::{MsSqlDialect, PostgresDialect, SqliteDialect};
use vellum_core::query::col;
use vellum_core::{CommandCompiler, Dialect, Entity, Error, Query, Value};

const BOOK_COLUMNS: &str = r#""id", "title", "isbn", "price", "author_id", "pages""#;

// =============================================================================
// Paging
// =============================================================================

#[test]
fn prefix_filter_with_paging_on_sqlite() {
    let dialect = SqliteDialect::new();
    let model = entity_model(&dialect);
    let bound = bind(
        &dialect,
        &model,
        Book::query().filter(Book::title().starts_with("c#")).skip(0).take(10),
    );
    assert_eq!(
        bound.sql,
        format!(
            r#"SELECT {BOOK_COLUMNS} FROM "books" WHERE "title" LIKE ? ESCAPE '\' ORDER BY "id" LIMIT ? OFFSET ?"#
        )
    );
    assert_eq!(bound.params.len(), 3);
    assert_eq!(bound.params[0], Value::Text(String::from("c#%")));
}

#[test]
fn prefix_filter_with_paging_on_postgres() {
    let dialect = PostgresDialect::new();
    let model = entity_model(&dialect);
    let bound = bind(
        &dialect,
        &model,
        Book::query().filter(Book::title().starts_with("c#")).skip(20).take(10),
    );
    assert_eq!(
        bound.sql,
        format!(
            r#"SELECT {BOOK_COLUMNS} FROM "books" WHERE "title" LIKE $1 ESCAPE '\' ORDER BY "id" LIMIT $2 OFFSET $3"#
        )
    );
    assert_eq!(
        bound.params,
        vec![Value::Text(String::from("c#%")), Value::Int(10), Value::Int(20)]
    );
}

#[test]
fn prefix_filter_with_paging_on_mssql() {
    let dialect = MsSqlDialect::new();
    let model = entity_model(&dialect);
    let bound = bind(
        &dialect,
        &model,
        Book::query().filter(Book::title().starts_with("c#")).skip(0).take(10),
    );
    assert!(bound.sql.starts_with("SELECT [id], [title]"), "{}", bound.sql);
    assert!(bound.sql.contains("ORDER BY [id] OFFSET @P2 ROWS"), "{}", bound.sql);
    assert!(bound.sql.ends_with("FETCH NEXT @P3 ROWS ONLY"), "{}", bound.sql);
}

#[test]
fn brackets_are_escaped_in_mssql_patterns() {
    let dialect = MsSqlDialect::new();
    let model = entity_model(&dialect);
    let bound = bind(
        &dialect,
        &model,
        Book::query()
            .filter(Book::title().starts_with("a[b"))
            .filter(Book::isbn().contains("[x]"))
            .take(3),
    );
    assert!(
        bound.sql.contains(r"WHERE [title] LIKE @P1 ESCAPE '\'"),
        "{}",
        bound.sql
    );
    assert_eq!(bound.params[0], Value::Text(String::from(r"a\[b%")));
    assert_eq!(bound.params[1], Value::Text(String::from(r"%\[x]%")));
}

#[test]
fn explicit_ordering_is_kept_when_paging() {
    let dialect = SqliteDialect::new();
    let model = entity_model(&dialect);
    let bound = bind(
        &dialect,
        &model,
        Book::query().order_by(Book::price().desc()).take(3),
    );
    assert!(bound.sql.contains(r#"ORDER BY "price" DESC LIMIT ?"#), "{}", bound.sql);
    assert!(!bound.sql.contains(r#""id" LIMIT"#), "{}", bound.sql);
}

// =============================================================================
// Aliases
// =============================================================================

#[test]
fn single_table_queries_have_no_aliases() {
    let dialect = PostgresDialect::new();
    let model = entity_model(&dialect);
    let bound = bind(
        &dialect,
        &model,
        Book::query().filter(Book::pages().is_null().and(Book::price().gt(10.0))),
    );
    assert!(!bound.sql.contains(" AS "), "{}", bound.sql);
    assert!(!bound.sql.contains("$\""), "{}", bound.sql);
}

#[test]
fn joined_sources_get_distinct_aliases() {
    let dialect = SqliteDialect::new();
    let model = entity_model(&dialect);
    let bound = bind(
        &dialect,
        &model,
        Query::from("books")
            .join("authors")
            .filter(col("authors.name").eq("Knuth"))
            .select([col("books.title"), col("authors.name")])
            .distinct()
            .take(5),
    );
    assert!(bound.sql.contains(r#""books" AS "b$""#), "{}", bound.sql);
    assert!(bound.sql.contains(r#""authors" AS "a$""#), "{}", bound.sql);
    assert!(bound.sql.contains("ORDER BY"), "{}", bound.sql);
}

// =============================================================================
// Entities
// =============================================================================

#[test]
fn insert_skips_identity_and_binds_values() {
    let dialect = SqliteDialect::new();
    let model = entity_model(&dialect);
    let book = Book {
        id: 0,
        title: String::from("The Rust Book"),
        isbn: String::from("978-1718503106"),
        price: 39.95,
        author_id: 1,
        pages: None,
    };
    let bound = bind(&dialect, &model, book.insert());
    assert_eq!(
        bound.sql,
        r#"INSERT INTO "books" ("title", "isbn", "price", "author_id", "pages") VALUES (?, ?, ?, ?, NULL)"#
    );
    assert_eq!(bound.params.len(), 4);
    assert_eq!(bound.params[2], Value::Float(39.95));
}

#[test]
fn rows_read_back_into_entities() {
    let dialect = SqliteDialect::new();
    let model = entity_model(&dialect);
    let compiled = CommandCompiler::new(&model, &dialect)
        .compile_query(&Author::query().filter(Author::name().eq("Klabnik")))
        .unwrap();
    let reader = compiled.statement.row_reader.as_ref().unwrap();
    let record = reader.read(vec![Value::Int(3), Value::Text(String::from("Klabnik"))]);
    assert_eq!(
        Author::from_record(&record).unwrap(),
        Author {
            id: 3,
            name: String::from("Klabnik"),
        }
    );
}

#[test]
fn unknown_columns_fail_translation() {
    let dialect = SqliteDialect::new();
    let model = entity_model(&dialect);
    let result =
        CommandCompiler::new(&model, &dialect).compile_query(&Book::query().filter(col("subtitle").eq("x")));
    match result {
        Err(Error::Translation(e)) => assert!(e.reason.contains("unknown column"), "{}", e.reason),
        other => panic!("expected a translation error, got {other:?}"),
    }
}

#[test]
fn every_dialect_marks_parameters_one_based() {
    let dialects: [&dyn Dialect; 3] = [
        &SqliteDialect::new(),
        &PostgresDialect::new(),
        &MsSqlDialect::new(),
    ];
    let markers: Vec<String> = dialects.iter().map(|d| d.parameter_marker(1)).collect();
    assert_eq!(markers, ["?", "$1", "@P1"]);
}
