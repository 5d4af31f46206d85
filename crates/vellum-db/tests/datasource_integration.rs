//! Integration tests for `DataSource`.
//!
//! Entities are declared with `#[derive(Entity)]`, the schema is created by
//! the upgrader, and rows go in through `save_changes` and come back through
//! compiled queries.

mod common;

use chrono::{NaiveDate, TimeZone, Utc};
use common::{scalar, sqlite, upgrade};
use pretty_assertions::assert_eq;
use vellum_core::query::{col, Delete, Update};
use vellum_core::types::TypeRegistry;
use vellum_core::{BoundCommand, DbModel, Dialect, Entity, QueryResult, Value};
use vellum_db::{Change, DataSource, DbError, ErrorKind, Session};

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(table = "authors")]
struct Author {
    #[column(primary_key, identity)]
    id: i64,
    #[column(size = 100)]
    name: String,
}

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(table = "books")]
struct Book {
    #[column(primary_key, identity)]
    id: i64,
    #[column(size = 200)]
    title: String,
    #[column(size = 20, unique)]
    isbn: String,
    price: f64,
    #[column(references = "authors.id")]
    author_id: i64,
    pages: Option<i32>,
}

fn book(title: &str, isbn: &str, author_id: i64) -> Book {
    Book {
        id: 0,
        title: title.to_string(),
        isbn: isbn.to_string(),
        price: 29.5,
        author_id,
        pages: None,
    }
}

async fn library() -> DataSource {
    let driver = sqlite().await;
    let model = DbModel::from_specs(
        driver.dialect().types(),
        &[Author::table_spec().unwrap(), Book::table_spec().unwrap()],
    );
    upgrade(driver.as_ref(), &model).await;
    DataSource::new(driver, model)
}

// =============================================================================
// Saving changes
// =============================================================================

#[tokio::test]
async fn children_inserted_before_parents_are_reordered() {
    let source = library().await;
    let author = Author {
        id: 0,
        name: String::from("Klabnik"),
    };
    let changes: Vec<Change> = vec![
        book("The Rust Programming Language", "978-1718503106", 1)
            .insert()
            .into(),
        author.insert().into(),
    ];
    let affected = source
        .save_changes(&Session::new("import"), changes)
        .await
        .unwrap();
    assert_eq!(affected, 2);

    let books: Vec<Book> = source
        .execute_select(&Book::query().order_by(Book::id().asc()), &Session::default())
        .await
        .unwrap()
        .into_rows()
        .iter()
        .map(|r| Book::from_record(r).unwrap())
        .collect();
    assert_eq!(books.len(), 1);
    assert_eq!(books[0].author_id, 1);
    assert_eq!(books[0].pages, None);
}

#[tokio::test]
async fn parents_deleted_after_children() {
    let source = library().await;
    let session = Session::default();
    let author = Author {
        id: 0,
        name: String::from("Nichols"),
    };
    source
        .save_changes(
            &session,
            vec![
                author.insert().into(),
                book("Rust", "978-1", 1).insert().into(),
                book("More Rust", "978-2", 1).insert().into(),
            ],
        )
        .await
        .unwrap();

    let changes: Vec<Change> = vec![
        Delete::from("authors").filter(Author::id().eq(1)).into(),
        Update::table("books")
            .set("pages", 552)
            .filter(col("id").eq(1))
            .into(),
        Delete::from("books").filter(Book::author_id().eq(1)).into(),
    ];
    assert_eq!(source.save_changes(&session, changes).await.unwrap(), 4);
    assert_eq!(
        scalar(source.driver(), "SELECT COUNT(*) FROM authors").await,
        Value::Int(0)
    );
}

#[tokio::test]
async fn unique_violation_names_the_index() {
    let source = library().await;
    let session = Session::default();
    let author = Author {
        id: 0,
        name: String::from("Klabnik"),
    };
    let changes: Vec<Change> = vec![
        author.insert().into(),
        book("Rust", "978-1", 1).insert().into(),
        book("Rust, again", "978-1", 1).insert().into(),
    ];

    let error = source.save_changes(&session, changes).await.unwrap_err();
    assert!(error.is_unique_violation());
    match error.kind() {
        Some(ErrorKind::UniqueViolation { index, .. }) => {
            assert_eq!(index.as_deref(), Some("ux_books_isbn"));
        }
        other => panic!("expected a unique violation, got {other:?}"),
    }
    assert_eq!(
        scalar(source.driver(), "SELECT COUNT(*) FROM books").await,
        Value::Int(0)
    );
}

// =============================================================================
// Queries
// =============================================================================

#[tokio::test]
async fn prefix_search_pages_through_matches() {
    let source = library().await;
    let session = Session::default();
    let mut changes: Vec<Change> = vec![Author {
        id: 0,
        name: String::from("Skeet"),
    }
    .insert()
    .into()];
    for (i, title) in ["c# in depth", "c# 12 pocket", "rust in action", "c#_notes", "c% guide"]
        .iter()
        .enumerate()
    {
        changes.push(book(title, &format!("isbn-{i}"), 1).insert().into());
    }
    source.save_changes(&session, changes).await.unwrap();

    let page = |skip: i64| {
        Book::query()
            .filter(Book::title().starts_with("c#"))
            .skip(skip)
            .take(2)
    };
    let titles = |result: QueryResult| -> Vec<String> {
        result
            .into_rows()
            .iter()
            .map(|r| Book::from_record(r).unwrap().title)
            .collect()
    };

    let first = titles(source.execute_select(&page(0), &session).await.unwrap());
    assert_eq!(first, ["c# in depth", "c# 12 pocket"]);
    let second = titles(source.execute_select(&page(2), &session).await.unwrap());
    assert_eq!(second, ["c#_notes"]);

    let percent = source
        .execute_select(
            &Book::query().filter(Book::title().starts_with("c%")).count(),
            &session,
        )
        .await
        .unwrap();
    assert_eq!(percent.scalar(), Some(&Value::Int(1)));
}

#[tokio::test]
async fn single_fails_on_missing_rows() {
    let source = library().await;
    let result = source
        .execute_select(
            &Author::query().filter(Author::name().eq("nobody")).single(),
            &Session::default(),
        )
        .await;
    assert!(matches!(result, Err(DbError::Core(_))), "{result:?}");
}

#[tokio::test]
async fn statements_are_cached_by_shape() {
    let source = library().await;
    let session = Session::default();
    for name in ["a", "b", "c"] {
        source
            .execute_select(&Author::query().filter(Author::name().eq(name)), &session)
            .await
            .unwrap();
    }
    assert_eq!(source.cached_statements(), 1);
    source.close().await;
}

// =============================================================================
// Literals
// =============================================================================

#[tokio::test]
async fn sqlite_literals_read_back() {
    let source = library().await;
    let registry = TypeRegistry::sqlite();
    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
    let cases = [
        (Value::Int(-42), Value::Int(-42)),
        (Value::Bool(true), Value::Int(1)),
        (Value::Float(2.5), Value::Float(2.5)),
        (Value::Text(String::from("O'Reilly")), Value::Text(String::from("O'Reilly"))),
        (Value::Blob(vec![0xde, 0xad]), Value::Blob(vec![0xde, 0xad])),
        (
            Value::Uuid(uuid::Uuid::nil()),
            Value::Text(String::from("00000000-0000-0000-0000-000000000000")),
        ),
        (
            Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()),
            Value::Text(String::from("2024-03-01")),
        ),
        (
            Value::DateTime(at),
            Value::Text(String::from("2024-03-01 12:30:05.000000")),
        ),
        (Value::Null, Value::Null),
    ];
    for (value, expected) in cases {
        let literal = registry.literal(&value).unwrap();
        let got = source
            .driver()
            .fetch_scalar(&BoundCommand::raw(format!("SELECT {literal}")))
            .await
            .unwrap();
        assert_eq!(got, expected, "{literal}");
    }
}
