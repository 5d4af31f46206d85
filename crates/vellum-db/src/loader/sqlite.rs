//! `SQLite` catalog queries.
//!
//! Everything comes from `sqlite_master` and the `pragma_*` table-valued
//! functions. `SQLite` keeps no names for primary and foreign keys, and
//! indexes created for UNIQUE or PRIMARY KEY constraints cannot be dropped,
//! so those are left out.

use std::sync::LazyLock;

use regex::Regex;
use vellum_core::model::ObjectName;
use vellum_core::{BoundCommand, Value};

use super::{CatalogRow, CatalogValues};
use crate::driver::Driver;
use crate::error::Result;

const TABLES: &str = "SELECT name, sql FROM sqlite_master \
     WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name";
// `hidden` is 2 for VIRTUAL and 3 for STORED generated columns, 1 for
// virtual-table internals.
const COLUMNS: &str = "SELECT name, type, \"notnull\", dflt_value, pk, hidden \
     FROM pragma_table_xinfo(?) WHERE hidden <> 1 ORDER BY cid";
const INDEXES: &str = "SELECT l.name, l.\"unique\", m.sql FROM pragma_index_list(?) l \
     LEFT JOIN sqlite_master m ON m.type = 'index' AND m.name = l.name \
     WHERE l.origin = 'c' ORDER BY l.name";
const INDEX_COLUMNS: &str = "SELECT name FROM pragma_index_info(?) ORDER BY seqno";
const FOREIGN_KEYS: &str = "SELECT id, \"table\", \"from\", \"to\", on_delete \
     FROM pragma_foreign_key_list(?) ORDER BY id, seq";
const VIEWS: &str = "SELECT name, sql FROM sqlite_master WHERE type = 'view' ORDER BY name";

static AUTOINCREMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bAUTOINCREMENT\b").expect("valid regex"));

static GENERATED_TYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+GENERATED\s+ALWAYS$").expect("valid regex"));

static INDEX_FILTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)\)\s*WHERE\s+(?P<filter>.+)$").expect("valid regex"));

static VIEW_BODY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)^\s*CREATE\s+(?:TEMP(?:ORARY)?\s+)?VIEW\s+(?:IF\s+NOT\s+EXISTS\s+)?.+?\s+AS\s+(?P<body>.+)$")
        .expect("valid regex")
});

fn with_name(sql: &str, name: &str) -> BoundCommand {
    BoundCommand {
        sql: sql.to_string(),
        params: vec![Value::Text(name.to_string())],
    }
}

pub(super) async fn catalog(driver: &dyn Driver) -> Result<Vec<CatalogRow>> {
    let mut rows = Vec::new();
    for row in driver.fetch(&BoundCommand::raw(TABLES)).await? {
        let values = CatalogValues::new(TABLES, &row);
        let name = values.text(0)?;
        let create_sql = values.opt_text(1)?.unwrap_or_default();
        let table = ObjectName::new(name.clone());
        rows.push(CatalogRow::Table {
            table: table.clone(),
        });
        columns(driver, &table, &create_sql, &mut rows).await?;
        indexes(driver, &table, &mut rows).await?;
        foreign_keys(driver, &table, &mut rows).await?;
    }

    for row in driver.fetch(&BoundCommand::raw(VIEWS)).await? {
        let values = CatalogValues::new(VIEWS, &row);
        let sql = values.opt_text(1)?.unwrap_or_default();
        let definition = VIEW_BODY
            .captures(&sql)
            .map_or_else(|| sql.clone(), |c| c["body"].trim().to_string());
        rows.push(CatalogRow::View {
            name: ObjectName::new(values.text(0)?),
            definition,
            materialized: false,
        });
    }
    Ok(rows)
}

async fn columns(
    driver: &dyn Driver,
    table: &ObjectName,
    create_sql: &str,
    rows: &mut Vec<CatalogRow>,
) -> Result<()> {
    let result = driver.fetch(&with_name(COLUMNS, &table.name)).await?;
    let mut key: Vec<(i64, String)> = Vec::new();
    for row in &result {
        let values = CatalogValues::new(COLUMNS, row);
        let pk = values.int(4)?;
        if pk > 0 {
            key.push((pk, values.text(0)?));
        }
    }
    let single_key = key.len() == 1;

    for row in &result {
        let values = CatalogValues::new(COLUMNS, row);
        let name = values.text(0)?;
        let identity = single_key && values.int(4)? > 0 && AUTOINCREMENT.is_match(create_sql);
        let computed = if matches!(values.int(5)?, 2 | 3) {
            Some(generated_expr(create_sql, &name).unwrap_or_default())
        } else {
            None
        };
        let type_spec = values
            .opt_text(1)?
            .map_or_else(|| String::from("BLOB"), |t| GENERATED_TYPE.replace(&t, "").into_owned());
        rows.push(CatalogRow::Column {
            table: table.clone(),
            name,
            type_spec,
            nullable: !values.flag(2)?,
            identity,
            default: values.opt_text(3)?,
            computed,
        });
    }

    key.sort();
    rows.extend(key.into_iter().map(|(_, column)| CatalogRow::PrimaryKey {
        table: table.clone(),
        name: None,
        column,
    }));
    Ok(())
}

/// The `AS (...)` expression of a generated column, read from the table's
/// `CREATE TABLE` text.
fn generated_expr(create_sql: &str, column: &str) -> Option<String> {
    let name = regex::escape(column);
    let pattern = format!(
        r#"(?is)[(,]\s*(?:"{name}"|`{name}`|\[{name}\]|{name})\s[^,]*?\bAS\s*\("#
    );
    let start = Regex::new(&pattern).ok()?.find(create_sql)?.end();

    let mut depth = 1usize;
    let mut quote: Option<char> = None;
    for (i, ch) in create_sql[start..].char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some(create_sql[start..start + i].trim().to_string());
                }
            }
            _ => {}
        }
    }
    None
}

async fn indexes(driver: &dyn Driver, table: &ObjectName, rows: &mut Vec<CatalogRow>) -> Result<()> {
    for row in driver.fetch(&with_name(INDEXES, &table.name)).await? {
        let values = CatalogValues::new(INDEXES, &row);
        let name = values.text(0)?;
        let unique = values.flag(1)?;
        let filter = values
            .opt_text(2)?
            .and_then(|sql| INDEX_FILTER.captures(&sql).map(|c| c["filter"].trim().to_string()));
        for column in driver.fetch(&with_name(INDEX_COLUMNS, &name)).await? {
            let column = CatalogValues::new(INDEX_COLUMNS, &column).text(0)?;
            rows.push(CatalogRow::Index {
                table: table.clone(),
                name: name.clone(),
                column,
                unique,
                filter: filter.clone(),
            });
        }
    }
    Ok(())
}

async fn foreign_keys(
    driver: &dyn Driver,
    table: &ObjectName,
    rows: &mut Vec<CatalogRow>,
) -> Result<()> {
    for row in driver.fetch(&with_name(FOREIGN_KEYS, &table.name)).await? {
        let values = CatalogValues::new(FOREIGN_KEYS, &row);
        let column = values.text(2)?;
        rows.push(CatalogRow::ForeignKey {
            table: table.clone(),
            name: values.int(0)?.to_string(),
            named: false,
            target: ObjectName::new(values.text(1)?),
            // NULL when the key references the target's primary key implicitly.
            target_column: values.opt_text(3)?.unwrap_or_else(|| column.clone()),
            column,
            cascade_delete: values
                .opt_text(4)?
                .is_some_and(|action| action.eq_ignore_ascii_case("CASCADE")),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use sqlx::sqlite::SqlitePoolOptions;
    use vellum_core::model::{Index, KeyKind};

    use super::*;
    use crate::driver::{DataCommandExecutor, SqliteDriver};
    use crate::loader::load_schema;

    async fn driver_with(ddl: &[&str]) -> SqliteDriver {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        let driver = SqliteDriver::from_pool(pool, Duration::from_secs(5));
        for sql in ddl {
            driver.execute(&BoundCommand::raw(*sql)).await.unwrap();
        }
        driver
    }

    #[tokio::test]
    async fn test_loads_tables_keys_and_indexes() {
        let driver = driver_with(&[
            "CREATE TABLE authors (id INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL DEFAULT '')",
            "CREATE TABLE books (\
                id INTEGER NOT NULL, \
                author_id INTEGER, \
                title TEXT, \
                price NUMERIC(10,2), \
                CONSTRAINT pk_books PRIMARY KEY (id), \
                FOREIGN KEY (author_id) REFERENCES authors (id) ON DELETE CASCADE)",
            "CREATE UNIQUE INDEX ux_books_title ON books (title) WHERE title IS NOT NULL",
            "CREATE VIEW cheap_books AS SELECT id FROM books WHERE price < 10",
        ])
        .await;

        let model = load_schema(&driver, &[]).await.unwrap();

        let authors = model.table("authors").unwrap();
        assert!(authors.column("id").unwrap().identity);
        assert!(!authors.column("id").unwrap().nullable);
        assert_eq!(authors.column("name").unwrap().default.as_deref(), Some("''"));

        let books = model.table("books").unwrap();
        assert!(!books.column("id").unwrap().identity);
        assert_eq!(books.primary_key_columns(), ["id"]);
        assert_eq!(books.column("price").unwrap().type_info.to_string(), "NUMERIC(10,2)");
        assert_eq!(
            books.indexes,
            vec![Index {
                name: String::from("ux_books_title"),
                columns: vec![String::from("title")],
                unique: true,
                filter: Some(String::from("title IS NOT NULL")),
            }]
        );
        let fk = &books.foreign_keys[0];
        assert_eq!(fk.columns, ["author_id"]);
        assert!(fk.cascade_delete);
        assert!(matches!(&fk.kind, KeyKind::Foreign { target, .. } if target.name == "authors"));

        assert_eq!(model.views.len(), 1);
        assert_eq!(model.views[0].definition, "SELECT id FROM books WHERE price < 10");
    }

    #[tokio::test]
    async fn test_loads_generated_columns() {
        let driver = driver_with(&[
            "CREATE TABLE books (\
                id INTEGER NOT NULL PRIMARY KEY, \
                title TEXT, \
                notes TEXT, \
                pages INTEGER GENERATED ALWAYS AS (length(notes)) VIRTUAL, \
                slug TEXT AS (lower(replace(title, ' ', '-'))) STORED)",
            "ALTER TABLE books ADD COLUMN \"words\" INTEGER GENERATED ALWAYS AS (length(notes) / 5) VIRTUAL",
        ])
        .await;

        let model = load_schema(&driver, &[]).await.unwrap();
        let books = model.table("books").unwrap();
        let computed: Vec<(&str, Option<&str>)> = books
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.computed.as_deref()))
            .collect();
        assert_eq!(
            computed,
            [
                ("id", None),
                ("title", None),
                ("notes", None),
                ("pages", Some("length(notes)")),
                ("slug", Some("lower(replace(title, ' ', '-'))")),
                ("words", Some("length(notes) / 5")),
            ]
        );
        assert_eq!(books.column("pages").unwrap().type_info.to_string(), "INTEGER");
    }

    #[test]
    fn test_generated_expr_skips_quoted_parentheses() {
        let sql = r#"CREATE TABLE t (a TEXT, "b" TEXT AS (a || ')') VIRTUAL, c INTEGER)"#;
        assert_eq!(generated_expr(sql, "b").as_deref(), Some("a || ')'"));
        assert_eq!(generated_expr(sql, "a"), None);
    }
}
