//! Command compilation.
//!
//! Literal extraction, translation and rendering, with the rendered statement
//! cached per command shape.

use std::sync::Arc;

use tracing::debug;

use crate::builder::SqlBuilder;
use crate::cache::StatementCache;
use crate::dialect::Dialect;
use crate::error::{Error, SqlError};
use crate::fragment::{BoundCommand, SqlStatement};
use crate::model::DbModel;
use crate::query::{parameterize, DbCommand, Query, ResultProcessor, Translator};
use crate::value::Value;

/// A compiled command: a shared statement plus this call's argument values.
#[derive(Debug, Clone)]
pub struct CompiledCommand {
    /// The statement, possibly shared with other commands of the same shape.
    pub statement: Arc<SqlStatement>,
    /// Values extracted from the command's literals.
    pub args: Vec<Value>,
    /// The command as written, for logs and errors.
    pub description: String,
}

impl CompiledCommand {
    /// Binds the arguments for execution.
    ///
    /// # Errors
    ///
    /// Fails when an inline literal cannot be rendered.
    pub fn bind(&self, dialect: &dyn Dialect) -> Result<BoundCommand, SqlError> {
        self.statement.bind(dialect, &self.args)
    }

    /// How returned rows are shaped.
    #[must_use]
    pub fn processor(&self) -> ResultProcessor {
        self.statement.processor
    }
}

/// Compiles commands against one model and dialect.
pub struct CommandCompiler<'a> {
    model: &'a DbModel,
    dialect: &'a dyn Dialect,
    cache: Option<&'a StatementCache>,
}

impl<'a> CommandCompiler<'a> {
    /// Creates a compiler without caching.
    #[must_use]
    pub fn new(model: &'a DbModel, dialect: &'a dyn Dialect) -> Self {
        Self {
            model,
            dialect,
            cache: None,
        }
    }

    /// Shares compiled statements through `cache`. A cache must only be used
    /// with one model.
    #[must_use]
    pub const fn with_cache(mut self, cache: &'a StatementCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Compiles a query.
    ///
    /// # Errors
    ///
    /// See [`Self::compile`].
    pub fn compile_query(&self, query: &Query) -> Result<CompiledCommand, Error> {
        self.compile(&DbCommand::Select(query.clone()))
    }

    /// Compiles any command.
    ///
    /// # Errors
    ///
    /// [`Error::Translation`] when the command cannot be expressed against
    /// the model, [`Error::Sql`] when rendering fails.
    pub fn compile(&self, command: &DbCommand) -> Result<CompiledCommand, Error> {
        let description = command.to_string();
        let parameterized = parameterize(command);
        let shape = parameterized.command.to_string();
        let build = || -> Result<SqlStatement, Error> {
            let translated = Translator::new(self.model, self.dialect, description.clone())
                .translate(&parameterized.command)?;
            Ok(SqlBuilder::new(self.dialect).build(&translated)?)
        };
        let statement = match self.cache {
            Some(cache) => {
                let key = StatementCache::key(self.dialect.name(), &shape);
                cache.get_or_try_insert(&key, build)?
            }
            None => Arc::new(build()?),
        };
        debug!(
            command = %description,
            dialect = self.dialect.name(),
            args = parameterized.values.len(),
            "compiled command"
        );
        Ok(CompiledCommand {
            statement,
            args: parameterized.values,
            description,
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dialect::{MsSqlDialect, PostgresDialect, SqliteDialect};
    use crate::model::{bigint, boolean, integer, varchar, TableSpec};
    use crate::query::{col, count_all, related, Delete, Insert, Projection, Update};

    fn specs() -> Vec<TableSpec> {
        vec![
            TableSpec::new("authors")
                .column(bigint("id"))
                .column(varchar("name", 100))
                .primary_key(&["id"]),
            TableSpec::new("books")
                .column(bigint("id").identity())
                .column(varchar("title", 200))
                .column(integer("price"))
                .column(boolean("active"))
                .column(bigint("author_id").references("authors", "id"))
                .primary_key(&["id"]),
            TableSpec::new("reviews")
                .column(bigint("id"))
                .column(bigint("book_id").references("books", "id"))
                .column(integer("rating"))
                .primary_key(&["id"]),
            TableSpec::new("events").column(varchar("message", 100)),
        ]
    }

    fn sql(dialect: &dyn Dialect, command: impl Into<DbCommand>) -> String {
        let model = DbModel::from_specs(dialect.types(), &specs());
        CommandCompiler::new(&model, dialect)
            .compile(&command.into())
            .unwrap()
            .bind(dialect)
            .unwrap()
            .sql
    }

    fn error(command: Query) -> String {
        let dialect = SqliteDialect::new();
        let model = DbModel::from_specs(dialect.types(), &specs());
        match CommandCompiler::new(&model, &dialect).compile_query(&command) {
            Err(Error::Translation(e)) => e.reason,
            other => panic!("expected a translation error, got {other:?}"),
        }
    }

    const BOOK_COLUMNS: &str = r#""id", "title", "price", "active", "author_id""#;

    #[test]
    fn test_single_table_has_no_aliases() {
        let got = sql(
            &SqliteDialect::new(),
            Query::from("books").filter(col("active").and(col("author_id").eq(Value::Null))),
        );
        assert_eq!(
            got,
            format!(r#"SELECT {BOOK_COLUMNS} FROM "books" WHERE "active" = 1 AND "author_id" IS NULL"#)
        );
    }

    #[test]
    fn test_join_aliases_every_source() {
        let got = sql(
            &SqliteDialect::new(),
            Query::from("books")
                .join("authors")
                .filter(col("authors.name").eq("Knuth"))
                .select([col("books.title"), col("authors.name")]),
        );
        assert_eq!(
            got,
            r#"SELECT "b$"."title", "a$"."name" FROM "books" AS "b$" INNER JOIN "authors" AS "a$" ON "b$"."author_id" = "a$"."id" WHERE "a$"."name" = ?"#
        );
    }

    #[test]
    fn test_related_any_becomes_correlated_exists() {
        let got = sql(
            &SqliteDialect::new(),
            Query::from("authors").filter(related("books").any(col("price").gt(10))),
        );
        assert_eq!(
            got,
            r#"SELECT "a$"."id", "a$"."name" FROM "authors" AS "a$" WHERE EXISTS (SELECT 1 FROM "books" AS "b$" WHERE "b$"."author_id" = "a$"."id" AND "b$"."price" > ?)"#
        );
    }

    #[test]
    fn test_terminals() {
        let d = SqliteDialect::new();
        assert_eq!(
            sql(&d, Query::from("books").order_by(col("title")).first()),
            format!(r#"SELECT {BOOK_COLUMNS} FROM "books" ORDER BY "title" LIMIT 1"#)
        );
        assert_eq!(
            sql(&d, Query::from("books").order_by(col("title")).last()),
            format!(r#"SELECT {BOOK_COLUMNS} FROM "books" ORDER BY "title" DESC LIMIT 1"#)
        );
        assert_eq!(
            sql(&d, Query::from("books").filter(col("price").gt(10)).count()),
            r#"SELECT COUNT(*) FROM "books" WHERE "price" > ?"#
        );
        assert_eq!(
            sql(&d, Query::from("books").take(5).count()),
            format!(
                r#"SELECT COUNT(*) FROM (SELECT {BOOK_COLUMNS} FROM "books" ORDER BY "id" LIMIT ?) AS "sq$""#
            )
        );
        assert_eq!(
            sql(&d, Query::from("books").filter(col("price").gt(10)).any()),
            r#"SELECT 1 FROM "books" WHERE "price" > ? ORDER BY "id" LIMIT 1"#
        );
    }

    #[test]
    fn test_grouping_moves_filters_to_having() {
        let got = sql(
            &SqliteDialect::new(),
            Query::from("books")
                .group_by(vec![col("author_id")])
                .filter(count_all().gt(1))
                .select([Projection::from(col("author_id")), count_all().alias("n")]),
        );
        assert_eq!(
            got,
            r#"SELECT "author_id", COUNT(*) AS "n" FROM "books" GROUP BY "author_id" HAVING COUNT(*) > ?"#
        );
    }

    #[test]
    fn test_lists_render_inline() {
        let d = SqliteDialect::new();
        assert_eq!(
            sql(&d, Query::from("books").filter(col("id").in_list(vec![1, 2, 3])).select([col("id")])),
            r#"SELECT "id" FROM "books" WHERE "id" IN (1, 2, 3)"#
        );
        assert_eq!(
            sql(&d, Query::from("books").filter(col("id").in_list(Vec::<i64>::new())).select([col("id")])),
            r#"SELECT "id" FROM "books" WHERE "id" IN (SELECT NULL WHERE 1 = 0)"#
        );
    }

    #[test]
    fn test_postgres_paging_binds_in_marker_order() {
        let dialect = PostgresDialect::new();
        let model = DbModel::from_specs(dialect.types(), &specs());
        let compiled = CommandCompiler::new(&model, &dialect)
            .compile_query(&Query::from("books").select([col("id")]).skip(20).take(10))
            .unwrap();
        let bound = compiled.bind(&dialect).unwrap();
        assert_eq!(
            bound.sql,
            r#"SELECT "id" FROM "books" ORDER BY "id" LIMIT $1 OFFSET $2"#
        );
        assert_eq!(bound.params, vec![Value::Int(10), Value::Int(20)]);
    }

    #[test]
    fn test_mssql_paging() {
        let d = MsSqlDialect::new();
        assert_eq!(
            sql(&d, Query::from("books").select([col("id")]).take(10)),
            "SELECT [id] FROM [books] ORDER BY [id] OFFSET 0 ROWS FETCH NEXT @P1 ROWS ONLY"
        );
        assert_eq!(
            sql(&d, Query::from("events").skip(5)),
            "SELECT [message] FROM [events] ORDER BY (SELECT 1) OFFSET @P1 ROWS"
        );
    }

    #[test]
    fn test_paging_without_key_fails_without_fake_ordering() {
        assert!(error(Query::from("events").take(5)).contains("no primary key"));
    }

    #[test]
    fn test_wildcards_are_escaped_at_bind_time() {
        let dialect = SqliteDialect::new();
        let model = DbModel::from_specs(dialect.types(), &specs());
        let bound = CommandCompiler::new(&model, &dialect)
            .compile_query(&Query::from("books").filter(col("title").contains("50%_off")))
            .unwrap()
            .bind(&dialect)
            .unwrap();
        assert_eq!(bound.params, vec![Value::Text(String::from("%50\\%\\_off%"))]);
    }

    #[test]
    fn test_dml() {
        let d = SqliteDialect::new();
        assert_eq!(
            sql(&d, Insert::into("books").value("title", "TAOCP").value("price", 3)),
            r#"INSERT INTO "books" ("title", "price") VALUES (?, ?)"#
        );
        assert_eq!(
            sql(&d, Update::table("books").set("price", col("price") * 2).filter(col("id").eq(1))),
            r#"UPDATE "books" SET "price" = "price" * ? WHERE "id" = ?"#
        );
        assert_eq!(
            sql(&d, Delete::from("books").filter(related("reviews").exists())),
            r#"DELETE FROM "books" WHERE EXISTS (SELECT 1 FROM "reviews" AS "r$" WHERE "r$"."book_id" = "books"."id")"#
        );
    }

    #[test]
    fn test_translation_errors() {
        assert!(error(Query::from("nope")).contains("unknown table"));
        assert!(error(Query::from("books").filter(col("nope").eq(1))).contains("unknown column"));
        assert!(error(Query::from("books").join("authors").filter(col("id").eq(1))).contains("ambiguous"));
        assert!(error(Query::from("books").last()).contains("order_by"));
        assert!(error(Query::from("books").having(col("price").gt(1))).contains("having without group_by"));
        assert!(error(Query::from("books").take(5).filter(col("price").gt(1))).contains("derived table"));
        assert!(error(Query::from("books").take(5).skip(1)).contains("skip after take"));
        assert!(error(Query::from("books").filter(count_all().gt(1))).contains("aggregates"));
        assert!(error(Query::from("books").select([col("id")]).select([col("title")])).contains("select after select"));
    }

    #[test]
    fn test_cache_shares_statements_across_values() {
        let dialect = SqliteDialect::new();
        let model = DbModel::from_specs(dialect.types(), &specs());
        let cache = StatementCache::new();
        let compiler = CommandCompiler::new(&model, &dialect).with_cache(&cache);
        let a = compiler
            .compile_query(&Query::from("books").filter(col("title").eq("a")))
            .unwrap();
        let b = compiler
            .compile_query(&Query::from("books").filter(col("title").eq("b")))
            .unwrap();
        assert!(Arc::ptr_eq(&a.statement, &b.statement));
        assert_eq!(cache.len(), 1);
        assert_eq!(b.args, vec![Value::Text(String::from("b"))]);
        assert_eq!(b.description, r#"from(books).filter((title = 'b'))"#);
    }
}
