//! Entity declarations.
//!
//! `#[derive(Entity)]` implements [`Entity`] for a struct with named fields,
//! producing the declared table and typed column accessors.
//!
//! ```rust
//! use vellum_core::Entity;
//!
//! #[derive(Debug, Clone, PartialEq, Entity)]
//! #[entity(table = "books")]
//! pub struct Book {
//!     #[column(primary_key, identity)]
//!     pub id: i64,
//!     #[column(size = 200)]
//!     pub title: String,
//!     pub isbn: Option<String>,
//! }
//!
//! let query = Book::query().filter(Book::title().starts_with("c#"));
//! assert_eq!(query.to_string(), "from(books).filter(books.title.starts_with('c#'))");
//!
//! let table = Book::table_spec().unwrap();
//! assert_eq!(table.name().name, "books");
//! ```

use std::fmt;
use std::marker::PhantomData;

use crate::error::{Error, ResultError};
use crate::model::{ColumnSpec, TableSpec};
use crate::query::{col_of, Expr, Insert, IntoExpr, Ordering, Query, Record};
use crate::types::HostType;
use crate::value::{ToSqlValue, Value};

/// Column metadata generated by the derive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSchema {
    /// Column name.
    pub name: &'static str,
    /// Field type as written, whitespace removed.
    pub rust_type: &'static str,
    /// Whether the column accepts NULL.
    pub nullable: bool,
    /// Part of the primary key.
    pub primary_key: bool,
    /// Backed by a unique index.
    pub unique: bool,
    /// Database-generated.
    pub identity: bool,
    /// Raw SQL default expression.
    pub default_expr: Option<&'static str>,
    /// Maximum length for sized types.
    pub size: Option<u32>,
    /// Referenced `(table, column)`.
    pub references: Option<(&'static str, &'static str)>,
    /// Former column name.
    pub renamed_from: Option<&'static str>,
}

impl ColumnSchema {
    /// The column declaration.
    ///
    /// # Errors
    ///
    /// [`Error::Schema`] when the field type has no host type.
    pub fn spec(&self) -> Result<ColumnSpec, Error> {
        let host = HostType::from_rust_type(self.rust_type).ok_or_else(|| {
            Error::Schema(format!(
                "column `{}` has unsupported type `{}`",
                self.name, self.rust_type
            ))
        })?;
        let mut spec = ColumnSpec::new(self.name, host);
        spec = if self.nullable {
            spec.nullable()
        } else {
            spec.not_null()
        };
        if self.primary_key {
            spec = spec.primary_key();
        }
        if self.unique {
            spec = spec.unique();
        }
        if self.identity {
            spec = spec.identity();
        }
        if let Some(size) = self.size {
            spec = spec.size(size);
        }
        if let Some(expr) = self.default_expr {
            spec = spec.default_expr(expr);
        }
        if let Some((table, column)) = self.references {
            spec = spec.references(table, column);
        }
        if let Some(old) = self.renamed_from {
            spec = spec.renamed_from(old);
        }
        Ok(spec)
    }
}

/// A struct mapped to a table.
pub trait Entity: Sized {
    /// Table name.
    const TABLE: &'static str;

    /// Schema, when not the vendor default.
    const SCHEMA: Option<&'static str>;

    /// Columns in field order.
    const COLUMNS: &'static [ColumnSchema];

    /// Builds an entity from a returned row.
    ///
    /// # Errors
    ///
    /// Fails when a column is missing or does not convert.
    fn from_record(record: &Record) -> Result<Self, ResultError>;

    /// Column values in field order.
    fn to_values(&self) -> Vec<(&'static str, Value)>;

    /// Table name as the query DSL addresses it.
    #[must_use]
    fn qualified_table() -> String {
        Self::SCHEMA.map_or_else(|| Self::TABLE.to_string(), |s| format!("{s}.{}", Self::TABLE))
    }

    /// The declared table.
    ///
    /// # Errors
    ///
    /// [`Error::Schema`] when a field type is not supported.
    fn table_spec() -> Result<TableSpec, Error> {
        Self::COLUMNS
            .iter()
            .try_fold(TableSpec::new(&Self::qualified_table()), |table, c| {
                Ok(table.column(c.spec()?))
            })
    }

    /// A query over the entity's table.
    #[must_use]
    fn query() -> Query {
        Query::from(&Self::qualified_table())
    }

    /// An insert of this entity; identity columns are left to the database.
    #[must_use]
    fn insert(&self) -> Insert {
        self.to_values()
            .into_iter()
            .filter(|(name, _)| {
                !Self::COLUMNS
                    .iter()
                    .any(|c| c.identity && c.name == *name)
            })
            .fold(Insert::into(&Self::qualified_table()), |insert, (name, value)| {
                insert.value(name, value)
            })
    }
}

/// A typed column of entity `E` holding `T`.
pub struct Field<E, T> {
    name: &'static str,
    _marker: PhantomData<fn() -> (E, T)>,
}

impl<E, T> Clone for Field<E, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, T> Copy for Field<E, T> {}

impl<E, T> fmt::Debug for Field<E, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Field").field(&self.name).finish()
    }
}

impl<E: Entity, T> Field<E, T> {
    /// Creates the accessor for column `name`.
    #[must_use]
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    /// Column name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        self.name
    }

    /// The column, qualified by its table.
    #[must_use]
    pub fn expr(self) -> Expr {
        col_of(E::TABLE, self.name)
    }

    /// `column = value`
    #[must_use]
    pub fn eq(self, value: impl Into<T>) -> Expr
    where
        T: ToSqlValue,
    {
        self.expr().eq(value.into())
    }

    /// `column <> value`
    #[must_use]
    pub fn not_eq(self, value: impl Into<T>) -> Expr
    where
        T: ToSqlValue,
    {
        self.expr().not_eq(value.into())
    }

    /// `column < value`
    #[must_use]
    pub fn lt(self, value: impl Into<T>) -> Expr
    where
        T: ToSqlValue,
    {
        self.expr().lt(value.into())
    }

    /// `column > value`
    #[must_use]
    pub fn gt(self, value: impl Into<T>) -> Expr
    where
        T: ToSqlValue,
    {
        self.expr().gt(value.into())
    }

    /// `column IN (...)`
    #[must_use]
    pub fn in_list(self, values: Vec<T>) -> Expr
    where
        T: ToSqlValue,
    {
        self.expr().in_list(values)
    }

    /// `column IS NULL`
    #[must_use]
    pub fn is_null(self) -> Expr {
        self.expr().is_null()
    }

    /// Ascending ordering.
    #[must_use]
    pub fn asc(self) -> Ordering {
        self.expr().asc()
    }

    /// Descending ordering.
    #[must_use]
    pub fn desc(self) -> Ordering {
        self.expr().desc()
    }
}

impl<E: Entity> Field<E, String> {
    /// Prefix match.
    #[must_use]
    pub fn starts_with(self, prefix: &str) -> Expr {
        self.expr().starts_with(prefix)
    }

    /// Suffix match.
    #[must_use]
    pub fn ends_with(self, suffix: &str) -> Expr {
        self.expr().ends_with(suffix)
    }

    /// Substring match.
    #[must_use]
    pub fn contains(self, needle: &str) -> Expr {
        self.expr().contains(needle)
    }
}

impl<E: Entity, T> IntoExpr for Field<E, T> {
    fn into_expr(self) -> Expr {
        self.expr()
    }
}

impl<E: Entity, T> From<Field<E, T>> for Expr {
    fn from(field: Field<E, T>) -> Self {
        field.expr()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dialect::{Dialect, SqliteDialect};
    use crate::model::DbModel;
    use crate::query::{ReaderColumn, RowReader};

    #[derive(Debug, Clone, PartialEq, crate::Entity)]
    #[entity(table = "book_reviews")]
    struct BookReview {
        #[column(primary_key, identity)]
        id: i64,
        #[column(references = "books.id")]
        book_id: i64,
        #[column(size = 2000, renamed_from = "body")]
        text: String,
        rating: Option<i32>,
    }

    #[test]
    fn test_derive_declares_the_table() {
        assert_eq!(BookReview::TABLE, "book_reviews");
        let names: Vec<_> = BookReview::COLUMNS.iter().map(|c| c.name).collect();
        assert_eq!(names, ["id", "book_id", "text", "rating"]);
        assert!(BookReview::COLUMNS[3].nullable);
        assert!(!BookReview::COLUMNS[2].nullable);

        let dialect = SqliteDialect::new();
        let model = DbModel::from_specs(dialect.types(), &[BookReview::table_spec().unwrap()]);
        let table = model.table("book_reviews").unwrap();
        assert_eq!(table.primary_key_columns(), ["id"]);
        assert_eq!(table.foreign_keys.len(), 1);
        assert_eq!(table.column("text").unwrap().renamed_from, ["body"]);
    }

    #[test]
    fn test_record_round_trip() {
        let review = BookReview {
            id: 1,
            book_id: 7,
            text: String::from("great"),
            rating: None,
        };
        let reader = RowReader::new(
            BookReview::COLUMNS
                .iter()
                .map(|c| ReaderColumn {
                    name: c.name.to_string(),
                    hint: HostType::from_rust_type(c.rust_type),
                })
                .collect(),
        );
        let values = review.to_values().into_iter().map(|(_, v)| v).collect();
        let record = reader.read(values);
        assert_eq!(BookReview::from_record(&record).unwrap(), review);
    }

    #[test]
    fn test_insert_skips_identity() {
        let review = BookReview {
            id: 0,
            book_id: 7,
            text: String::from("ok"),
            rating: Some(4),
        };
        assert_eq!(
            crate::query::DbCommand::from(review.insert()).to_string(),
            "insert(book_reviews, book_id = 7, text = 'ok', rating = 4)"
        );
    }

    #[test]
    fn test_typed_fields() {
        let query = BookReview::query()
            .filter(BookReview::rating().eq(5).and(BookReview::text().contains("x")))
            .order_by(BookReview::id().desc());
        assert_eq!(
            query.to_string(),
            "from(book_reviews).filter(((book_reviews.rating = 5) AND book_reviews.text.contains('x'))).order_by(book_reviews.id desc)"
        );
    }
}
