//! SQL builders.
//!
//! Render translated commands into fragment trees. The builders only read
//! the dialect: operator spellings come from its templates, literals from its
//! type registry, paging from [`Dialect::paging`].
//!
//! # Example
//!
//! ```rust
//! use vellum_core::builder::SqlBuilder;
//! use vellum_core::dialect::{Dialect, PostgresDialect};
//! use vellum_core::model::{DbModel, TableSpec, bigint, text};
//! use vellum_core::query::{Query, Translator, col, parameterize_query};
//!
//! let dialect = PostgresDialect::new();
//! let model = DbModel::from_specs(
//!     dialect.types(),
//!     &[TableSpec::new("books")
//!         .column(bigint("id"))
//!         .column(text("title"))
//!         .primary_key(&["id"])],
//! );
//! let query = parameterize_query(&Query::from("books").filter(col("id").eq(3)));
//! let translated = Translator::new(&model, &dialect, "books by id")
//!     .translate_query(&query.command)
//!     .unwrap();
//! let statement = SqlBuilder::new(&dialect).query(&translated).unwrap();
//! let bound = statement.bind(&dialect, &query.values).unwrap();
//!
//! assert_eq!(
//!     bound.sql,
//!     "SELECT \"id\", \"title\" FROM \"books\" WHERE \"id\" = $1"
//! );
//! ```

mod delete;
mod expr;
mod insert;
mod select;
mod update;

use crate::dialect::Dialect;
use crate::error::SqlError;
use crate::fragment::{Composite, Precedence, SqlFragment, SqlStatement};
use crate::query::{ResultProcessor, TranslatedCommand, TranslatedQuery};

/// Renders IR for one dialect.
#[derive(Clone, Copy)]
pub struct SqlBuilder<'d> {
    dialect: &'d dyn Dialect,
}

impl<'d> SqlBuilder<'d> {
    /// Creates a builder.
    #[must_use]
    pub const fn new(dialect: &'d dyn Dialect) -> Self {
        Self { dialect }
    }

    /// The dialect rendered for.
    #[must_use]
    pub const fn dialect(&self) -> &'d dyn Dialect {
        self.dialect
    }

    /// Builds the statement for any translated command.
    ///
    /// # Errors
    ///
    /// Fails when a literal or construct cannot be rendered.
    pub fn build(&self, command: &TranslatedCommand) -> Result<SqlStatement, SqlError> {
        match command {
            TranslatedCommand::Select(q) => self.query(q),
            TranslatedCommand::Insert(i) => Ok(non_query(self.insert(i)?)),
            TranslatedCommand::Update(u) => Ok(non_query(self.update(u)?)),
            TranslatedCommand::Delete(d) => Ok(non_query(self.delete(d)?)),
        }
    }

    /// Builds a query statement with its row reader attached.
    ///
    /// # Errors
    ///
    /// Fails when a literal or construct cannot be rendered.
    pub fn query(&self, query: &TranslatedQuery) -> Result<SqlStatement, SqlError> {
        Ok(
            SqlStatement::new(vec![self.select(&query.select)?], query.processor)
                .with_reader(query.row_reader.clone()),
        )
    }

    fn name(&self, name: &crate::model::ObjectName) -> SqlFragment {
        SqlFragment::text(self.dialect.quote_name(name))
    }

    fn identifier(&self, name: &str) -> SqlFragment {
        SqlFragment::text(self.dialect.quote_identifier(name))
    }
}

fn non_query(fragment: SqlFragment) -> SqlStatement {
    SqlStatement::new(vec![fragment], ResultProcessor::NonQuery)
}

/// A statement-level composite; its children never get parentheses.
fn statement(children: Vec<SqlFragment>) -> SqlFragment {
    SqlFragment::Composite(Composite {
        children,
        precedence: Precedence::LOWEST,
        associative: true,
    })
}
