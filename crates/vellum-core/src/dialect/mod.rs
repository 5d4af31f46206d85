//! SQL dialects.
//!
//! A dialect knows how one vendor spells things: identifier quoting,
//! parameter markers, operator templates, paging, literal rendering (through
//! its [`TypeRegistry`]) and DDL (through [`DdlDialect`]). Dialects only change
//! rendering; translation and script ordering are shared.

mod ddl;
mod features;
mod mssql;
mod postgres;
mod sqlite;
mod templates;

pub use ddl::DdlDialect;
pub use features::Features;
pub use mssql::MsSqlDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;
pub use templates::SqlTemplates;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::fragment::{Composite, Precedence, PrecedenceHandler, SqlFragment, StandardPrecedence};
use crate::model::ObjectName;
use crate::types::TypeRegistry;

/// Database vendor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Vendor {
    /// `SQLite`
    Sqlite,
    /// `PostgreSQL`
    Postgres,
    /// Microsoft SQL Server
    #[serde(rename = "mssql")]
    MsSql,
    /// `MySQL` (error classification only)
    #[serde(rename = "mysql")]
    MySql,
}

impl Vendor {
    /// The dialect for this vendor, if SQL generation is supported.
    #[must_use]
    pub fn dialect(self) -> Option<&'static dyn DdlDialect> {
        static SQLITE: SqliteDialect = SqliteDialect::new();
        static POSTGRES: PostgresDialect = PostgresDialect::new();
        static MSSQL: MsSqlDialect = MsSqlDialect::new();
        match self {
            Self::Sqlite => Some(&SQLITE),
            Self::Postgres => Some(&POSTGRES),
            Self::MsSql => Some(&MSSQL),
            Self::MySql => None,
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Sqlite => "sqlite",
            Self::Postgres => "postgres",
            Self::MsSql => "mssql",
            Self::MySql => "mysql",
        })
    }
}

impl FromStr for Vendor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mssql" | "sqlserver" => Ok(Self::MsSql),
            "mysql" => Ok(Self::MySql),
            other => Err(format!("unknown vendor '{other}'")),
        }
    }
}

/// Trait for SQL dialect-specific behavior.
pub trait Dialect: Send + Sync {
    /// Returns the name of the dialect.
    fn name(&self) -> &'static str;

    /// Returns the vendor.
    fn vendor(&self) -> Vendor;

    /// Returns the vendor's capabilities.
    fn features(&self) -> Features;

    /// Returns the vendor's type registry.
    fn types(&self) -> &TypeRegistry;

    /// Returns the expression templates.
    fn templates(&self) -> &SqlTemplates;

    /// Returns the opening and closing identifier quote characters.
    fn identifier_quotes(&self) -> (char, char) {
        ('"', '"')
    }

    /// Quotes an identifier, doubling embedded closing quotes.
    fn quote_identifier(&self, name: &str) -> String {
        let (open, close) = self.identifier_quotes();
        let escaped = name.replace(close, &format!("{close}{close}"));
        format!("{open}{escaped}{close}")
    }

    /// Quotes a possibly schema-qualified name.
    fn quote_name(&self, name: &ObjectName) -> String {
        match &name.schema {
            Some(schema) if self.features().contains(Features::SCHEMAS) => format!(
                "{}.{}",
                self.quote_identifier(schema),
                self.quote_identifier(&name.name)
            ),
            _ => self.quote_identifier(&name.name),
        }
    }

    /// Returns the marker for the 1-based parameter `position`.
    fn parameter_marker(&self, position: usize) -> String {
        let _ = position;
        String::from("?")
    }

    /// Returns the precedence handler used when flattening fragments.
    fn precedence_handler(&self) -> &dyn PrecedenceHandler {
        &StandardPrecedence
    }

    /// Renders the paging clause, including its leading space.
    fn paging(&self, offset: Option<SqlFragment>, limit: Option<SqlFragment>) -> Option<SqlFragment> {
        let mut children = Vec::new();
        if let Some(limit) = limit {
            children.push(SqlFragment::text(" LIMIT "));
            children.push(limit);
        }
        if let Some(offset) = offset {
            children.push(SqlFragment::text(" OFFSET "));
            children.push(offset);
        }
        clause(children)
    }

    /// Returns the separator written between scripts in exported files.
    fn batch_separator(&self) -> &'static str {
        ";"
    }

    /// Returns the schema objects live in when none is given.
    fn default_schema(&self) -> Option<&'static str> {
        None
    }
}

/// Wraps clause children in a lowest-precedence composite.
pub(crate) fn clause(children: Vec<SqlFragment>) -> Option<SqlFragment> {
    if children.is_empty() {
        None
    } else {
        Some(SqlFragment::Composite(Composite {
            children,
            precedence: Precedence::LOWEST,
            associative: true,
        }))
    }
}
