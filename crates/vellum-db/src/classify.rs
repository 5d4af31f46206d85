//! Classification of native database errors.
//!
//! Drivers report failures as vendor codes and free-form messages. This module
//! maps them onto [`ErrorKind`] so callers can react to a duplicate key or a
//! deadlock without knowing which vendor raised it.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use vellum_core::model::DbModel;
use vellum_core::Vendor;

/// What went wrong, independent of the vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorKind {
    /// A unique index or constraint rejected a row.
    UniqueViolation {
        /// Index or constraint name, when the vendor reports it or the
        /// model resolves it.
        index: Option<String>,
        /// Table name, when known.
        table: Option<String>,
        /// Offending columns, when known.
        columns: Vec<String>,
    },
    /// A foreign key rejected a row.
    ForeignKeyViolation,
    /// The transaction was chosen as a deadlock victim or the database is
    /// locked.
    Deadlock,
    /// The command or the pool wait exceeded its timeout.
    Timeout,
    /// The connection could not be established or was lost.
    Connectivity,
    /// Anything else.
    Other,
}

impl ErrorKind {
    /// A unique violation with nothing but an index name.
    #[must_use]
    pub fn unique(index: impl Into<String>) -> Self {
        Self::UniqueViolation {
            index: Some(index.into()),
            table: None,
            columns: Vec::new(),
        }
    }

    /// Whether retrying the same command may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Deadlock | Self::Timeout | Self::Connectivity)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UniqueViolation { index, table, .. } => {
                f.write_str("unique violation")?;
                if let Some(index) = index {
                    write!(f, " on {index}")?;
                }
                if let Some(table) = table {
                    write!(f, " in {table}")?;
                }
                Ok(())
            }
            Self::ForeignKeyViolation => f.write_str("foreign key violation"),
            Self::Deadlock => f.write_str("deadlock"),
            Self::Timeout => f.write_str("timeout"),
            Self::Connectivity => f.write_str("connectivity failure"),
            Self::Other => f.write_str("database error"),
        }
    }
}

static PG_UNIQUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"duplicate key value violates unique constraint "(?P<index>[^"]+)""#)
        .expect("valid regex")
});

static PG_KEY_DETAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Key \((?P<columns>[^)]+)\)=").expect("valid regex"));

static MSSQL_UNIQUE_INDEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Cannot insert duplicate key row in object '(?P<table>[^']+)' with unique index '(?P<index>[^']+)'",
    )
    .expect("valid regex")
});

static MSSQL_UNIQUE_CONSTRAINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"Violation of (?:UNIQUE KEY|PRIMARY KEY) constraint '(?P<index>[^']+)'\.(?: Cannot insert duplicate key in object '(?P<table>[^']+)')?",
    )
    .expect("valid regex")
});

static MYSQL_UNIQUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Duplicate entry '.*' for key '(?P<index>[^']+)'").expect("valid regex")
});

static SQLITE_UNIQUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:UNIQUE|PRIMARY KEY) constraint failed: (?P<columns>.+)$").expect("valid regex")
});

/// Classifies a vendor error from its code and message.
///
/// Codes are compared as text: SQLSTATE for Postgres, extended result codes
/// for `SQLite`, error numbers for SQL Server and `MySQL`. The message is
/// consulted when the code is missing or ambiguous.
#[must_use]
pub fn classify_message(vendor: Vendor, code: Option<&str>, message: &str) -> ErrorKind {
    if let Some(kind) = parse_unique_violation(vendor, message) {
        return kind;
    }
    let code = code.unwrap_or_default();
    match vendor {
        Vendor::Postgres => match code {
            "23505" => ErrorKind::UniqueViolation {
                index: None,
                table: None,
                columns: Vec::new(),
            },
            "23503" => ErrorKind::ForeignKeyViolation,
            "40P01" | "55P03" => ErrorKind::Deadlock,
            "57014" => ErrorKind::Timeout,
            c if c.starts_with("08") || c == "57P01" => ErrorKind::Connectivity,
            _ => ErrorKind::Other,
        },
        Vendor::Sqlite => match code {
            "2067" | "1555" => ErrorKind::UniqueViolation {
                index: None,
                table: None,
                columns: Vec::new(),
            },
            "787" => ErrorKind::ForeignKeyViolation,
            "5" | "6" | "261" | "262" => ErrorKind::Deadlock,
            "14" => ErrorKind::Connectivity,
            _ if message.contains("FOREIGN KEY constraint failed") => {
                ErrorKind::ForeignKeyViolation
            }
            _ => ErrorKind::Other,
        },
        Vendor::MsSql => match code {
            "2601" | "2627" => ErrorKind::UniqueViolation {
                index: None,
                table: None,
                columns: Vec::new(),
            },
            "547" => ErrorKind::ForeignKeyViolation,
            "1205" => ErrorKind::Deadlock,
            "-2" => ErrorKind::Timeout,
            "53" | "233" | "10054" => ErrorKind::Connectivity,
            _ => ErrorKind::Other,
        },
        Vendor::MySql => match code {
            "1062" | "1586" => ErrorKind::UniqueViolation {
                index: None,
                table: None,
                columns: Vec::new(),
            },
            "1451" | "1452" => ErrorKind::ForeignKeyViolation,
            "1213" | "1205" => ErrorKind::Deadlock,
            "2002" | "2003" | "2006" | "2013" => ErrorKind::Connectivity,
            _ => ErrorKind::Other,
        },
    }
}

/// Extracts the index, table and columns of a unique violation from a vendor
/// message. Returns `None` when the message is not a unique violation.
///
/// ```rust
/// use vellum_core::Vendor;
/// use vellum_db::classify::{parse_unique_violation, ErrorKind};
///
/// let kind = parse_unique_violation(
///     Vendor::MsSql,
///     "Cannot insert duplicate key row in object 'dbo.books' with unique index 'ux_books_isbn'.",
/// );
/// assert_eq!(
///     kind,
///     Some(ErrorKind::UniqueViolation {
///         index: Some("ux_books_isbn".into()),
///         table: Some("dbo.books".into()),
///         columns: vec![],
///     })
/// );
/// ```
#[must_use]
pub fn parse_unique_violation(vendor: Vendor, message: &str) -> Option<ErrorKind> {
    match vendor {
        Vendor::Postgres => {
            let caps = PG_UNIQUE.captures(message)?;
            let columns = PG_KEY_DETAIL
                .captures(message)
                .map(|c| split_list(&c["columns"]))
                .unwrap_or_default();
            Some(ErrorKind::UniqueViolation {
                index: Some(caps["index"].to_string()),
                table: None,
                columns,
            })
        }
        Vendor::MsSql => MSSQL_UNIQUE_INDEX
            .captures(message)
            .or_else(|| MSSQL_UNIQUE_CONSTRAINT.captures(message))
            .map(|caps| ErrorKind::UniqueViolation {
                index: Some(caps["index"].to_string()),
                table: caps.name("table").map(|t| t.as_str().to_string()),
                columns: Vec::new(),
            }),
        Vendor::MySql => {
            let caps = MYSQL_UNIQUE.captures(message)?;
            // MySQL 8 reports `table.index`.
            let (table, index) = match caps["index"].split_once('.') {
                Some((table, index)) => (Some(table.to_string()), index.to_string()),
                None => (None, caps["index"].to_string()),
            };
            Some(ErrorKind::UniqueViolation {
                index: Some(index),
                table,
                columns: Vec::new(),
            })
        }
        Vendor::Sqlite => {
            let caps = SQLITE_UNIQUE.captures(message.trim())?;
            let mut table = None;
            let columns = split_list(&caps["columns"])
                .into_iter()
                .map(|qualified| match qualified.split_once('.') {
                    Some((t, c)) => {
                        table = Some(t.to_string());
                        c.to_string()
                    }
                    None => qualified,
                })
                .collect();
            Some(ErrorKind::UniqueViolation {
                index: None,
                table,
                columns,
            })
        }
    }
}

/// Fills in the index of a unique violation that only names its columns,
/// using the unique indexes (and primary key) the model declares.
#[must_use]
pub fn resolve_unique_index(kind: ErrorKind, model: &DbModel) -> ErrorKind {
    let ErrorKind::UniqueViolation {
        index: None,
        table: Some(table_name),
        columns,
    } = kind
    else {
        return kind;
    };
    let index = model.table(&table_name).and_then(|table| {
        table
            .unique_index_on(&columns)
            .map(|i| i.name.clone())
            .or_else(|| {
                let pk = table.primary_key.as_ref()?;
                let same = pk.columns.len() == columns.len()
                    && pk
                        .columns
                        .iter()
                        .zip(&columns)
                        .all(|(a, b)| a.eq_ignore_ascii_case(b));
                same.then(|| pk.name.clone()).flatten()
            })
    });
    ErrorKind::UniqueViolation {
        index,
        table: Some(table_name),
        columns,
    }
}

/// Classifies a `sqlx` error.
#[must_use]
pub fn classify(vendor: Vendor, error: &sqlx::Error) -> ErrorKind {
    match error {
        sqlx::Error::Database(db) => {
            let kind = classify_message(vendor, db.code().as_deref(), db.message());
            match kind {
                ErrorKind::UniqueViolation {
                    index,
                    table,
                    columns,
                } => ErrorKind::UniqueViolation {
                    index: index.or_else(|| db.constraint().map(ToString::to_string)),
                    table: table.or_else(|| db.table().map(ToString::to_string)),
                    columns,
                },
                ErrorKind::Other => match db.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => ErrorKind::UniqueViolation {
                        index: db.constraint().map(ToString::to_string),
                        table: db.table().map(ToString::to_string),
                        columns: Vec::new(),
                    },
                    sqlx::error::ErrorKind::ForeignKeyViolation => ErrorKind::ForeignKeyViolation,
                    _ => ErrorKind::Other,
                },
                other => other,
            }
        }
        sqlx::Error::PoolTimedOut => ErrorKind::Timeout,
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Protocol(_) => ErrorKind::Connectivity,
        _ => ErrorKind::Other,
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(|s| s.trim().trim_matches('"').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use vellum_core::dialect::{Dialect, SqliteDialect};
    use vellum_core::model::{bigint, varchar, TableSpec};

    use super::*;

    #[test]
    fn test_postgres_unique_violation() {
        let kind = classify_message(
            Vendor::Postgres,
            Some("23505"),
            "duplicate key value violates unique constraint \"ux_books_isbn\"",
        );
        assert_eq!(kind, ErrorKind::unique("ux_books_isbn"));
    }

    #[test]
    fn test_postgres_detail_columns() {
        let kind = parse_unique_violation(
            Vendor::Postgres,
            "duplicate key value violates unique constraint \"ux_pair\"\nDETAIL: Key (a, b)=(1, 2) already exists.",
        );
        assert_eq!(
            kind,
            Some(ErrorKind::UniqueViolation {
                index: Some("ux_pair".into()),
                table: None,
                columns: vec!["a".into(), "b".into()],
            })
        );
    }

    #[test]
    fn test_mssql_unique_constraint() {
        let kind = parse_unique_violation(
            Vendor::MsSql,
            "Violation of UNIQUE KEY constraint 'uq_isbn'. Cannot insert duplicate key in object 'dbo.books'. The duplicate key value is (1).",
        );
        assert_eq!(
            kind,
            Some(ErrorKind::UniqueViolation {
                index: Some("uq_isbn".into()),
                table: Some("dbo.books".into()),
                columns: vec![],
            })
        );
    }

    #[test]
    fn test_mysql_unique_violation() {
        let legacy = parse_unique_violation(
            Vendor::MySql,
            "Duplicate entry 'abc' for key 'ux_books_isbn'",
        );
        assert_eq!(legacy, Some(ErrorKind::unique("ux_books_isbn")));

        let qualified = parse_unique_violation(
            Vendor::MySql,
            "Duplicate entry 'abc' for key 'books.ux_books_isbn'",
        );
        assert_eq!(
            qualified,
            Some(ErrorKind::UniqueViolation {
                index: Some("ux_books_isbn".into()),
                table: Some("books".into()),
                columns: vec![],
            })
        );
    }

    #[test]
    fn test_sqlite_resolves_index_through_model() {
        let dialect = SqliteDialect::new();
        let model = DbModel::from_specs(
            dialect.types(),
            &[TableSpec::new("books")
                .column(bigint("id"))
                .column(varchar("isbn", 20).unique())
                .primary_key(&["id"])],
        );

        let kind = classify_message(
            Vendor::Sqlite,
            Some("2067"),
            "UNIQUE constraint failed: books.isbn",
        );
        assert_eq!(
            resolve_unique_index(kind, &model),
            ErrorKind::UniqueViolation {
                index: Some("ux_books_isbn".into()),
                table: Some("books".into()),
                columns: vec!["isbn".into()],
            }
        );

        let pk = classify_message(Vendor::Sqlite, Some("1555"), "UNIQUE constraint failed: books.id");
        assert!(matches!(
            resolve_unique_index(pk, &model),
            ErrorKind::UniqueViolation { index: Some(ref name), .. } if name == "pk_books"
        ));
    }

    #[test]
    fn test_codes_without_messages() {
        assert_eq!(
            classify_message(Vendor::Postgres, Some("40P01"), "deadlock detected"),
            ErrorKind::Deadlock
        );
        assert_eq!(
            classify_message(Vendor::MsSql, Some("547"), "The INSERT statement conflicted"),
            ErrorKind::ForeignKeyViolation
        );
        assert_eq!(
            classify_message(Vendor::Sqlite, Some("787"), "FOREIGN KEY constraint failed"),
            ErrorKind::ForeignKeyViolation
        );
        assert_eq!(
            classify_message(Vendor::Postgres, Some("08006"), "connection failure"),
            ErrorKind::Connectivity
        );
        assert_eq!(classify_message(Vendor::MySql, None, "syntax"), ErrorKind::Other);
        assert!(ErrorKind::Timeout.is_transient());
        assert!(!ErrorKind::ForeignKeyViolation.is_transient());
    }

    #[test]
    fn test_pool_errors() {
        assert_eq!(classify(Vendor::Sqlite, &sqlx::Error::PoolTimedOut), ErrorKind::Timeout);
        assert_eq!(
            classify(Vendor::Postgres, &sqlx::Error::PoolClosed),
            ErrorKind::Connectivity
        );
    }
}
