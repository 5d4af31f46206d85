//! Result shaping.

use std::sync::Arc;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::error::ResultError;
use crate::types::HostType;
use crate::value::{FromSqlValue, Value};

/// One returned row.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Record {
    /// Creates a record. `values` is parallel to `columns`.
    #[must_use]
    pub const fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in column order.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Consumes the record into its values.
    #[must_use]
    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// The raw value of a column. Lookup ignores case.
    #[must_use]
    pub fn value(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|i| self.values.get(i))
    }

    /// A column value converted to `T`.
    ///
    /// # Errors
    ///
    /// Fails when the column is missing or its value does not convert.
    pub fn get<T: FromSqlValue>(&self, column: &str) -> Result<T, ResultError> {
        let value = self.value(column).ok_or_else(|| ResultError::MissingColumn {
            column: column.to_string(),
        })?;
        T::from_sql_value(value).ok_or_else(|| ResultError::Conversion {
            column: column.to_string(),
            value: format!("{value:?}"),
            target: std::any::type_name::<T>(),
        })
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// One column a [`RowReader`] produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderColumn {
    /// Output name.
    pub name: String,
    /// Host type the raw value is coerced to.
    pub hint: Option<HostType>,
}

/// Materializes raw driver rows into [`Record`]s.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowReader {
    hints: Vec<Option<HostType>>,
    names: Arc<[String]>,
}

impl RowReader {
    /// Creates a reader for the given output columns.
    #[must_use]
    pub fn new(columns: Vec<ReaderColumn>) -> Self {
        let hints = columns.iter().map(|c| c.hint).collect();
        let names = columns.into_iter().map(|c| c.name).collect();
        Self { hints, names }
    }

    /// Output column names.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Shapes one row of raw values.
    ///
    /// Values are coerced to their column's host type; columns beyond the
    /// reader's width keep their raw value.
    #[must_use]
    pub fn read(&self, raw: Vec<Value>) -> Record {
        let values = raw
            .into_iter()
            .enumerate()
            .map(|(i, v)| match self.hints.get(i).copied().flatten() {
                Some(host) => host.coerce(v),
                None => v,
            })
            .collect();
        Record::new(Arc::clone(&self.names), values)
    }
}

/// Result of executing a command.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    /// All rows.
    Rows(Vec<Record>),
    /// At most one row.
    Row(Option<Record>),
    /// A single value.
    Scalar(Value),
    /// Rows affected by a non-query.
    Affected(u64),
}

impl QueryResult {
    /// The rows, whatever the shape.
    #[must_use]
    pub fn into_rows(self) -> Vec<Record> {
        match self {
            Self::Rows(rows) => rows,
            Self::Row(row) => row.into_iter().collect(),
            Self::Scalar(_) | Self::Affected(_) => Vec::new(),
        }
    }

    /// The single row, for `first`/`single`/`last` queries.
    #[must_use]
    pub fn into_row(self) -> Option<Record> {
        match self {
            Self::Row(row) => row,
            Self::Rows(rows) => rows.into_iter().next(),
            Self::Scalar(_) | Self::Affected(_) => None,
        }
    }

    /// The scalar value, for `count`/`any` queries.
    #[must_use]
    pub const fn scalar(&self) -> Option<&Value> {
        match self {
            Self::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// Affected row count; zero for queries.
    #[must_use]
    pub const fn affected(&self) -> u64 {
        match self {
            Self::Affected(n) => *n,
            _ => 0,
        }
    }
}

/// How rows map to a [`QueryResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultProcessor {
    /// Every row.
    List,
    /// The first row.
    First {
        /// No row is not an error.
        or_default: bool,
    },
    /// Exactly one row.
    Single {
        /// No row is not an error.
        or_default: bool,
    },
    /// The first column of the first row.
    Scalar,
    /// Whether any row came back.
    Exists,
    /// A command returning an affected-row count.
    NonQuery,
}

impl ResultProcessor {
    /// Whether the command returns rows.
    #[must_use]
    pub const fn returns_rows(self) -> bool {
        !matches!(self, Self::NonQuery)
    }

    /// Shapes returned rows.
    ///
    /// # Errors
    ///
    /// [`ResultError::NoRows`] when a required row is missing,
    /// [`ResultError::MultipleRows`] when `single` sees more than one row and
    /// [`ResultError::NoScalar`] when a scalar query returns nothing.
    pub fn process(self, rows: Vec<Record>, command: &str) -> Result<QueryResult, ResultError> {
        let no_rows = || ResultError::NoRows {
            command: command.to_string(),
        };
        match self {
            Self::List => Ok(QueryResult::Rows(rows)),
            Self::First { or_default } => match rows.into_iter().next() {
                Some(row) => Ok(QueryResult::Row(Some(row))),
                None if or_default => Ok(QueryResult::Row(None)),
                None => Err(no_rows()),
            },
            Self::Single { or_default } => {
                let mut rows = rows.into_iter();
                match (rows.next(), rows.next()) {
                    (Some(_), Some(_)) => Err(ResultError::MultipleRows {
                        command: command.to_string(),
                    }),
                    (Some(row), None) => Ok(QueryResult::Row(Some(row))),
                    (None, _) if or_default => Ok(QueryResult::Row(None)),
                    (None, _) => Err(no_rows()),
                }
            }
            Self::Scalar => rows
                .into_iter()
                .next()
                .and_then(|row| row.into_values().into_iter().next())
                .map(QueryResult::Scalar)
                .ok_or_else(|| ResultError::NoScalar {
                    command: command.to_string(),
                }),
            Self::Exists => Ok(QueryResult::Scalar(Value::Bool(!rows.is_empty()))),
            Self::NonQuery => Ok(QueryResult::Affected(0)),
        }
    }
}
