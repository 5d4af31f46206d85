//! Executable statements built from fragments.

use crate::dialect::Dialect;
use crate::error::SqlError;
use crate::query::{ResultProcessor, RowReader};
use crate::value::Value;

use super::{FlatPart, PlaceHolder, PlaceHolderKind, SqlFragment};

/// SQL text plus parameter values, ready for a driver.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCommand {
    /// SQL text with dialect parameter markers.
    pub sql: String,
    /// Parameter values in marker order.
    pub params: Vec<Value>,
}

impl BoundCommand {
    /// A command without parameters.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// A compiled, cacheable statement.
///
/// Holds the fragment tree, the placeholders it references, and how returned
/// rows are shaped. Binding is pure and may happen concurrently.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    /// Fragments in output order.
    pub fragments: Vec<SqlFragment>,
    /// Placeholders referenced by the fragments, ordered by index.
    pub placeholders: Vec<PlaceHolder>,
    /// How rows map to the result shape.
    pub processor: ResultProcessor,
    /// How each row is materialized, for queries.
    pub row_reader: Option<RowReader>,
}

impl SqlStatement {
    /// Creates a statement and registers its placeholders.
    #[must_use]
    pub fn new(fragments: Vec<SqlFragment>, processor: ResultProcessor) -> Self {
        let mut placeholders = Vec::new();
        for fragment in &fragments {
            collect_placeholders(fragment, &mut placeholders);
        }
        placeholders.sort_by_key(|p| p.index);
        placeholders.dedup();
        Self {
            fragments,
            placeholders,
            processor,
            row_reader: None,
        }
    }

    /// Attaches a row reader.
    #[must_use]
    pub fn with_reader(mut self, reader: RowReader) -> Self {
        self.row_reader = Some(reader);
        self
    }

    /// Number of argument values the statement expects.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.placeholders.last().map_or(0, |p| p.index + 1)
    }

    /// SQL text with `{n}` in place of placeholders.
    #[must_use]
    pub fn template_text(&self, dialect: &dyn Dialect) -> String {
        self.fragments
            .iter()
            .map(|f| f.flatten(dialect.precedence_handler()).to_sql_text())
            .collect()
    }

    /// Binds argument values, producing SQL text and the parameter list.
    ///
    /// Parameter placeholders become dialect markers in order of appearance;
    /// value placeholders are rendered inline as literals; column
    /// placeholders are rendered as quoted identifiers.
    ///
    /// # Errors
    ///
    /// Fails when an argument is missing or cannot be rendered.
    pub fn bind(&self, dialect: &dyn Dialect, args: &[Value]) -> Result<BoundCommand, SqlError> {
        let mut sql = String::new();
        let mut params = Vec::new();
        for fragment in &self.fragments {
            let flat = fragment.flatten(dialect.precedence_handler());
            for part in flat.parts {
                match part {
                    FlatPart::Text(text) => sql.push_str(&text),
                    FlatPart::PlaceHolder(p) => {
                        let arg = args.get(p.index).ok_or(SqlError::MissingParameter {
                            index: p.index,
                            supplied: args.len(),
                        })?;
                        let arg = p.transform.map_or_else(|| arg.clone(), |t| t.apply(arg));
                        match p.kind {
                            PlaceHolderKind::Parameter => {
                                params.push(arg);
                                sql.push_str(&dialect.parameter_marker(params.len()));
                            }
                            PlaceHolderKind::Value => {
                                sql.push_str(&dialect.types().literal(&arg)?);
                            }
                            PlaceHolderKind::Column => {
                                let name = arg
                                    .as_str()
                                    .ok_or(SqlError::ColumnPlaceholder { index: p.index })?;
                                sql.push_str(&dialect.quote_identifier(name));
                            }
                        }
                    }
                }
            }
        }
        Ok(BoundCommand { sql, params })
    }
}

fn collect_placeholders(fragment: &SqlFragment, out: &mut Vec<PlaceHolder>) {
    match fragment {
        SqlFragment::Text(_) => {}
        SqlFragment::PlaceHolder(p) => out.push(p.clone()),
        SqlFragment::Composite(c) => {
            for child in &c.children {
                collect_placeholders(child, out);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{PostgresDialect, SqliteDialect};
    use crate::fragment::{Precedence, Template, ValueTransform};

    fn statement() -> SqlStatement {
        let eq = Template::parse("{0} = {1}", Precedence::COMPARISON).unwrap();
        let pred = eq
            .format(vec![SqlFragment::text("\"a\""), SqlFragment::param(1)])
            .unwrap();
        SqlStatement::new(
            vec![
                SqlFragment::text("SELECT * FROM t WHERE "),
                pred,
                SqlFragment::text(" LIMIT "),
                SqlFragment::param(0),
            ],
            ResultProcessor::List,
        )
    }

    #[test]
    fn test_markers_follow_appearance_order() {
        let stmt = statement();
        assert_eq!(stmt.arity(), 2);
        let bound = stmt
            .bind(&PostgresDialect::new(), &[Value::Int(10), Value::Int(7)])
            .unwrap();
        assert_eq!(bound.sql, "SELECT * FROM t WHERE \"a\" = $1 LIMIT $2");
        assert_eq!(bound.params, vec![Value::Int(7), Value::Int(10)]);
    }

    #[test]
    fn test_missing_parameter() {
        let err = statement()
            .bind(&SqliteDialect::new(), &[Value::Int(1)])
            .unwrap_err();
        assert_eq!(
            err,
            SqlError::MissingParameter {
                index: 1,
                supplied: 1
            }
        );
    }

    #[test]
    fn test_value_and_column_placeholders_render_inline() {
        let stmt = SqlStatement::new(
            vec![
                SqlFragment::text("SELECT "),
                SqlFragment::PlaceHolder(PlaceHolder {
                    index: 0,
                    kind: PlaceHolderKind::Column,
                    transform: None,
                }),
                SqlFragment::text(" FROM t WHERE x IN "),
                SqlFragment::PlaceHolder(PlaceHolder {
                    index: 1,
                    kind: PlaceHolderKind::Value,
                    transform: None,
                }),
                SqlFragment::text(" AND y LIKE "),
                SqlFragment::PlaceHolder(PlaceHolder {
                    index: 2,
                    kind: PlaceHolderKind::Parameter,
                    transform: Some(ValueTransform::StartsWith),
                }),
            ],
            ResultProcessor::List,
        );
        let bound = stmt
            .bind(
                &SqliteDialect::new(),
                &[
                    Value::Text(String::from("name")),
                    Value::List(vec![Value::Int(1), Value::Text(String::from("o'k"))]),
                    Value::Text(String::from("ab")),
                ],
            )
            .unwrap();
        assert_eq!(
            bound.sql,
            "SELECT \"name\" FROM t WHERE x IN (1, 'o''k') AND y LIKE ?"
        );
        assert_eq!(bound.params, vec![Value::Text(String::from("ab%"))]);
    }
}
