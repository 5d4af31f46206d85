//! Literal extraction.
//!
//! Every non-NULL literal in a command becomes [`Expr::Param`], with the value
//! moved to an argument list. The parameterized command's display string is
//! then independent of literal values and serves as the statement cache key.
//! NULL literals stay inline because they change the SQL shape (`IS NULL`).

use crate::value::Value;

use super::command::{DbCommand, Delete, Insert, Query, QueryOp, Update};
use super::expr::{Expr, Ordering, Projection};

/// A command with its literals extracted.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameterized<T> {
    /// The command, literals replaced by parameters.
    pub command: T,
    /// Extracted values, by parameter index.
    pub values: Vec<Value>,
}

#[derive(Default)]
struct Extractor {
    values: Vec<Value>,
}

impl Extractor {
    fn expr(&mut self, expr: &Expr) -> Expr {
        match expr {
            Expr::Literal(Value::Null) | Expr::Column { .. } | Expr::Param(_) => expr.clone(),
            Expr::Literal(v) => {
                self.values.push(v.clone());
                Expr::Param(self.values.len() - 1)
            }
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(self.expr(left)),
                right: Box::new(self.expr(right)),
            },
            Expr::Unary { op, operand } => Expr::Unary {
                op: *op,
                operand: Box::new(self.expr(operand)),
            },
            Expr::Like {
                operand,
                pattern,
                transform,
                negated,
            } => Expr::Like {
                operand: Box::new(self.expr(operand)),
                pattern: Box::new(self.expr(pattern)),
                transform: *transform,
                negated: *negated,
            },
            Expr::InList {
                operand,
                list,
                negated,
            } => Expr::InList {
                operand: Box::new(self.expr(operand)),
                list: Box::new(self.expr(list)),
                negated: *negated,
            },
            Expr::Function { func, args } => Expr::Function {
                func: *func,
                args: args.iter().map(|a| self.expr(a)).collect(),
            },
            Expr::Aggregate { func, arg, distinct } => Expr::Aggregate {
                func: *func,
                arg: arg.as_ref().map(|a| Box::new(self.expr(a))),
                distinct: *distinct,
            },
            Expr::Related {
                table,
                kind,
                predicate,
            } => Expr::Related {
                table: table.clone(),
                kind: *kind,
                predicate: predicate.as_ref().map(|p| Box::new(self.expr(p))),
            },
        }
    }

    fn op(&mut self, op: &QueryOp) -> QueryOp {
        match op {
            QueryOp::Filter(e) => QueryOp::Filter(self.expr(e)),
            QueryOp::Select(items) => QueryOp::Select(
                items
                    .iter()
                    .map(|p| Projection {
                        expr: self.expr(&p.expr),
                        alias: p.alias.clone(),
                    })
                    .collect(),
            ),
            QueryOp::OrderBy(o) => QueryOp::OrderBy(Ordering {
                expr: self.expr(&o.expr),
                descending: o.descending,
            }),
            QueryOp::GroupBy(items) => QueryOp::GroupBy(items.iter().map(|e| self.expr(e)).collect()),
            QueryOp::Having(e) => QueryOp::Having(self.expr(e)),
            QueryOp::Distinct => QueryOp::Distinct,
            QueryOp::Skip(e) => QueryOp::Skip(self.expr(e)),
            QueryOp::Take(e) => QueryOp::Take(self.expr(e)),
            QueryOp::Join { kind, table, on } => QueryOp::Join {
                kind: *kind,
                table: table.clone(),
                on: on.as_ref().map(|e| self.expr(e)),
            },
        }
    }

    fn query(&mut self, query: &Query) -> Query {
        Query {
            table: query.table.clone(),
            ops: query.ops.iter().map(|op| self.op(op)).collect(),
            terminal: query.terminal,
        }
    }

    fn pairs(&mut self, pairs: &[(String, Expr)]) -> Vec<(String, Expr)> {
        pairs
            .iter()
            .map(|(column, value)| (column.clone(), self.expr(value)))
            .collect()
    }

    fn command(&mut self, command: &DbCommand) -> DbCommand {
        match command {
            DbCommand::Select(q) => DbCommand::Select(self.query(q)),
            DbCommand::Insert(i) => DbCommand::Insert(Insert {
                table: i.table.clone(),
                values: self.pairs(&i.values),
            }),
            DbCommand::Update(u) => DbCommand::Update(Update {
                table: u.table.clone(),
                assignments: self.pairs(&u.assignments),
                filter: u.filter.as_ref().map(|p| self.expr(p)),
            }),
            DbCommand::Delete(d) => DbCommand::Delete(Delete {
                table: d.table.clone(),
                filter: d.filter.as_ref().map(|p| self.expr(p)),
            }),
        }
    }
}

/// Extracts the literals of a query.
#[must_use]
pub fn parameterize_query(query: &Query) -> Parameterized<Query> {
    let mut extractor = Extractor::default();
    let command = extractor.query(query);
    Parameterized {
        command,
        values: extractor.values,
    }
}

/// Extracts the literals of any command.
#[must_use]
pub fn parameterize(command: &DbCommand) -> Parameterized<DbCommand> {
    let mut extractor = Extractor::default();
    let command = extractor.command(command);
    Parameterized {
        command,
        values: extractor.values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::col;

    #[test]
    fn test_shapes_match_across_values() {
        let a = parameterize_query(&Query::from("books").filter(col("title").eq("x")).take(5));
        let b = parameterize_query(&Query::from("books").filter(col("title").eq("y")).take(50));
        assert_eq!(a.command.to_string(), b.command.to_string());
        assert_eq!(a.command.to_string(), "from(books).filter((title = @0)).take(@1)");
        assert_eq!(b.values, vec![Value::Text(String::from("y")), Value::Int(50)]);
    }

    #[test]
    fn test_null_stays_inline() {
        let p = parameterize_query(&Query::from("books").filter(col("isbn").eq(Value::Null)));
        assert!(p.values.is_empty());
        assert_eq!(p.command.to_string(), "from(books).filter((isbn = null))");
    }
}
