//! Queries and data-modification commands.

use std::fmt;

use super::expr::{write_list, Expr, IntoExpr, Ordering, Projection};

/// Join type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
}

/// How the query's rows are reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Terminal {
    /// The first row; fails when there is none.
    First,
    /// The first row, if any.
    FirstOrDefault,
    /// The only row; fails when there is none or more than one.
    Single,
    /// The only row, if any; fails when there is more than one.
    SingleOrDefault,
    /// The last row by the query's ordering; fails when there is none.
    Last,
    /// The last row, if any.
    LastOrDefault,
    /// Number of rows.
    Count,
    /// Whether any row exists.
    Any,
}

impl Terminal {
    const fn name(self) -> &'static str {
        match self {
            Self::First => "first",
            Self::FirstOrDefault => "first_or_default",
            Self::Single => "single",
            Self::SingleOrDefault => "single_or_default",
            Self::Last => "last",
            Self::LastOrDefault => "last_or_default",
            Self::Count => "count",
            Self::Any => "any",
        }
    }
}

/// One step of a query chain.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOp {
    /// Restricts rows.
    Filter(Expr),
    /// Replaces the projection.
    Select(Vec<Projection>),
    /// Adds an ordering term after the existing ones.
    OrderBy(Ordering),
    /// Groups rows.
    GroupBy(Vec<Expr>),
    /// Restricts groups.
    Having(Expr),
    /// Removes duplicate rows.
    Distinct,
    /// Skips rows.
    Skip(Expr),
    /// Limits rows.
    Take(Expr),
    /// Joins another table; without a condition the foreign key between the
    /// tables is used.
    Join {
        /// Join type.
        kind: JoinKind,
        /// Joined table.
        table: String,
        /// Join condition.
        on: Option<Expr>,
    },
}

impl fmt::Display for QueryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter(e) => write!(f, "filter({e})"),
            Self::Select(items) => {
                f.write_str("select(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
            Self::OrderBy(o) => write!(f, "order_by({o})"),
            Self::GroupBy(items) => {
                f.write_str("group_by(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
            Self::Having(e) => write!(f, "having({e})"),
            Self::Distinct => f.write_str("distinct()"),
            Self::Skip(e) => write!(f, "skip({e})"),
            Self::Take(e) => write!(f, "take({e})"),
            Self::Join { kind, table, on } => {
                let name = match kind {
                    JoinKind::Inner => "join",
                    JoinKind::Left => "left_join",
                };
                match on {
                    Some(on) => write!(f, "{name}({table}, {on})"),
                    None => write!(f, "{name}({table})"),
                }
            }
        }
    }
}

/// A query rooted at one table.
///
/// ```rust
/// use vellum_core::query::{Query, col};
///
/// let q = Query::from("books")
///     .filter(col("price").gt(10))
///     .order_by(col("title"))
///     .take(5);
/// assert_eq!(q.to_string(), "from(books).filter((price > 10)).order_by(title).take(5)");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Root table, optionally schema-qualified.
    pub table: String,
    /// Operators in application order.
    pub ops: Vec<QueryOp>,
    /// Reduction applied last.
    pub terminal: Option<Terminal>,
}

impl Query {
    /// Starts a query on a table.
    #[must_use]
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ops: Vec::new(),
            terminal: None,
        }
    }

    fn push(mut self, op: QueryOp) -> Self {
        self.ops.push(op);
        self
    }

    fn terminate(mut self, terminal: Terminal) -> Self {
        self.terminal = Some(terminal);
        self
    }

    /// Restricts rows.
    #[must_use]
    pub fn filter(self, predicate: Expr) -> Self {
        self.push(QueryOp::Filter(predicate))
    }

    /// Sets the projection.
    #[must_use]
    pub fn select<I, P>(self, items: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Projection>,
    {
        self.push(QueryOp::Select(items.into_iter().map(Into::into).collect()))
    }

    /// Orders by an expression or an [`Ordering`]; repeated calls add
    /// secondary terms.
    #[must_use]
    pub fn order_by(self, ordering: impl Into<Ordering>) -> Self {
        self.push(QueryOp::OrderBy(ordering.into()))
    }

    /// Orders descending.
    #[must_use]
    pub fn order_by_desc(self, expr: Expr) -> Self {
        self.push(QueryOp::OrderBy(expr.desc()))
    }

    /// Groups rows.
    #[must_use]
    pub fn group_by(self, exprs: Vec<Expr>) -> Self {
        self.push(QueryOp::GroupBy(exprs))
    }

    /// Restricts groups.
    #[must_use]
    pub fn having(self, predicate: Expr) -> Self {
        self.push(QueryOp::Having(predicate))
    }

    /// Removes duplicate rows.
    #[must_use]
    pub fn distinct(self) -> Self {
        self.push(QueryOp::Distinct)
    }

    /// Skips `count` rows.
    #[must_use]
    pub fn skip(self, count: impl IntoExpr) -> Self {
        self.push(QueryOp::Skip(count.into_expr()))
    }

    /// Returns at most `count` rows.
    #[must_use]
    pub fn take(self, count: impl IntoExpr) -> Self {
        self.push(QueryOp::Take(count.into_expr()))
    }

    /// Inner join along the foreign key between the tables.
    #[must_use]
    pub fn join(self, table: &str) -> Self {
        self.push(QueryOp::Join {
            kind: JoinKind::Inner,
            table: table.to_string(),
            on: None,
        })
    }

    /// Left join along the foreign key between the tables.
    #[must_use]
    pub fn left_join(self, table: &str) -> Self {
        self.push(QueryOp::Join {
            kind: JoinKind::Left,
            table: table.to_string(),
            on: None,
        })
    }

    /// Inner join on an explicit condition.
    #[must_use]
    pub fn join_on(self, table: &str, on: Expr) -> Self {
        self.push(QueryOp::Join {
            kind: JoinKind::Inner,
            table: table.to_string(),
            on: Some(on),
        })
    }

    /// The first row.
    #[must_use]
    pub fn first(self) -> Self {
        self.terminate(Terminal::First)
    }

    /// The first row, if any.
    #[must_use]
    pub fn first_or_default(self) -> Self {
        self.terminate(Terminal::FirstOrDefault)
    }

    /// The only row.
    #[must_use]
    pub fn single(self) -> Self {
        self.terminate(Terminal::Single)
    }

    /// The only row, if any.
    #[must_use]
    pub fn single_or_default(self) -> Self {
        self.terminate(Terminal::SingleOrDefault)
    }

    /// The last row by the query's ordering.
    #[must_use]
    pub fn last(self) -> Self {
        self.terminate(Terminal::Last)
    }

    /// The last row, if any.
    #[must_use]
    pub fn last_or_default(self) -> Self {
        self.terminate(Terminal::LastOrDefault)
    }

    /// Number of rows.
    #[must_use]
    pub fn count(self) -> Self {
        self.terminate(Terminal::Count)
    }

    /// Whether any row exists.
    #[must_use]
    pub fn any(self) -> Self {
        self.terminate(Terminal::Any)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "from({})", self.table)?;
        for op in &self.ops {
            write!(f, ".{op}")?;
        }
        if let Some(t) = self.terminal {
            write!(f, ".{}()", t.name())?;
        }
        Ok(())
    }
}

fn write_assignments(f: &mut fmt::Formatter<'_>, items: &[(String, Expr)]) -> fmt::Result {
    for (i, (column, value)) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{column} = {value}")?;
    }
    Ok(())
}

/// An `INSERT` of one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    /// Target table.
    pub table: String,
    /// Column/value pairs.
    pub values: Vec<(String, Expr)>,
}

impl Insert {
    /// Starts an insert.
    #[must_use]
    pub fn into(table: &str) -> Self {
        Self {
            table: table.to_string(),
            values: Vec::new(),
        }
    }

    /// Sets a column value.
    #[must_use]
    pub fn value(mut self, column: &str, value: impl IntoExpr) -> Self {
        self.values.push((column.to_string(), value.into_expr()));
        self
    }
}

/// An `UPDATE`.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    /// Target table.
    pub table: String,
    /// Assignments.
    pub assignments: Vec<(String, Expr)>,
    /// Row filter; every row when absent.
    pub filter: Option<Expr>,
}

impl Update {
    /// Starts an update.
    #[must_use]
    pub fn table(table: &str) -> Self {
        Self {
            table: table.to_string(),
            assignments: Vec::new(),
            filter: None,
        }
    }

    /// Assigns a column.
    #[must_use]
    pub fn set(mut self, column: &str, value: impl IntoExpr) -> Self {
        self.assignments.push((column.to_string(), value.into_expr()));
        self
    }

    /// Restricts the updated rows; repeated calls are combined with `AND`.
    #[must_use]
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }
}

/// A `DELETE`.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    /// Target table.
    pub table: String,
    /// Row filter; every row when absent.
    pub filter: Option<Expr>,
}

impl Delete {
    /// Starts a delete.
    #[must_use]
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filter: None,
        }
    }

    /// Restricts the deleted rows; repeated calls are combined with `AND`.
    #[must_use]
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }
}

/// Any command the data source executes.
#[derive(Debug, Clone, PartialEq)]
pub enum DbCommand {
    /// A query.
    Select(Query),
    /// A single-row insert.
    Insert(Insert),
    /// An update.
    Update(Update),
    /// A delete.
    Delete(Delete),
}

impl DbCommand {
    /// Table the command is rooted at.
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Select(q) => &q.table,
            Self::Insert(i) => &i.table,
            Self::Update(u) => &u.table,
            Self::Delete(d) => &d.table,
        }
    }
}

impl From<Query> for DbCommand {
    fn from(q: Query) -> Self {
        Self::Select(q)
    }
}

impl From<Insert> for DbCommand {
    fn from(i: Insert) -> Self {
        Self::Insert(i)
    }
}

impl From<Update> for DbCommand {
    fn from(u: Update) -> Self {
        Self::Update(u)
    }
}

impl From<Delete> for DbCommand {
    fn from(d: Delete) -> Self {
        Self::Delete(d)
    }
}

impl fmt::Display for DbCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select(q) => write!(f, "{q}"),
            Self::Insert(i) => {
                write!(f, "insert({}, ", i.table)?;
                write_assignments(f, &i.values)?;
                f.write_str(")")
            }
            Self::Update(u) => {
                write!(f, "update({}, ", u.table)?;
                write_assignments(f, &u.assignments)?;
                f.write_str(")")?;
                match &u.filter {
                    Some(p) => write!(f, ".filter({p})"),
                    None => Ok(()),
                }
            }
            Self::Delete(d) => {
                write!(f, "delete({})", d.table)?;
                match &d.filter {
                    Some(p) => write!(f, ".filter({p})"),
                    None => Ok(()),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::col;

    #[test]
    fn test_query_display() {
        let q = Query::from("books")
            .join("authors")
            .filter(col("authors.name").eq("Knuth"))
            .order_by_desc(col("books.year"))
            .skip(10)
            .first();
        assert_eq!(
            q.to_string(),
            "from(books).join(authors).filter((authors.name = 'Knuth'))\
             .order_by(books.year desc).skip(10).first()"
        );
    }

    #[test]
    fn test_command_display() {
        let cmd: DbCommand = Update::table("books")
            .set("price", col("price") * 2)
            .filter(col("id").eq(1))
            .into();
        assert_eq!(cmd.to_string(), "update(books, price = (price * 2)).filter((id = 1))");
        assert_eq!(cmd.table(), "books");
    }
}
