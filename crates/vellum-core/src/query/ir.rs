//! Dialect-neutral intermediate representation.
//!
//! The translator resolves every name against the schema model and produces
//! these nodes; the builders render them. Nothing here refers back to the DSL.

use crate::fragment::{PlaceHolderKind, ValueTransform};
use crate::model::ObjectName;
use crate::types::HostType;
use crate::value::Value;

use super::command::JoinKind;
use super::expr::{AggregateFunc, BinaryOp, Function, UnaryOp};

/// Identifies one table occurrence within a translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub usize);

/// What a source reads from.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceKind {
    /// A table.
    Table(ObjectName),
    /// A derived table.
    Derived(Box<SelectExpression>),
}

/// One entry of a `FROM` clause.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSource {
    /// Occurrence id.
    pub id: TableId,
    /// What is read.
    pub kind: SourceKind,
    /// Alias, when the translation involves several tables.
    pub alias: Option<String>,
    /// Join type; `None` for the first source.
    pub join: Option<JoinKind>,
    /// Join condition.
    pub on: Option<SqlExpr>,
}

/// A resolved expression.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlExpr {
    /// A column of a source.
    Column {
        /// Source occurrence.
        table: TableId,
        /// Qualifier to render: the source's alias, or the table name in
        /// correlated statements without aliases.
        qualifier: Option<ObjectName>,
        /// Column name.
        name: String,
    },
    /// A placeholder bound from the argument list.
    Param {
        /// Argument index.
        index: usize,
        /// How the argument is rendered.
        kind: PlaceHolderKind,
        /// Rewrite applied to the argument.
        transform: Option<ValueTransform>,
    },
    /// A literal rendered inline.
    Literal(Value),
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<SqlExpr>,
        /// Right operand.
        right: Box<SqlExpr>,
    },
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<SqlExpr>,
    },
    /// `LIKE` with the escape clause.
    Like {
        /// Matched expression.
        operand: Box<SqlExpr>,
        /// Pattern.
        pattern: Box<SqlExpr>,
        /// `NOT LIKE`.
        negated: bool,
    },
    /// `IN (...)`
    InList {
        /// Tested expression.
        operand: Box<SqlExpr>,
        /// The list.
        list: Box<SqlExpr>,
        /// `NOT IN`.
        negated: bool,
    },
    /// A scalar function.
    Function {
        /// Function.
        func: Function,
        /// Arguments.
        args: Vec<SqlExpr>,
    },
    /// An aggregate.
    Aggregate {
        /// Function.
        func: AggregateFunc,
        /// Argument; `COUNT(*)` has none.
        arg: Option<Box<SqlExpr>>,
        /// `DISTINCT` argument.
        distinct: bool,
    },
    /// `EXISTS (sub-query)`
    Exists(Box<SelectExpression>),
    /// A scalar sub-query.
    Subquery(Box<SelectExpression>),
    /// A constant ordering term, for vendors that need `ORDER BY` to page.
    FakeOrder,
}

impl SqlExpr {
    /// Whether an aggregate occurs outside sub-queries.
    #[must_use]
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Self::Aggregate { .. } => true,
            Self::Binary { left, right, .. } => left.contains_aggregate() || right.contains_aggregate(),
            Self::Unary { operand, .. } => operand.contains_aggregate(),
            Self::Like { operand, pattern, .. } => {
                operand.contains_aggregate() || pattern.contains_aggregate()
            }
            Self::InList { operand, list, .. } => operand.contains_aggregate() || list.contains_aggregate(),
            Self::Function { args, .. } => args.iter().any(Self::contains_aggregate),
            Self::Column { .. }
            | Self::Param { .. }
            | Self::Literal(_)
            | Self::Exists(_)
            | Self::Subquery(_)
            | Self::FakeOrder => false,
        }
    }

    /// Whether this expression mentions no column outside aggregates and
    /// sub-queries, other than those in `allowed`.
    pub(crate) fn only_uses(&self, allowed: &[Self]) -> bool {
        if allowed.contains(self) {
            return true;
        }
        match self {
            Self::Column { .. } => false,
            Self::Binary { left, right, .. } => left.only_uses(allowed) && right.only_uses(allowed),
            Self::Unary { operand, .. } => operand.only_uses(allowed),
            Self::Like { operand, pattern, .. } => operand.only_uses(allowed) && pattern.only_uses(allowed),
            Self::InList { operand, list, .. } => operand.only_uses(allowed) && list.only_uses(allowed),
            Self::Function { args, .. } => args.iter().all(|a| a.only_uses(allowed)),
            Self::Aggregate { .. }
            | Self::Param { .. }
            | Self::Literal(_)
            | Self::Exists(_)
            | Self::Subquery(_)
            | Self::FakeOrder => true,
        }
    }
}

/// One projected output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputColumn {
    /// The expression.
    pub expr: SqlExpr,
    /// Output name. Empty for outputs nobody reads by name (`SELECT 1`,
    /// `COUNT(*)`).
    pub name: String,
    /// Host type used to shape values read back.
    pub hint: Option<HostType>,
}

impl OutputColumn {
    /// Whether the output needs an explicit `AS`.
    #[must_use]
    pub fn needs_alias(&self) -> bool {
        match &self.expr {
            _ if self.name.is_empty() => false,
            SqlExpr::Column { name, .. } => *name != self.name,
            _ => true,
        }
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    /// The expression.
    pub expr: SqlExpr,
    /// Descending order.
    pub descending: bool,
}

/// A `SELECT`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectExpression {
    /// `FROM` and joins, in order.
    pub sources: Vec<TableSource>,
    /// Projected outputs.
    pub projection: Vec<OutputColumn>,
    /// `WHERE`
    pub predicate: Option<SqlExpr>,
    /// `GROUP BY`
    pub group_by: Vec<SqlExpr>,
    /// `HAVING`
    pub having: Option<SqlExpr>,
    /// `ORDER BY`
    pub order_by: Vec<OrderItem>,
    /// Rows to skip.
    pub offset: Option<SqlExpr>,
    /// Rows to return.
    pub limit: Option<SqlExpr>,
    /// `SELECT DISTINCT`
    pub distinct: bool,
}

impl SelectExpression {
    /// A select over one source with nothing projected yet.
    #[must_use]
    pub fn new(source: TableSource) -> Self {
        Self {
            sources: vec![source],
            projection: Vec::new(),
            predicate: None,
            group_by: Vec::new(),
            having: None,
            order_by: Vec::new(),
            offset: None,
            limit: None,
            distinct: false,
        }
    }

    /// Whether offset or limit is set.
    #[must_use]
    pub const fn is_paged(&self) -> bool {
        self.offset.is_some() || self.limit.is_some()
    }

    /// Aliases of every source, sub-queries included.
    #[must_use]
    pub fn aliases(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_aliases(&mut out);
        out
    }

    fn collect_aliases<'a>(&'a self, out: &mut Vec<&'a str>) {
        for source in &self.sources {
            if let Some(alias) = &source.alias {
                out.push(alias);
            }
            if let SourceKind::Derived(inner) = &source.kind {
                inner.collect_aliases(out);
            }
            if let Some(on) = &source.on {
                collect_expr_aliases(on, out);
            }
        }
        let exprs = self
            .projection
            .iter()
            .map(|o| &o.expr)
            .chain(self.predicate.iter())
            .chain(self.having.iter())
            .chain(self.group_by.iter())
            .chain(self.order_by.iter().map(|o| &o.expr));
        for expr in exprs {
            collect_expr_aliases(expr, out);
        }
    }
}

fn collect_expr_aliases<'a>(expr: &'a SqlExpr, out: &mut Vec<&'a str>) {
    match expr {
        SqlExpr::Exists(select) | SqlExpr::Subquery(select) => select.collect_aliases(out),
        SqlExpr::Binary { left, right, .. } => {
            collect_expr_aliases(left, out);
            collect_expr_aliases(right, out);
        }
        SqlExpr::Unary { operand, .. } => collect_expr_aliases(operand, out),
        SqlExpr::Like { operand, pattern, .. } => {
            collect_expr_aliases(operand, out);
            collect_expr_aliases(pattern, out);
        }
        SqlExpr::InList { operand, list, .. } => {
            collect_expr_aliases(operand, out);
            collect_expr_aliases(list, out);
        }
        SqlExpr::Function { args, .. } => args.iter().for_each(|a| collect_expr_aliases(a, out)),
        SqlExpr::Aggregate { arg: Some(arg), .. } => collect_expr_aliases(arg, out),
        SqlExpr::Aggregate { arg: None, .. }
        | SqlExpr::Column { .. }
        | SqlExpr::Param { .. }
        | SqlExpr::Literal(_)
        | SqlExpr::FakeOrder => {}
    }
}

/// A resolved single-row `INSERT`.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertExpression {
    /// Target table.
    pub table: ObjectName,
    /// Target columns.
    pub columns: Vec<String>,
    /// Values, parallel to `columns`.
    pub values: Vec<SqlExpr>,
}

/// A resolved `UPDATE`.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateExpression {
    /// Target table.
    pub table: ObjectName,
    /// Column assignments.
    pub assignments: Vec<(String, SqlExpr)>,
    /// Row filter.
    pub predicate: Option<SqlExpr>,
}

/// A resolved `DELETE`.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteExpression {
    /// Target table.
    pub table: ObjectName,
    /// Row filter.
    pub predicate: Option<SqlExpr>,
}
