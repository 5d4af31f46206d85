//! Expression rendering.

use crate::error::SqlError;
use crate::fragment::{PlaceHolder, SqlFragment, Template};
use crate::query::{AggregateFunc, BinaryOp, Function, SqlExpr, UnaryOp};

use super::SqlBuilder;

impl SqlBuilder<'_> {
    /// Renders one expression.
    ///
    /// # Errors
    ///
    /// Fails when a literal cannot be rendered or the dialect lacks the
    /// construct.
    pub fn expr(&self, expr: &SqlExpr) -> Result<SqlFragment, SqlError> {
        let t = self.dialect.templates();
        match expr {
            SqlExpr::Column {
                qualifier, name, ..
            } => {
                let column = self.identifier(name);
                match qualifier {
                    Some(q) => t.qualified.format(vec![self.name(q), column]),
                    None => Ok(column),
                }
            }
            SqlExpr::Param {
                index,
                kind,
                transform,
            } => Ok(SqlFragment::PlaceHolder(PlaceHolder {
                index: *index,
                kind: *kind,
                transform: *transform,
            })),
            SqlExpr::Literal(v) => Ok(SqlFragment::text(self.dialect.types().literal(v)?)),
            SqlExpr::Binary { op, left, right } => {
                let template = match op {
                    BinaryOp::Eq => &t.eq,
                    BinaryOp::NotEq => &t.ne,
                    BinaryOp::Lt => &t.lt,
                    BinaryOp::LtEq => &t.le,
                    BinaryOp::Gt => &t.gt,
                    BinaryOp::GtEq => &t.ge,
                    BinaryOp::And => &t.and,
                    BinaryOp::Or => &t.or,
                    BinaryOp::Add => &t.add,
                    BinaryOp::Sub => &t.sub,
                    BinaryOp::Mul => &t.mul,
                    BinaryOp::Div => &t.div,
                    BinaryOp::Rem => &t.modulo,
                    BinaryOp::Concat => &t.concat,
                };
                template.format(vec![self.expr(left)?, self.expr(right)?])
            }
            SqlExpr::Unary { op, operand } => {
                let template = match op {
                    UnaryOp::Not => &t.not,
                    UnaryOp::Neg => &t.neg,
                    UnaryOp::IsNull => &t.is_null,
                    UnaryOp::IsNotNull => &t.is_not_null,
                };
                template.format(vec![self.expr(operand)?])
            }
            SqlExpr::Like {
                operand,
                pattern,
                negated,
            } => {
                let template = if *negated { &t.not_like } else { &t.like };
                template.format(vec![self.expr(operand)?, self.expr(pattern)?])
            }
            SqlExpr::InList {
                operand,
                list,
                negated,
            } => {
                let template = if *negated { &t.not_in_list } else { &t.in_list };
                template.format(vec![self.expr(operand)?, self.expr(list)?])
            }
            SqlExpr::Function { func, args } => {
                let template = match func {
                    Function::Lower => &t.lower,
                    Function::Upper => &t.upper,
                    Function::Length => &t.length,
                    Function::Trim => &t.trim,
                    Function::Abs => &t.abs,
                    Function::Coalesce => &t.coalesce,
                };
                template.format(self.exprs(args)?)
            }
            SqlExpr::Aggregate { func, arg, distinct } => self.aggregate(*func, arg.as_deref(), *distinct),
            SqlExpr::Exists(select) => t.exists.format(vec![self.select(select)?]),
            SqlExpr::Subquery(select) => t.subquery.format(vec![self.select(select)?]),
            SqlExpr::FakeOrder => t.fake_order.format(Vec::new()),
        }
    }

    pub(super) fn exprs(&self, exprs: &[SqlExpr]) -> Result<Vec<SqlFragment>, SqlError> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn aggregate(
        &self,
        func: AggregateFunc,
        arg: Option<&SqlExpr>,
        distinct: bool,
    ) -> Result<SqlFragment, SqlError> {
        let t = self.dialect.templates();
        let Some(arg) = arg else {
            return t.count_star.format(Vec::new());
        };
        let template: &Template = match (func, distinct) {
            (AggregateFunc::Count, true) => &t.count_distinct,
            (AggregateFunc::Count, false) => &t.count,
            (_, true) => {
                return Err(SqlError::Unsupported {
                    dialect: self.dialect.name(),
                    construct: format!("DISTINCT in {func:?}"),
                });
            }
            (AggregateFunc::Sum, false) => &t.sum,
            (AggregateFunc::Avg, false) => &t.avg,
            (AggregateFunc::Min, false) => &t.min,
            (AggregateFunc::Max, false) => &t.max,
        };
        template.format(vec![self.expr(arg)?])
    }
}
