//! Expression DSL.
//!
//! Expressions are plain trees; nothing is resolved against the schema until
//! translation. Literals stay literals here and are turned into parameters by
//! [`parameterize`](super::parameterize).

use std::fmt;
use std::ops;

use crate::fragment::ValueTransform;
use crate::value::{ToSqlValue, Value};

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `+`
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`
    Div,
    /// `%`
    Rem,
    /// String concatenation.
    Concat,
}

impl BinaryOp {
    /// Operator symbol used in expression descriptions.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Concat => "||",
        }
    }

    /// Whether the operator yields a boolean.
    #[must_use]
    pub const fn is_predicate(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::NotEq | Self::Lt | Self::LtEq | Self::Gt | Self::GtEq | Self::And | Self::Or
        )
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `NOT`
    Not,
    /// Arithmetic negation.
    Neg,
    /// `IS NULL`
    IsNull,
    /// `IS NOT NULL`
    IsNotNull,
}

/// Scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
    /// `LOWER(x)`
    Lower,
    /// `UPPER(x)`
    Upper,
    /// String length.
    Length,
    /// Strip surrounding whitespace.
    Trim,
    /// `ABS(x)`
    Abs,
    /// `COALESCE(x, y)`
    Coalesce,
}

impl Function {
    const fn name(self) -> &'static str {
        match self {
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Length => "length",
            Self::Trim => "trim",
            Self::Abs => "abs",
            Self::Coalesce => "coalesce",
        }
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    /// `COUNT`
    Count,
    /// `SUM`
    Sum,
    /// `AVG`
    Avg,
    /// `MIN`
    Min,
    /// `MAX`
    Max,
}

impl AggregateFunc {
    const fn name(self) -> &'static str {
        match self {
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Avg => "avg",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

/// What a related-collection reference computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelatedKind {
    /// Whether any related row matches.
    Any,
    /// How many related rows match.
    Count,
}

/// A query expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A column, optionally qualified by table name.
    Column {
        /// Table name, when qualified.
        table: Option<String>,
        /// Column name.
        name: String,
    },
    /// A literal value.
    Literal(Value),
    /// An external value, by index into the argument list.
    Param(usize),
    /// A binary operation.
    Binary {
        /// Operator.
        op: BinaryOp,
        /// Left operand.
        left: Box<Expr>,
        /// Right operand.
        right: Box<Expr>,
    },
    /// A unary operation.
    Unary {
        /// Operator.
        op: UnaryOp,
        /// Operand.
        operand: Box<Expr>,
    },
    /// A `LIKE` match; the transform wraps the pattern in wildcards.
    Like {
        /// Matched expression.
        operand: Box<Expr>,
        /// Pattern.
        pattern: Box<Expr>,
        /// Wildcard wrapping applied to the pattern value.
        transform: Option<ValueTransform>,
        /// `NOT LIKE`.
        negated: bool,
    },
    /// Membership in a list value.
    InList {
        /// Tested expression.
        operand: Box<Expr>,
        /// The list.
        list: Box<Expr>,
        /// `NOT IN`.
        negated: bool,
    },
    /// A scalar function call.
    Function {
        /// Function.
        func: Function,
        /// Arguments.
        args: Vec<Expr>,
    },
    /// An aggregate. `COUNT(*)` has no argument.
    Aggregate {
        /// Function.
        func: AggregateFunc,
        /// Argument.
        arg: Option<Box<Expr>>,
        /// `DISTINCT` argument.
        distinct: bool,
    },
    /// A reference to rows of a table related through a foreign key.
    Related {
        /// Related table.
        table: String,
        /// What is computed.
        kind: RelatedKind,
        /// Filter on the related rows.
        predicate: Option<Box<Expr>>,
    },
}

/// Conversion into an expression. Values become literals.
pub trait IntoExpr {
    /// Converts into an expression.
    fn into_expr(self) -> Expr;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> Expr {
        self
    }
}

impl<T: ToSqlValue> IntoExpr for T {
    fn into_expr(self) -> Expr {
        Expr::Literal(self.to_sql_value())
    }
}

/// A column reference. `"books.title"` is qualified by table.
#[must_use]
pub fn col(name: &str) -> Expr {
    match name.rsplit_once('.') {
        Some((table, name)) => col_of(table, name),
        None => Expr::Column {
            table: None,
            name: name.to_string(),
        },
    }
}

/// A column qualified by table name.
#[must_use]
pub fn col_of(table: &str, name: &str) -> Expr {
    Expr::Column {
        table: Some(table.to_string()),
        name: name.to_string(),
    }
}

/// A literal.
#[must_use]
pub fn lit<T: ToSqlValue>(value: T) -> Expr {
    Expr::Literal(value.to_sql_value())
}

/// `COUNT(*)`
#[must_use]
pub const fn count_all() -> Expr {
    Expr::Aggregate {
        func: AggregateFunc::Count,
        arg: None,
        distinct: false,
    }
}

fn aggregate(func: AggregateFunc, arg: impl IntoExpr, distinct: bool) -> Expr {
    Expr::Aggregate {
        func,
        arg: Some(Box::new(arg.into_expr())),
        distinct,
    }
}

/// `COUNT(x)`
#[must_use]
pub fn count(arg: impl IntoExpr) -> Expr {
    aggregate(AggregateFunc::Count, arg, false)
}

/// `COUNT(DISTINCT x)`
#[must_use]
pub fn count_distinct(arg: impl IntoExpr) -> Expr {
    aggregate(AggregateFunc::Count, arg, true)
}

/// `SUM(x)`
#[must_use]
pub fn sum(arg: impl IntoExpr) -> Expr {
    aggregate(AggregateFunc::Sum, arg, false)
}

/// `AVG(x)`
#[must_use]
pub fn avg(arg: impl IntoExpr) -> Expr {
    aggregate(AggregateFunc::Avg, arg, false)
}

/// `MIN(x)`
#[must_use]
pub fn min(arg: impl IntoExpr) -> Expr {
    aggregate(AggregateFunc::Min, arg, false)
}

/// `MAX(x)`
#[must_use]
pub fn max(arg: impl IntoExpr) -> Expr {
    aggregate(AggregateFunc::Max, arg, false)
}

/// `COALESCE(x, y)`
#[must_use]
pub fn coalesce(first: impl IntoExpr, fallback: impl IntoExpr) -> Expr {
    Expr::Function {
        func: Function::Coalesce,
        args: vec![first.into_expr(), fallback.into_expr()],
    }
}

/// Rows of `table` related to the current row through a foreign key.
#[must_use]
pub fn related(table: &str) -> Related {
    Related {
        table: table.to_string(),
    }
}

/// A related-collection reference, completed by [`any`](Self::any),
/// [`exists`](Self::exists) or [`count`](Self::count).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Related {
    table: String,
}

impl Related {
    fn build(self, kind: RelatedKind, predicate: Option<Expr>) -> Expr {
        Expr::Related {
            table: self.table,
            kind,
            predicate: predicate.map(Box::new),
        }
    }

    /// Whether any related row matches `predicate`.
    #[must_use]
    pub fn any(self, predicate: Expr) -> Expr {
        self.build(RelatedKind::Any, Some(predicate))
    }

    /// Whether any related row exists.
    #[must_use]
    pub fn exists(self) -> Expr {
        self.build(RelatedKind::Any, None)
    }

    /// Number of related rows.
    #[must_use]
    pub fn count(self) -> Expr {
        self.build(RelatedKind::Count, None)
    }

    /// Number of related rows matching `predicate`.
    #[must_use]
    pub fn count_where(self, predicate: Expr) -> Expr {
        self.build(RelatedKind::Count, Some(predicate))
    }
}

impl Expr {
    fn binary(self, op: BinaryOp, other: impl IntoExpr) -> Self {
        Self::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other.into_expr()),
        }
    }

    fn unary(self, op: UnaryOp) -> Self {
        Self::Unary {
            op,
            operand: Box::new(self),
        }
    }

    fn like_with(self, pattern: impl IntoExpr, transform: Option<ValueTransform>, negated: bool) -> Self {
        Self::Like {
            operand: Box::new(self),
            pattern: Box::new(pattern.into_expr()),
            transform,
            negated,
        }
    }

    fn function(self, func: Function) -> Self {
        Self::Function {
            func,
            args: vec![self],
        }
    }

    /// `self = other`; comparing with NULL becomes `IS NULL`.
    #[must_use]
    pub fn eq(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// `self <> other`; comparing with NULL becomes `IS NOT NULL`.
    #[must_use]
    pub fn not_eq(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::NotEq, other)
    }

    /// `self < other`
    #[must_use]
    pub fn lt(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// `self <= other`
    #[must_use]
    pub fn lt_eq(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::LtEq, other)
    }

    /// `self > other`
    #[must_use]
    pub fn gt(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// `self >= other`
    #[must_use]
    pub fn gt_eq(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::GtEq, other)
    }

    /// `self >= low AND self <= high`
    #[must_use]
    pub fn between(self, low: impl IntoExpr, high: impl IntoExpr) -> Self {
        self.clone().gt_eq(low).and(self.lt_eq(high))
    }

    /// `self AND other`
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// `self OR other`
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// `NOT self`
    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(self) -> Self {
        self.unary(UnaryOp::Not)
    }

    /// `self IS NULL`
    #[must_use]
    pub fn is_null(self) -> Self {
        self.unary(UnaryOp::IsNull)
    }

    /// `self IS NOT NULL`
    #[must_use]
    pub fn is_not_null(self) -> Self {
        self.unary(UnaryOp::IsNotNull)
    }

    /// `self LIKE pattern`, with the pattern used as given.
    #[must_use]
    pub fn like(self, pattern: impl IntoExpr) -> Self {
        self.like_with(pattern, None, false)
    }

    /// `self NOT LIKE pattern`
    #[must_use]
    pub fn not_like(self, pattern: impl IntoExpr) -> Self {
        self.like_with(pattern, None, true)
    }

    /// Prefix match. Wildcards in the value are escaped.
    #[must_use]
    pub fn starts_with(self, prefix: impl IntoExpr) -> Self {
        self.like_with(prefix, Some(ValueTransform::StartsWith), false)
    }

    /// Suffix match. Wildcards in the value are escaped.
    #[must_use]
    pub fn ends_with(self, suffix: impl IntoExpr) -> Self {
        self.like_with(suffix, Some(ValueTransform::EndsWith), false)
    }

    /// Substring match. Wildcards in the value are escaped.
    #[must_use]
    pub fn contains(self, needle: impl IntoExpr) -> Self {
        self.like_with(needle, Some(ValueTransform::Contains), false)
    }

    /// `self IN (values...)`
    #[must_use]
    pub fn in_list<T: ToSqlValue>(self, values: Vec<T>) -> Self {
        let list = Value::List(values.into_iter().map(ToSqlValue::to_sql_value).collect());
        Self::InList {
            operand: Box::new(self),
            list: Box::new(Self::Literal(list)),
            negated: false,
        }
    }

    /// `self NOT IN (values...)`
    #[must_use]
    pub fn not_in_list<T: ToSqlValue>(self, values: Vec<T>) -> Self {
        let list = Value::List(values.into_iter().map(ToSqlValue::to_sql_value).collect());
        Self::InList {
            operand: Box::new(self),
            list: Box::new(Self::Literal(list)),
            negated: true,
        }
    }

    /// String concatenation.
    #[must_use]
    pub fn concat(self, other: impl IntoExpr) -> Self {
        self.binary(BinaryOp::Concat, other)
    }

    /// `LOWER(self)`
    #[must_use]
    pub fn lower(self) -> Self {
        self.function(Function::Lower)
    }

    /// `UPPER(self)`
    #[must_use]
    pub fn upper(self) -> Self {
        self.function(Function::Upper)
    }

    /// String length.
    #[must_use]
    pub fn length(self) -> Self {
        self.function(Function::Length)
    }

    /// Whitespace-trimmed string.
    #[must_use]
    pub fn trim(self) -> Self {
        self.function(Function::Trim)
    }

    /// `ABS(self)`
    #[must_use]
    pub fn abs(self) -> Self {
        self.function(Function::Abs)
    }

    /// Names this expression in a projection.
    #[must_use]
    pub fn alias(self, name: &str) -> Projection {
        Projection {
            expr: self,
            alias: Some(name.to_string()),
        }
    }

    /// Ascending order on this expression.
    #[must_use]
    pub const fn asc(self) -> Ordering {
        Ordering {
            expr: self,
            descending: false,
        }
    }

    /// Descending order on this expression.
    #[must_use]
    pub const fn desc(self) -> Ordering {
        Ordering {
            expr: self,
            descending: true,
        }
    }

    /// Whether an aggregate occurs in this expression, outside related
    /// sub-queries.
    #[must_use]
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Self::Aggregate { .. } => true,
            Self::Column { .. } | Self::Literal(_) | Self::Param(_) | Self::Related { .. } => false,
            Self::Binary { left, right, .. } => left.contains_aggregate() || right.contains_aggregate(),
            Self::Unary { operand, .. } => operand.contains_aggregate(),
            Self::Like { operand, pattern, .. } => {
                operand.contains_aggregate() || pattern.contains_aggregate()
            }
            Self::InList { operand, list, .. } => operand.contains_aggregate() || list.contains_aggregate(),
            Self::Function { args, .. } => args.iter().any(Self::contains_aggregate),
        }
    }

    /// Tables referenced through [`related`], in order of appearance.
    pub(crate) fn related_tables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::Related { table, predicate, .. } => {
                out.push(table);
                if let Some(p) = predicate {
                    p.related_tables(out);
                }
            }
            Self::Column { .. } | Self::Literal(_) | Self::Param(_) => {}
            Self::Binary { left, right, .. } => {
                left.related_tables(out);
                right.related_tables(out);
            }
            Self::Unary { operand, .. } => operand.related_tables(out),
            Self::Like { operand, pattern, .. } => {
                operand.related_tables(out);
                pattern.related_tables(out);
            }
            Self::InList { operand, list, .. } => {
                operand.related_tables(out);
                list.related_tables(out);
            }
            Self::Function { args, .. } => args.iter().for_each(|a| a.related_tables(out)),
            Self::Aggregate { arg, .. } => {
                if let Some(a) = arg {
                    a.related_tables(out);
                }
            }
        }
    }
}

macro_rules! arithmetic {
    ($($trait:ident :: $method:ident => $op:ident),* $(,)?) => {
        $(
            impl<R: IntoExpr> ops::$trait<R> for Expr {
                type Output = Self;

                fn $method(self, rhs: R) -> Self {
                    self.binary(BinaryOp::$op, rhs)
                }
            }
        )*
    };
}

arithmetic! {
    Add::add => Add,
    Sub::sub => Sub,
    Mul::mul => Mul,
    Div::div => Div,
    Rem::rem => Rem,
}

impl ops::Neg for Expr {
    type Output = Self;

    fn neg(self) -> Self {
        self.unary(UnaryOp::Neg)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Column {
                table: Some(table),
                name,
            } => write!(f, "{table}.{name}"),
            Self::Column { table: None, name } => f.write_str(name),
            Self::Literal(v) => write!(f, "{v}"),
            Self::Param(i) => write!(f, "@{i}"),
            Self::Binary { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
            Self::Unary { op, operand } => match op {
                UnaryOp::Not => write!(f, "(NOT {operand})"),
                UnaryOp::Neg => write!(f, "(-{operand})"),
                UnaryOp::IsNull => write!(f, "({operand} IS NULL)"),
                UnaryOp::IsNotNull => write!(f, "({operand} IS NOT NULL)"),
            },
            Self::Like {
                operand,
                pattern,
                transform,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                match transform {
                    None => write!(f, "({operand} {not}LIKE {pattern})"),
                    Some(ValueTransform::StartsWith) => write!(f, "{not}{operand}.starts_with({pattern})"),
                    Some(ValueTransform::EndsWith) => write!(f, "{not}{operand}.ends_with({pattern})"),
                    Some(ValueTransform::Contains) => write!(f, "{not}{operand}.contains({pattern})"),
                }
            }
            Self::InList {
                operand,
                list,
                negated,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "({operand} {not}IN {list})")
            }
            Self::Function { func, args } => {
                write!(f, "{}(", func.name())?;
                write_list(f, args)?;
                f.write_str(")")
            }
            Self::Aggregate { func, arg, distinct } => {
                write!(f, "{}(", func.name())?;
                if *distinct {
                    f.write_str("distinct ")?;
                }
                match arg {
                    Some(arg) => write!(f, "{arg})"),
                    None => f.write_str("*)"),
                }
            }
            Self::Related {
                table,
                kind,
                predicate,
            } => {
                let kind = match kind {
                    RelatedKind::Any => "any",
                    RelatedKind::Count => "count",
                };
                match predicate {
                    Some(p) => write!(f, "related({table}).{kind}({p})"),
                    None => write!(f, "related({table}).{kind}()"),
                }
            }
        }
    }
}

pub(crate) fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// One projected expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// The expression.
    pub expr: Expr,
    /// Output name, when given.
    pub alias: Option<String>,
}

impl From<Expr> for Projection {
    fn from(expr: Expr) -> Self {
        Self { expr, alias: None }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{} as {alias}", self.expr),
            None => write!(f, "{}", self.expr),
        }
    }
}

/// One ordering term.
#[derive(Debug, Clone, PartialEq)]
pub struct Ordering {
    /// The expression.
    pub expr: Expr,
    /// Descending order.
    pub descending: bool,
}

impl From<Expr> for Ordering {
    fn from(expr: Expr) -> Self {
        expr.asc()
    }
}

impl fmt::Display for Ordering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.descending {
            write!(f, "{} desc", self.expr)
        } else {
            write!(f, "{}", self.expr)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_column() {
        assert_eq!(
            col("books.title"),
            Expr::Column {
                table: Some(String::from("books")),
                name: String::from("title"),
            }
        );
    }

    #[test]
    fn test_display_is_structural() {
        let e = col("price").gt(10).and(col("title").starts_with("c#"));
        assert_eq!(e.to_string(), "((price > 10) AND title.starts_with('c#'))");
        let e = (col("a") + 1) * col("b");
        assert_eq!(e.to_string(), "((a + 1) * b)");
    }

    #[test]
    fn test_contains_aggregate() {
        assert!(count_all().gt(1).contains_aggregate());
        assert!(!col("a").eq(1).contains_aggregate());
        assert!(!related("reviews").count().contains_aggregate());
    }

    #[test]
    fn test_related_tables() {
        let e = related("reviews").any(related("votes").exists());
        let mut tables = Vec::new();
        e.related_tables(&mut tables);
        assert_eq!(tables, ["reviews", "votes"]);
    }
}
