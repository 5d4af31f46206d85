//! Query translation.
//!
//! Walks a parameterized command left to right, resolving names against the
//! schema model, and produces the IR. Every unsupported shape is reported as
//! a [`TranslationError`]; nothing is approximated.

use std::collections::HashSet;

use tracing::debug;

use crate::dialect::{Dialect, Features};
use crate::error::TranslationError;
use crate::fragment::PlaceHolderKind;
use crate::model::{Column, DbModel, ObjectName, Table};
use crate::types::HostType;
use crate::value::Value;

use super::command::{DbCommand, Delete, Insert, Query, QueryOp, Terminal, Update};
use super::expr::{AggregateFunc, BinaryOp, Expr, Function, Projection, RelatedKind, UnaryOp};
use super::ir::{
    DeleteExpression, InsertExpression, OrderItem, OutputColumn, SelectExpression, SourceKind,
    SqlExpr, TableId, TableSource, UpdateExpression,
};
use super::result::{ReaderColumn, ResultProcessor, RowReader};

/// Appended to every generated alias so it cannot collide with a real name.
pub const ALIAS_SENTINEL: char = '$';

/// A translated query.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedQuery {
    /// The IR.
    pub select: SelectExpression,
    /// How rows map to the result.
    pub processor: ResultProcessor,
    /// How each row is materialized.
    pub row_reader: RowReader,
}

/// A translated command.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslatedCommand {
    /// A query.
    Select(TranslatedQuery),
    /// An insert.
    Insert(InsertExpression),
    /// An update.
    Update(UpdateExpression),
    /// A delete.
    Delete(DeleteExpression),
}

/// Initials of the words of a table name: `book_reviews` and `BookReviews`
/// both give `br`.
#[must_use]
pub fn short_name(table: &str) -> String {
    let mut out = String::new();
    let mut at_word_start = true;
    let mut prev_lower = false;
    for ch in table.chars() {
        if !ch.is_alphanumeric() {
            at_word_start = true;
            prev_lower = false;
            continue;
        }
        if at_word_start || (ch.is_uppercase() && prev_lower) {
            out.extend(ch.to_lowercase());
        }
        at_word_start = false;
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
    }
    if out.is_empty() {
        out.push('t');
    }
    out
}

#[derive(Debug)]
struct AliasGenerator {
    enabled: bool,
    used: HashSet<String>,
}

impl AliasGenerator {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            used: HashSet::new(),
        }
    }

    fn next(&mut self, table: &str) -> Option<String> {
        self.enabled.then(|| self.unique(&short_name(table)))
    }

    fn unique(&mut self, base: &str) -> String {
        let mut candidate = base.to_string();
        let mut suffix = 0;
        while self.used.contains(&candidate) {
            suffix += 1;
            candidate = format!("{base}{suffix}");
        }
        self.used.insert(candidate.clone());
        format!("{candidate}{ALIAS_SENTINEL}")
    }
}

struct Entry<'m> {
    id: TableId,
    table: &'m Table,
    qualifier: Option<ObjectName>,
}

/// Sources and scopes accumulated during one translation.
struct TranslationContext<'m> {
    scopes: Vec<Vec<Entry<'m>>>,
    names: Vec<String>,
    aliases: AliasGenerator,
}

impl<'m> TranslationContext<'m> {
    fn new(aliased: bool) -> Self {
        Self {
            scopes: vec![Vec::new()],
            names: Vec::new(),
            aliases: AliasGenerator::new(aliased),
        }
    }

    /// Registers a table occurrence in the innermost scope.
    fn add_table(&mut self, table: &'m Table, qualify_by_name: bool) -> TableSource {
        let id = TableId(self.names.len());
        self.names.push(table.name.name.clone());
        let alias = if qualify_by_name {
            None
        } else {
            self.aliases.next(&table.name.name)
        };
        let qualifier = match &alias {
            Some(a) => Some(ObjectName::new(a.clone())),
            None if qualify_by_name && self.aliases.enabled => Some(table.name.clone()),
            None => None,
        };
        if let Some(scope) = self.scopes.last_mut() {
            scope.push(Entry {
                id,
                table,
                qualifier,
            });
        }
        TableSource {
            id,
            kind: SourceKind::Table(table.name.clone()),
            alias,
            join: None,
            on: None,
        }
    }

    fn add_derived(&mut self, inner: SelectExpression) -> TableSource {
        let id = TableId(self.names.len());
        self.names.push(String::from("sq"));
        TableSource {
            id,
            kind: SourceKind::Derived(Box::new(inner)),
            alias: Some(self.aliases.unique("sq")),
            join: None,
            on: None,
        }
    }

    fn entry(&self, id: TableId) -> Option<&Entry<'m>> {
        self.scopes.iter().flatten().find(|e| e.id == id)
    }

    fn table_name(&self, id: TableId) -> &str {
        self.names.get(id.0).map_or("", String::as_str)
    }
}

struct Resolved {
    expr: SqlExpr,
    hint: Option<HostType>,
}

impl Resolved {
    const fn new(expr: SqlExpr, hint: Option<HostType>) -> Self {
        Self { expr, hint }
    }
}

fn column_expr(entry: &Entry<'_>, column: &Column) -> Resolved {
    Resolved::new(
        SqlExpr::Column {
            table: entry.id,
            qualifier: entry.qualifier.clone(),
            name: column.name.clone(),
        },
        column.host,
    )
}

fn and(existing: Option<SqlExpr>, next: SqlExpr) -> SqlExpr {
    match existing {
        Some(prev) => SqlExpr::Binary {
            op: BinaryOp::And,
            left: Box::new(prev),
            right: Box::new(next),
        },
        None => next,
    }
}

fn find_column<'t>(table: &'t Table, name: &str) -> Option<&'t Column> {
    table.column(name).or_else(|| table.column_ci(name))
}

fn matches_table(table: &Table, name: &str) -> bool {
    let wanted = ObjectName::from(name);
    match &wanted.schema {
        Some(_) => table.name.key(true) == wanted.key(true),
        None => table.name.name.eq_ignore_ascii_case(&wanted.name),
    }
}

fn count_related(exprs: &[&Expr]) -> usize {
    let mut tables = Vec::new();
    for e in exprs {
        e.related_tables(&mut tables);
    }
    tables.len()
}

fn query_exprs(query: &Query) -> Vec<&Expr> {
    let mut out = Vec::new();
    for op in &query.ops {
        match op {
            QueryOp::Filter(e) | QueryOp::Having(e) | QueryOp::Skip(e) | QueryOp::Take(e) => out.push(e),
            QueryOp::Select(items) => out.extend(items.iter().map(|p| &p.expr)),
            QueryOp::OrderBy(o) => out.push(&o.expr),
            QueryOp::GroupBy(items) => out.extend(items),
            QueryOp::Join { on, .. } => out.extend(on),
            QueryOp::Distinct => {}
        }
    }
    out
}

fn table_count(query: &Query) -> usize {
    let joins = query
        .ops
        .iter()
        .filter(|op| matches!(op, QueryOp::Join { .. }))
        .count();
    1 + joins + count_related(&query_exprs(query))
}

/// Translates commands into the IR for one model and dialect.
pub struct Translator<'a> {
    model: &'a DbModel,
    features: Features,
    description: String,
}

impl<'a> Translator<'a> {
    /// Creates a translator. `description` names the command in errors.
    #[must_use]
    pub fn new(model: &'a DbModel, dialect: &dyn Dialect, description: impl Into<String>) -> Self {
        Self {
            model,
            features: dialect.features(),
            description: description.into(),
        }
    }

    fn error(&self, reason: impl Into<String>, expression: &impl ToString) -> TranslationError {
        TranslationError::new(reason, expression.to_string(), self.description.clone())
    }

    fn lookup_table(&self, name: &str) -> Result<&'a Table, TranslationError> {
        self.model
            .table(name)
            .ok_or_else(|| self.error(format!("unknown table `{name}`"), &name))
    }

    /// Translates any command.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslationError`] for unknown names and unsupported
    /// shapes.
    pub fn translate(&self, command: &DbCommand) -> Result<TranslatedCommand, TranslationError> {
        match command {
            DbCommand::Select(q) => self.translate_query(q).map(TranslatedCommand::Select),
            DbCommand::Insert(i) => self.translate_insert(i).map(TranslatedCommand::Insert),
            DbCommand::Update(u) => self.translate_update(u).map(TranslatedCommand::Update),
            DbCommand::Delete(d) => self.translate_delete(d).map(TranslatedCommand::Delete),
        }
    }

    /// Translates a query.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslationError`] for unknown names and unsupported
    /// shapes.
    #[allow(clippy::too_many_lines)]
    pub fn translate_query(&self, query: &Query) -> Result<TranslatedQuery, TranslationError> {
        let tables = table_count(query);
        let mut ctx = TranslationContext::new(tables > 1);
        let root = self.lookup_table(&query.table)?;
        let mut select = SelectExpression::new(ctx.add_table(root, false));
        let mut projected = false;
        let mut grouped = false;

        for op in &query.ops {
            let paged = select.is_paged();
            match op {
                QueryOp::Join { kind, table, on } => {
                    if projected || grouped || paged || select.distinct {
                        return Err(self.error(
                            "join must come before select, group_by, distinct and paging",
                            op,
                        ));
                    }
                    let joined = self.lookup_table(table)?;
                    let mut source = ctx.add_table(joined, false);
                    let condition = match on {
                        Some(e) => self.predicate(&mut ctx, e)?,
                        None => self.join_condition(&ctx, source.id, op)?,
                    };
                    source.join = Some(*kind);
                    source.on = Some(condition);
                    select.sources.push(source);
                }
                QueryOp::Filter(e) => {
                    if paged {
                        return Err(self.error("filter after skip/take needs a derived table", op));
                    }
                    if e.contains_aggregate() && !grouped {
                        return Err(self.error("aggregates are not allowed in filter; use group_by", e));
                    }
                    let p = self.predicate(&mut ctx, e)?;
                    if grouped {
                        select.having = Some(and(select.having.take(), p));
                    } else {
                        select.predicate = Some(and(select.predicate.take(), p));
                    }
                }
                QueryOp::Select(items) => {
                    if projected {
                        return Err(self.error("select after select needs a derived table", op));
                    }
                    select.projection = self.project(&mut ctx, items, grouped.then_some(&select.group_by))?;
                    projected = true;
                }
                QueryOp::OrderBy(o) => {
                    if paged {
                        return Err(self.error("order_by after skip/take needs a derived table", op));
                    }
                    let e = self.value(&mut ctx, &o.expr)?.expr;
                    if grouped && !e.only_uses(&select.group_by) {
                        return Err(self.error("order_by on an ungrouped expression", &o.expr));
                    }
                    select.order_by.push(OrderItem {
                        expr: e,
                        descending: o.descending,
                    });
                }
                QueryOp::GroupBy(exprs) => {
                    if grouped || projected || paged {
                        return Err(self.error(
                            "group_by must come once, before select and paging",
                            op,
                        ));
                    }
                    if exprs.is_empty() {
                        return Err(self.error("group_by needs at least one expression", op));
                    }
                    for e in exprs {
                        if e.contains_aggregate() {
                            return Err(self.error("cannot group by an aggregate", e));
                        }
                        select.group_by.push(self.value(&mut ctx, e)?.expr);
                    }
                    if select.order_by.iter().any(|o| !o.expr.only_uses(&select.group_by)) {
                        return Err(self.error("order_by on an ungrouped expression", op));
                    }
                    grouped = true;
                }
                QueryOp::Having(e) => {
                    if !grouped {
                        return Err(self.error("having without group_by", op));
                    }
                    if paged {
                        return Err(self.error("having after skip/take needs a derived table", op));
                    }
                    let p = self.predicate(&mut ctx, e)?;
                    select.having = Some(and(select.having.take(), p));
                }
                QueryOp::Distinct => {
                    if paged {
                        return Err(self.error("distinct after skip/take needs a derived table", op));
                    }
                    select.distinct = true;
                }
                QueryOp::Skip(e) => {
                    if select.limit.is_some() {
                        return Err(self.error("skip after take needs a derived table", op));
                    }
                    if select.offset.is_some() {
                        return Err(self.error("skip applied twice", op));
                    }
                    select.offset = Some(self.paging_value(&mut ctx, e)?);
                }
                QueryOp::Take(e) => {
                    if select.limit.is_some() {
                        return Err(self.error("take applied twice", op));
                    }
                    select.limit = Some(self.paging_value(&mut ctx, e)?);
                }
            }
        }

        if !projected {
            select.projection = if grouped {
                group_outputs(&ctx, &select.group_by)
            } else {
                all_columns(&ctx)
            };
        }
        rename_duplicates(&ctx, &mut select.projection);

        let processor = match query.terminal {
            None => ResultProcessor::List,
            Some(t @ (Terminal::First | Terminal::FirstOrDefault)) => {
                select.limit.get_or_insert(SqlExpr::Literal(Value::Int(1)));
                ResultProcessor::First {
                    or_default: t == Terminal::FirstOrDefault,
                }
            }
            Some(t @ (Terminal::Single | Terminal::SingleOrDefault)) => {
                select.limit.get_or_insert(SqlExpr::Literal(Value::Int(2)));
                ResultProcessor::Single {
                    or_default: t == Terminal::SingleOrDefault,
                }
            }
            Some(t @ (Terminal::Last | Terminal::LastOrDefault)) => {
                if select.is_paged() {
                    return Err(self.error("last after skip/take is not supported", query));
                }
                if select.order_by.is_empty() {
                    return Err(self.error("last needs an order_by", query));
                }
                for o in &mut select.order_by {
                    o.descending = !o.descending;
                }
                select.limit = Some(SqlExpr::Literal(Value::Int(1)));
                ResultProcessor::First {
                    or_default: t == Terminal::LastOrDefault,
                }
            }
            Some(Terminal::Count) => {
                select = self.count(&mut ctx, select, grouped)?;
                ResultProcessor::Scalar
            }
            Some(Terminal::Any) => {
                select.projection = vec![OutputColumn {
                    expr: SqlExpr::Literal(Value::Int(1)),
                    name: String::new(),
                    hint: None,
                }];
                if !select.is_paged() {
                    select.order_by.clear();
                }
                select.limit.get_or_insert(SqlExpr::Literal(Value::Int(1)));
                ResultProcessor::Exists
            }
        };

        self.ensure_order(&mut select)?;
        let row_reader = RowReader::new(
            select
                .projection
                .iter()
                .map(|o| ReaderColumn {
                    name: o.name.clone(),
                    hint: o.hint,
                })
                .collect(),
        );
        debug!(command = %self.description, tables, "translated query");
        Ok(TranslatedQuery {
            select,
            processor,
            row_reader,
        })
    }

    fn count(
        &self,
        ctx: &mut TranslationContext<'a>,
        mut select: SelectExpression,
        grouped: bool,
    ) -> Result<SelectExpression, TranslationError> {
        let count_output = OutputColumn {
            expr: SqlExpr::Aggregate {
                func: AggregateFunc::Count,
                arg: None,
                distinct: false,
            },
            name: String::new(),
            hint: Some(HostType::I64),
        };
        if !(select.is_paged() || select.distinct || grouped) {
            select.projection = vec![count_output];
            select.order_by.clear();
            return Ok(select);
        }
        if !select.is_paged() {
            select.order_by.clear();
        }
        self.ensure_order(&mut select)?;
        let mut outer = SelectExpression::new(ctx.add_derived(select));
        outer.projection = vec![count_output];
        Ok(outer)
    }

    /// Synthesizes an ordering for paged selects without one.
    ///
    /// Distinct selects order by their first output, grouped selects by their
    /// group expressions, others by the first table's primary key. Without a
    /// key the vendor's constant ordering is used when it has one.
    fn ensure_order(&self, select: &mut SelectExpression) -> Result<(), TranslationError> {
        if !select.is_paged() || !select.order_by.is_empty() {
            return Ok(());
        }
        let synthesized: Vec<SqlExpr> = if select.distinct {
            select.projection.iter().take(1).map(|o| o.expr.clone()).collect()
        } else if !select.group_by.is_empty() {
            select.group_by.clone()
        } else {
            self.primary_key_order(select)
        };
        let synthesized = if synthesized.is_empty() && self.features.contains(Features::FAKE_ORDER_BY) {
            vec![SqlExpr::FakeOrder]
        } else {
            synthesized
        };
        if synthesized.is_empty() {
            return Err(self.error(
                "skip/take needs an order_by: the table has no primary key to order by",
                &"skip/take",
            ));
        }
        select.order_by = synthesized
            .into_iter()
            .map(|expr| OrderItem {
                expr,
                descending: false,
            })
            .collect();
        Ok(())
    }

    fn primary_key_order(&self, select: &SelectExpression) -> Vec<SqlExpr> {
        let Some(first) = select.sources.first() else {
            return Vec::new();
        };
        let SourceKind::Table(name) = &first.kind else {
            return Vec::new();
        };
        let Some(table) = self.model.tables.get(name) else {
            return Vec::new();
        };
        table
            .primary_key_columns()
            .iter()
            .map(|c| SqlExpr::Column {
                table: first.id,
                qualifier: first.alias.clone().map(ObjectName::new),
                name: c.clone(),
            })
            .collect()
    }

    fn project(
        &self,
        ctx: &mut TranslationContext<'a>,
        items: &[Projection],
        group_by: Option<&Vec<SqlExpr>>,
    ) -> Result<Vec<OutputColumn>, TranslationError> {
        let mut outputs = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let r = self.value(ctx, &item.expr)?;
            let name = match (&item.alias, &r.expr) {
                (Some(alias), _) => alias.clone(),
                (None, SqlExpr::Column { name, .. }) => name.clone(),
                (None, _) => format!("expr{i}"),
            };
            outputs.push(OutputColumn {
                expr: r.expr,
                name,
                hint: r.hint,
            });
        }
        match group_by {
            Some(groups) => {
                if let Some(bad) = items
                    .iter()
                    .zip(&outputs)
                    .find(|(_, o)| !o.expr.only_uses(groups))
                {
                    return Err(self.error("select of an ungrouped expression", bad.0));
                }
            }
            None if outputs.iter().any(|o| o.expr.contains_aggregate()) => {
                if let Some(bad) = items.iter().zip(&outputs).find(|(_, o)| !o.expr.only_uses(&[])) {
                    return Err(self.error("mixing aggregates and columns needs group_by", bad.0));
                }
            }
            None => {}
        }
        Ok(outputs)
    }

    fn paging_value(&self, ctx: &mut TranslationContext<'a>, e: &Expr) -> Result<SqlExpr, TranslationError> {
        let r = self.value(ctx, e)?;
        match r.expr {
            SqlExpr::Param { .. } | SqlExpr::Literal(Value::Int(_)) => Ok(r.expr),
            _ => Err(self.error("skip/take need an integer value", e)),
        }
    }

    fn join_condition(
        &self,
        ctx: &TranslationContext<'a>,
        joined_id: TableId,
        op: &QueryOp,
    ) -> Result<SqlExpr, TranslationError> {
        let scope = ctx.scopes.last().map_or(&[][..], Vec::as_slice);
        let joined = scope
            .iter()
            .find(|e| e.id == joined_id)
            .ok_or_else(|| self.error("joined table is not in scope", op))?;
        for existing in scope.iter().filter(|e| e.id != joined_id) {
            if let Some(cond) = self.link(existing, joined) {
                return Ok(cond);
            }
        }
        Err(self.error(
            format!("no foreign key between `{}` and the query's tables", joined.table.name),
            op,
        ))
    }

    /// Equality of the foreign key columns between two table occurrences,
    /// whichever side holds the key.
    fn link(&self, a: &Entry<'_>, b: &Entry<'_>) -> Option<SqlExpr> {
        let (child, parent, fk) = if let Some(fk) = self.model.foreign_key_between(a.table, b.table) {
            (a, b, fk)
        } else {
            let fk = self.model.foreign_key_between(b.table, a.table)?;
            (b, a, fk)
        };
        let (_, target_columns) = fk.target()?;
        fk.columns
            .iter()
            .zip(target_columns)
            .map(|(c, p)| SqlExpr::Binary {
                op: BinaryOp::Eq,
                left: Box::new(SqlExpr::Column {
                    table: child.id,
                    qualifier: child.qualifier.clone(),
                    name: c.clone(),
                }),
                right: Box::new(SqlExpr::Column {
                    table: parent.id,
                    qualifier: parent.qualifier.clone(),
                    name: p.clone(),
                }),
            })
            .reduce(|acc, next| and(Some(acc), next))
    }

    fn resolve_column(
        &self,
        ctx: &TranslationContext<'a>,
        table: Option<&str>,
        name: &str,
        expr: &Expr,
    ) -> Result<Resolved, TranslationError> {
        let mut table_seen = table.is_none();
        for scope in ctx.scopes.iter().rev() {
            let mut found = scope
                .iter()
                .filter(|e| table.is_none_or(|t| matches_table(e.table, t)))
                .inspect(|_| table_seen = true)
                .filter_map(|e| find_column(e.table, name).map(|c| (e, c)));
            match (found.next(), found.next()) {
                (Some((entry, column)), None) => return Ok(column_expr(entry, column)),
                (Some(_), Some(_)) => {
                    return Err(self.error("ambiguous column; qualify it with its table", expr));
                }
                (None, _) => {}
            }
        }
        if table_seen {
            Err(self.error(format!("unknown column `{name}`"), expr))
        } else {
            Err(self.error(
                format!("table `{}` is not part of the query", table.unwrap_or_default()),
                expr,
            ))
        }
    }

    /// Translates a boolean expression. Bare columns and parameters are
    /// compared with TRUE.
    fn predicate(&self, ctx: &mut TranslationContext<'a>, expr: &Expr) -> Result<SqlExpr, TranslationError> {
        match expr {
            Expr::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                left,
                right,
            } => Ok(SqlExpr::Binary {
                op: *op,
                left: Box::new(self.predicate(ctx, left)?),
                right: Box::new(self.predicate(ctx, right)?),
            }),
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => Ok(SqlExpr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(self.predicate(ctx, operand)?),
            }),
            _ => {
                let r = self.value(ctx, expr)?;
                Ok(match r.expr {
                    e @ (SqlExpr::Column { .. } | SqlExpr::Param { .. }) => SqlExpr::Binary {
                        op: BinaryOp::Eq,
                        left: Box::new(e),
                        right: Box::new(SqlExpr::Literal(Value::Bool(true))),
                    },
                    e => e,
                })
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    fn value(&self, ctx: &mut TranslationContext<'a>, expr: &Expr) -> Result<Resolved, TranslationError> {
        match expr {
            Expr::Column { table, name } => self.resolve_column(ctx, table.as_deref(), name, expr),
            Expr::Literal(v) => Ok(Resolved::new(SqlExpr::Literal(v.clone()), HostType::of_value(v))),
            Expr::Param(index) => Ok(Resolved::new(
                SqlExpr::Param {
                    index: *index,
                    kind: PlaceHolderKind::Parameter,
                    transform: None,
                },
                None,
            )),
            Expr::Binary {
                op: BinaryOp::And | BinaryOp::Or,
                ..
            }
            | Expr::Unary {
                op: UnaryOp::Not, ..
            } => Ok(Resolved::new(self.predicate(ctx, expr)?, Some(HostType::Bool))),
            Expr::Binary {
                op: op @ (BinaryOp::Eq | BinaryOp::NotEq),
                left,
                right,
            } if matches!(**right, Expr::Literal(Value::Null)) || matches!(**left, Expr::Literal(Value::Null)) => {
                let operand = if matches!(**right, Expr::Literal(Value::Null)) {
                    left
                } else {
                    right
                };
                let test = if *op == BinaryOp::Eq {
                    UnaryOp::IsNull
                } else {
                    UnaryOp::IsNotNull
                };
                Ok(Resolved::new(
                    SqlExpr::Unary {
                        op: test,
                        operand: Box::new(self.value(ctx, operand)?.expr),
                    },
                    Some(HostType::Bool),
                ))
            }
            Expr::Binary { op, left, right } => {
                let l = self.value(ctx, left)?;
                let r = self.value(ctx, right)?;
                let hint = match op {
                    _ if op.is_predicate() => Some(HostType::Bool),
                    BinaryOp::Concat => Some(HostType::String),
                    _ => l.hint.or(r.hint),
                };
                Ok(Resolved::new(
                    SqlExpr::Binary {
                        op: *op,
                        left: Box::new(l.expr),
                        right: Box::new(r.expr),
                    },
                    hint,
                ))
            }
            Expr::Unary { op, operand } => {
                let inner = self.value(ctx, operand)?;
                let hint = match op {
                    UnaryOp::Neg => inner.hint,
                    UnaryOp::Not | UnaryOp::IsNull | UnaryOp::IsNotNull => Some(HostType::Bool),
                };
                Ok(Resolved::new(
                    SqlExpr::Unary {
                        op: *op,
                        operand: Box::new(inner.expr),
                    },
                    hint,
                ))
            }
            Expr::Like {
                operand,
                pattern,
                transform,
                negated,
            } => {
                let operand = self.value(ctx, operand)?.expr;
                let pattern = match (self.value(ctx, pattern)?.expr, transform) {
                    (SqlExpr::Param { index, kind, .. }, Some(t)) => SqlExpr::Param {
                        index,
                        kind,
                        transform: Some(*t),
                    },
                    (SqlExpr::Literal(Value::Text(text)), Some(t)) => {
                        SqlExpr::Literal(t.apply(&Value::Text(text)))
                    }
                    (_, Some(_)) => {
                        return Err(self.error("wildcard matching needs a text value", pattern));
                    }
                    (p, None) => p,
                };
                Ok(Resolved::new(
                    SqlExpr::Like {
                        operand: Box::new(operand),
                        pattern: Box::new(pattern),
                        negated: *negated,
                    },
                    Some(HostType::Bool),
                ))
            }
            Expr::InList {
                operand,
                list,
                negated,
            } => {
                let operand = self.value(ctx, operand)?.expr;
                let list = match self.value(ctx, list)?.expr {
                    SqlExpr::Param { index, .. } => SqlExpr::Param {
                        index,
                        kind: PlaceHolderKind::Value,
                        transform: None,
                    },
                    literal @ SqlExpr::Literal(Value::List(_)) => literal,
                    _ => return Err(self.error("in_list needs a list value", list)),
                };
                Ok(Resolved::new(
                    SqlExpr::InList {
                        operand: Box::new(operand),
                        list: Box::new(list),
                        negated: *negated,
                    },
                    Some(HostType::Bool),
                ))
            }
            Expr::Function { func, args } => {
                let expected = if *func == Function::Coalesce { 2 } else { 1 };
                if args.len() != expected {
                    return Err(self.error(format!("expected {expected} argument(s)"), expr));
                }
                let args = args
                    .iter()
                    .map(|a| self.value(ctx, a))
                    .collect::<Result<Vec<_>, _>>()?;
                let hint = match func {
                    Function::Lower | Function::Upper | Function::Trim => Some(HostType::String),
                    Function::Length => Some(HostType::I64),
                    Function::Abs | Function::Coalesce => args.first().and_then(|a| a.hint),
                };
                Ok(Resolved::new(
                    SqlExpr::Function {
                        func: *func,
                        args: args.into_iter().map(|a| a.expr).collect(),
                    },
                    hint,
                ))
            }
            Expr::Aggregate { func, arg, distinct } => {
                let arg = arg.as_ref().map(|a| self.value(ctx, a)).transpose()?;
                if arg.as_ref().is_some_and(|a| a.expr.contains_aggregate()) {
                    return Err(self.error("aggregates cannot be nested", expr));
                }
                if arg.is_none() && *func != AggregateFunc::Count {
                    return Err(self.error("aggregate needs an argument", expr));
                }
                let hint = match func {
                    AggregateFunc::Count => Some(HostType::I64),
                    AggregateFunc::Avg => Some(HostType::F64),
                    AggregateFunc::Sum | AggregateFunc::Min | AggregateFunc::Max => {
                        arg.as_ref().and_then(|a| a.hint)
                    }
                };
                Ok(Resolved::new(
                    SqlExpr::Aggregate {
                        func: *func,
                        arg: arg.map(|a| Box::new(a.expr)),
                        distinct: *distinct,
                    },
                    hint,
                ))
            }
            Expr::Related {
                table,
                kind,
                predicate,
            } => self.related(ctx, table, *kind, predicate.as_deref(), expr),
        }
    }

    /// Rewrites a related-collection reference into a correlated sub-query.
    fn related(
        &self,
        ctx: &mut TranslationContext<'a>,
        table: &str,
        kind: RelatedKind,
        predicate: Option<&Expr>,
        expr: &Expr,
    ) -> Result<Resolved, TranslationError> {
        let related = self.lookup_table(table)?;
        ctx.scopes.push(Vec::new());
        let source = ctx.add_table(related, false);

        let inner = ctx
            .scopes
            .last()
            .and_then(|s| s.first())
            .ok_or_else(|| self.error("related table is not in scope", expr))?;
        let outer_scopes = &ctx.scopes[..ctx.scopes.len() - 1];
        let link = outer_scopes
            .iter()
            .rev()
            .flatten()
            .find_map(|outer| self.link(inner, outer))
            .ok_or_else(|| {
                self.error(
                    format!("no foreign key between `{table}` and the query's tables"),
                    expr,
                )
            })?;

        let condition = match predicate {
            Some(p) => {
                if p.contains_aggregate() {
                    return Err(self.error("aggregates are not allowed in related predicates", p));
                }
                and(Some(link), self.predicate(ctx, p)?)
            }
            None => link,
        };
        ctx.scopes.pop();

        let (output, hint) = match kind {
            RelatedKind::Any => (SqlExpr::Literal(Value::Int(1)), Some(HostType::Bool)),
            RelatedKind::Count => (
                SqlExpr::Aggregate {
                    func: AggregateFunc::Count,
                    arg: None,
                    distinct: false,
                },
                Some(HostType::I64),
            ),
        };
        let mut select = SelectExpression::new(source);
        select.projection = vec![OutputColumn {
            expr: output,
            name: String::new(),
            hint: None,
        }];
        select.predicate = Some(condition);
        let expr = match kind {
            RelatedKind::Any => SqlExpr::Exists(Box::new(select)),
            RelatedKind::Count => SqlExpr::Subquery(Box::new(select)),
        };
        Ok(Resolved::new(expr, hint))
    }

    fn assignment_column(&self, table: &Table, column: &str) -> Result<String, TranslationError> {
        find_column(table, column)
            .map(|c| c.name.clone())
            .ok_or_else(|| self.error(format!("unknown column `{column}`"), &column))
    }

    fn translate_insert(&self, insert: &Insert) -> Result<InsertExpression, TranslationError> {
        let table = self.lookup_table(&insert.table)?;
        let mut ctx = TranslationContext::new(false);
        ctx.add_table(table, false);
        let mut columns = Vec::with_capacity(insert.values.len());
        let mut values = Vec::with_capacity(insert.values.len());
        for (column, value) in &insert.values {
            columns.push(self.assignment_column(table, column)?);
            values.push(self.value(&mut ctx, value)?.expr);
        }
        if columns.is_empty() {
            return Err(self.error("insert needs at least one value", &self.description));
        }
        Ok(InsertExpression {
            table: table.name.clone(),
            columns,
            values,
        })
    }

    fn translate_update(&self, update: &Update) -> Result<UpdateExpression, TranslationError> {
        let table = self.lookup_table(&update.table)?;
        let mut exprs: Vec<&Expr> = update.assignments.iter().map(|(_, e)| e).collect();
        exprs.extend(&update.filter);
        let mut ctx = TranslationContext::new(count_related(&exprs) > 0);
        ctx.add_table(table, true);
        let mut assignments = Vec::with_capacity(update.assignments.len());
        for (column, value) in &update.assignments {
            let column = self.assignment_column(table, column)?;
            assignments.push((column, self.value(&mut ctx, value)?.expr));
        }
        if assignments.is_empty() {
            return Err(self.error("update needs at least one assignment", &self.description));
        }
        let predicate = update
            .filter
            .as_ref()
            .map(|p| self.predicate(&mut ctx, p))
            .transpose()?;
        Ok(UpdateExpression {
            table: table.name.clone(),
            assignments,
            predicate,
        })
    }

    fn translate_delete(&self, delete: &Delete) -> Result<DeleteExpression, TranslationError> {
        let table = self.lookup_table(&delete.table)?;
        let exprs: Vec<&Expr> = delete.filter.iter().collect();
        let mut ctx = TranslationContext::new(count_related(&exprs) > 0);
        ctx.add_table(table, true);
        let predicate = delete
            .filter
            .as_ref()
            .map(|p| self.predicate(&mut ctx, p))
            .transpose()?;
        Ok(DeleteExpression {
            table: table.name.clone(),
            predicate,
        })
    }
}

fn all_columns(ctx: &TranslationContext<'_>) -> Vec<OutputColumn> {
    ctx.scopes
        .first()
        .into_iter()
        .flatten()
        .flat_map(|entry| {
            entry.table.columns.iter().map(move |c| {
                let r = column_expr(entry, c);
                OutputColumn {
                    expr: r.expr,
                    name: c.name.clone(),
                    hint: r.hint,
                }
            })
        })
        .collect()
}

fn group_outputs(ctx: &TranslationContext<'_>, group_by: &[SqlExpr]) -> Vec<OutputColumn> {
    group_by
        .iter()
        .enumerate()
        .map(|(i, e)| {
            let (name, hint) = match e {
                SqlExpr::Column { table, name, .. } => (
                    name.clone(),
                    ctx.entry(*table)
                        .and_then(|entry| entry.table.column(name))
                        .and_then(|c| c.host),
                ),
                _ => (format!("expr{i}"), None),
            };
            OutputColumn {
                expr: e.clone(),
                name,
                hint,
            }
        })
        .collect()
}

/// Renames later duplicates of an output name to `<table><column><index>`.
fn rename_duplicates(ctx: &TranslationContext<'_>, outputs: &mut [OutputColumn]) {
    let mut seen = HashSet::new();
    for (i, output) in outputs.iter_mut().enumerate() {
        if output.name.is_empty() || seen.insert(output.name.to_lowercase()) {
            continue;
        }
        let base = match &output.expr {
            SqlExpr::Column { table, name, .. } => format!("{}{name}{i}", ctx.table_name(*table)),
            _ => format!("{}{i}", output.name),
        };
        let mut renamed = base.clone();
        let mut n = 0;
        while !seen.insert(renamed.to_lowercase()) {
            n += 1;
            renamed = format!("{base}_{n}");
        }
        output.name = renamed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("books"), "b");
        assert_eq!(short_name("book_reviews"), "br");
        assert_eq!(short_name("BookReviews"), "br");
        assert_eq!(short_name("__"), "t");
    }

    #[test]
    fn test_aliases_are_unique_and_suffixed() {
        let mut aliases = AliasGenerator::new(true);
        assert_eq!(aliases.next("books").as_deref(), Some("b$"));
        assert_eq!(aliases.next("bundles").as_deref(), Some("b1$"));
        assert_eq!(aliases.next("books").as_deref(), Some("b2$"));
        assert_eq!(AliasGenerator::new(false).next("books"), None);
    }
}
