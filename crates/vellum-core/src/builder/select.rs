//! SELECT rendering.

use crate::error::SqlError;
use crate::fragment::{Precedence, SqlFragment};
use crate::query::{JoinKind, SelectExpression, SourceKind, TableSource};

use super::{statement, SqlBuilder};

impl SqlBuilder<'_> {
    /// Renders a select, paging included.
    ///
    /// # Errors
    ///
    /// Fails when an expression cannot be rendered.
    pub fn select(&self, select: &SelectExpression) -> Result<SqlFragment, SqlError> {
        let t = self.dialect.templates();
        let mut parts = vec![SqlFragment::text(if select.distinct {
            "SELECT DISTINCT "
        } else {
            "SELECT "
        })];

        let mut outputs = Vec::with_capacity(select.projection.len());
        for output in &select.projection {
            let expr = self.expr(&output.expr)?;
            outputs.push(if output.needs_alias() {
                t.alias.format(vec![expr, self.identifier(&output.name)])?
            } else {
                expr
            });
        }
        parts.push(SqlFragment::list(outputs));

        parts.push(SqlFragment::text(" FROM "));
        for (i, source) in select.sources.iter().enumerate() {
            match (i, source.join) {
                (0, _) => {}
                (_, Some(JoinKind::Left)) => parts.push(SqlFragment::text(" LEFT JOIN ")),
                (_, Some(JoinKind::Inner) | None) => parts.push(SqlFragment::text(" INNER JOIN ")),
            }
            parts.push(self.source(source)?);
            if let Some(on) = &source.on {
                parts.push(SqlFragment::text(" ON "));
                parts.push(self.expr(on)?);
            }
        }

        if let Some(predicate) = &select.predicate {
            parts.push(SqlFragment::text(" WHERE "));
            parts.push(self.expr(predicate)?);
        }
        if !select.group_by.is_empty() {
            parts.push(SqlFragment::text(" GROUP BY "));
            parts.push(SqlFragment::list(self.exprs(&select.group_by)?));
        }
        if let Some(having) = &select.having {
            parts.push(SqlFragment::text(" HAVING "));
            parts.push(self.expr(having)?);
        }
        if !select.order_by.is_empty() {
            let mut items = Vec::with_capacity(select.order_by.len());
            for item in &select.order_by {
                let expr = self.expr(&item.expr)?;
                items.push(if item.descending {
                    SqlFragment::join(vec![expr, SqlFragment::text("DESC")], " ", Precedence::LOWEST)
                } else {
                    expr
                });
            }
            parts.push(SqlFragment::text(" ORDER BY "));
            parts.push(SqlFragment::list(items));
        }

        let offset = select.offset.as_ref().map(|e| self.expr(e)).transpose()?;
        let limit = select.limit.as_ref().map(|e| self.expr(e)).transpose()?;
        if let Some(paging) = self.dialect.paging(offset, limit) {
            parts.push(paging);
        }
        Ok(statement(parts))
    }

    fn source(&self, source: &TableSource) -> Result<SqlFragment, SqlError> {
        let table = match &source.kind {
            SourceKind::Table(name) => self.name(name),
            SourceKind::Derived(inner) => self.dialect.templates().subquery.format(vec![self.select(inner)?])?,
        };
        Ok(match &source.alias {
            Some(alias) => statement(vec![table, SqlFragment::text(" AS "), self.identifier(alias)]),
            None => table,
        })
    }
}
