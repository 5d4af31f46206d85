//! UPDATE rendering.

use crate::error::SqlError;
use crate::fragment::SqlFragment;
use crate::query::UpdateExpression;

use super::{statement, SqlBuilder};

impl SqlBuilder<'_> {
    /// Renders `UPDATE t SET a = x [WHERE ...]`.
    ///
    /// # Errors
    ///
    /// Fails when an expression cannot be rendered.
    pub fn update(&self, update: &UpdateExpression) -> Result<SqlFragment, SqlError> {
        let eq = &self.dialect.templates().eq;
        let mut assignments = Vec::with_capacity(update.assignments.len());
        for (column, value) in &update.assignments {
            assignments.push(eq.format(vec![self.identifier(column), self.expr(value)?])?);
        }
        let mut parts = vec![
            SqlFragment::text("UPDATE "),
            self.name(&update.table),
            SqlFragment::text(" SET "),
            SqlFragment::list(assignments),
        ];
        if let Some(predicate) = &update.predicate {
            parts.push(SqlFragment::text(" WHERE "));
            parts.push(self.expr(predicate)?);
        }
        Ok(statement(parts))
    }
}
