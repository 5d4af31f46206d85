//! DELETE rendering.

use crate::error::SqlError;
use crate::fragment::SqlFragment;
use crate::query::DeleteExpression;

use super::{statement, SqlBuilder};

impl SqlBuilder<'_> {
    /// Renders `DELETE FROM t [WHERE ...]`.
    ///
    /// # Errors
    ///
    /// Fails when the predicate cannot be rendered.
    pub fn delete(&self, delete: &DeleteExpression) -> Result<SqlFragment, SqlError> {
        let mut parts = vec![SqlFragment::text("DELETE FROM "), self.name(&delete.table)];
        if let Some(predicate) = &delete.predicate {
            parts.push(SqlFragment::text(" WHERE "));
            parts.push(self.expr(predicate)?);
        }
        Ok(statement(parts))
    }
}
