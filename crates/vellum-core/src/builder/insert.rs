//! INSERT rendering.

use crate::error::SqlError;
use crate::fragment::SqlFragment;
use crate::query::InsertExpression;

use super::{statement, SqlBuilder};

impl SqlBuilder<'_> {
    /// Renders `INSERT INTO t (a, b) VALUES (x, y)`.
    ///
    /// # Errors
    ///
    /// Fails when a value cannot be rendered.
    pub fn insert(&self, insert: &InsertExpression) -> Result<SqlFragment, SqlError> {
        let columns = insert.columns.iter().map(|c| self.identifier(c)).collect();
        Ok(statement(vec![
            SqlFragment::text("INSERT INTO "),
            self.name(&insert.table),
            SqlFragment::text(" ("),
            SqlFragment::list(columns),
            SqlFragment::text(") VALUES ("),
            SqlFragment::list(self.exprs(&insert.values)?),
            SqlFragment::text(")"),
        ]))
    }
}
