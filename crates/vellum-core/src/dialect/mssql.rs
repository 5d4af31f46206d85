//! SQL Server dialect.
//!
//! Only SQL generation is provided; there is no SQL Server driver.

use std::sync::LazyLock;

use crate::fragment::SqlFragment;
use crate::model::{Column, Index, ObjectName, Table};
use crate::types::TypeRegistry;

use super::{clause, DdlDialect, Dialect, Features, SqlTemplates, Vendor};

static TYPES: LazyLock<TypeRegistry> = LazyLock::new(TypeRegistry::mssql);
static TEMPLATES: LazyLock<SqlTemplates> = LazyLock::new(SqlTemplates::mssql);

/// SQL Server dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct MsSqlDialect;

impl MsSqlDialect {
    /// Creates a new SQL Server dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn default_constraint(table: &ObjectName, column: &str) -> String {
        format!("DF_{}_{column}", table.name)
    }

    fn sp_rename_target(&self, table: &ObjectName, column: Option<&str>) -> String {
        let schema = table.schema.as_deref().unwrap_or("dbo");
        let mut target = format!("{schema}.{}", table.name);
        if let Some(column) = column {
            target.push('.');
            target.push_str(column);
        }
        target.replace('\'', "''")
    }
}

impl Dialect for MsSqlDialect {
    fn name(&self) -> &'static str {
        "mssql"
    }

    fn vendor(&self) -> Vendor {
        Vendor::MsSql
    }

    fn features(&self) -> Features {
        Features::MSSQL
    }

    fn types(&self) -> &TypeRegistry {
        &TYPES
    }

    fn templates(&self) -> &SqlTemplates {
        &TEMPLATES
    }

    fn identifier_quotes(&self) -> (char, char) {
        ('[', ']')
    }

    fn parameter_marker(&self, position: usize) -> String {
        format!("@P{position}")
    }

    fn paging(&self, offset: Option<SqlFragment>, limit: Option<SqlFragment>) -> Option<SqlFragment> {
        if offset.is_none() && limit.is_none() {
            return None;
        }
        let mut children = vec![SqlFragment::text(" OFFSET ")];
        children.push(offset.unwrap_or_else(|| SqlFragment::text("0")));
        children.push(SqlFragment::text(" ROWS"));
        if let Some(limit) = limit {
            children.push(SqlFragment::text(" FETCH NEXT "));
            children.push(limit);
            children.push(SqlFragment::text(" ROWS ONLY"));
        }
        clause(children)
    }

    fn batch_separator(&self) -> &'static str {
        "\nGO"
    }

    fn default_schema(&self) -> Option<&'static str> {
        Some("dbo")
    }
}

impl DdlDialect for MsSqlDialect {
    fn as_dialect(&self) -> &dyn Dialect {
        self
    }

    fn identity_clause(&self) -> &'static str {
        " IDENTITY(1,1)"
    }

    fn column_definition(&self, table: &Table, col: &Column) -> String {
        if let Some(expr) = &col.computed {
            return format!("{} AS ({expr})", self.quote_identifier(&col.name));
        }
        let mut sql = format!("{} {}", self.quote_identifier(&col.name), col.type_info);
        if col.identity {
            sql.push_str(self.identity_clause());
        }
        sql.push_str(if col.nullable { " NULL" } else { " NOT NULL" });
        if let Some(default) = &col.default {
            sql.push_str(&self.default_clause(&table.name, col, default));
        }
        sql
    }

    fn default_clause(&self, table: &ObjectName, col: &Column, default: &str) -> String {
        format!(
            " CONSTRAINT {} DEFAULT {default}",
            self.quote_identifier(&Self::default_constraint(table, &col.name))
        )
    }

    fn add_column(&self, table: &Table, col: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.quote_name(&table.name),
            self.column_definition(table, col)
        )
    }

    fn drop_column(&self, table: &ObjectName, col: &Column) -> String {
        let column = self.quote_identifier(&col.name);
        match &col.default {
            Some(_) => format!(
                "ALTER TABLE {} DROP CONSTRAINT {}, COLUMN {column}",
                self.quote_name(table),
                self.quote_identifier(&Self::default_constraint(table, &col.name))
            ),
            None => format!("ALTER TABLE {} DROP COLUMN {column}", self.quote_name(table)),
        }
    }

    fn rename_table(&self, old: &ObjectName, new_name: &str) -> String {
        format!(
            "EXEC sp_rename '{}', '{}'",
            self.sp_rename_target(old, None),
            new_name.replace('\'', "''")
        )
    }

    fn rename_column(&self, table: &ObjectName, old: &str, new: &str) -> String {
        format!(
            "EXEC sp_rename '{}', '{}', 'COLUMN'",
            self.sp_rename_target(table, Some(old)),
            new.replace('\'', "''")
        )
    }

    fn alter_column(&self, table: &ObjectName, old: &Column, new: &Column) -> Vec<String> {
        if old.type_info.same_as(&new.type_info) && old.nullable == new.nullable {
            return Vec::new();
        }
        vec![format!(
            "ALTER TABLE {} ALTER COLUMN {} {}{}",
            self.quote_name(table),
            self.quote_identifier(&new.name),
            new.type_info,
            if new.nullable { " NULL" } else { " NOT NULL" }
        )]
    }

    fn alter_default(&self, table: &ObjectName, old: &Column, new: &Column) -> Vec<String> {
        let constraint = self.quote_identifier(&Self::default_constraint(table, &new.name));
        let mut sql = Vec::new();
        if old.default.is_some() {
            sql.push(format!(
                "ALTER TABLE {} DROP CONSTRAINT {constraint}",
                self.quote_name(table)
            ));
        }
        if let Some(default) = &new.default {
            sql.push(format!(
                "ALTER TABLE {} ADD CONSTRAINT {constraint} DEFAULT {default} FOR {}",
                self.quote_name(table),
                self.quote_identifier(&new.name)
            ));
        }
        sql
    }

    fn drop_index(&self, table: &ObjectName, index: &Index) -> String {
        format!(
            "DROP INDEX {} ON {}",
            self.quote_identifier(&index.name),
            self.quote_name(table)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{bigint, text, TableSpec};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_add_not_null_column_with_default() {
        let table = TableSpec::new("books")
            .column(bigint("id").identity())
            .column(text("notes").not_null().default_expr("N''"))
            .resolve(&TYPES);
        let sql = MsSqlDialect::new().add_column(&table, &table.columns[1]);
        assert_eq!(
            sql,
            "ALTER TABLE [books] ADD [notes] nvarchar(max) NOT NULL CONSTRAINT [DF_books_notes] DEFAULT N''"
        );
    }

    #[test]
    fn test_rename_column_uses_sp_rename() {
        assert_eq!(
            MsSqlDialect::new().rename_column(&ObjectName::new("books"), "name", "title"),
            "EXEC sp_rename 'dbo.books.name', 'title', 'COLUMN'"
        );
    }
}
