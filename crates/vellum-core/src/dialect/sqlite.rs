//! `SQLite` dialect.

use std::sync::LazyLock;

use crate::fragment::SqlFragment;
use crate::model::{Column, Index, ObjectName, Table};
use crate::types::TypeRegistry;

use super::{clause, DdlDialect, Dialect, Features, SqlTemplates, Vendor};

static TYPES: LazyLock<TypeRegistry> = LazyLock::new(TypeRegistry::sqlite);
static TEMPLATES: LazyLock<SqlTemplates> = LazyLock::new(SqlTemplates::ansi);

/// `SQLite` dialect.
///
/// `SQLite` cannot alter columns or add constraints to existing tables:
/// foreign keys are declared inline and column changes go through the
/// add/copy/drop/rename sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new `SQLite` dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn inline_identity_column<'t>(table: &'t Table) -> Option<&'t Column> {
        match table.primary_key_columns() {
            [only] => table.column(only).filter(|c| c.identity),
            _ => None,
        }
    }
}

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn vendor(&self) -> Vendor {
        Vendor::Sqlite
    }

    fn features(&self) -> Features {
        Features::SQLITE
    }

    fn types(&self) -> &TypeRegistry {
        &TYPES
    }

    fn templates(&self) -> &SqlTemplates {
        &TEMPLATES
    }

    fn paging(&self, offset: Option<SqlFragment>, limit: Option<SqlFragment>) -> Option<SqlFragment> {
        // OFFSET is only valid after LIMIT; -1 means no limit.
        let mut children = Vec::new();
        match (limit, offset.is_some()) {
            (Some(limit), _) => {
                children.push(SqlFragment::text(" LIMIT "));
                children.push(limit);
            }
            (None, true) => children.push(SqlFragment::text(" LIMIT -1")),
            (None, false) => {}
        }
        if let Some(offset) = offset {
            children.push(SqlFragment::text(" OFFSET "));
            children.push(offset);
        }
        clause(children)
    }
}

impl DdlDialect for SqliteDialect {
    fn as_dialect(&self) -> &dyn Dialect {
        self
    }

    fn identity_clause(&self) -> &'static str {
        ""
    }

    fn primary_key_is_inline(&self, table: &Table) -> bool {
        Self::inline_identity_column(table).is_some()
    }

    fn column_definition(&self, table: &Table, col: &Column) -> String {
        let mut sql = format!("{} {}", self.quote_identifier(&col.name), col.type_info);
        if let Some(expr) = &col.computed {
            // ADD COLUMN cannot add STORED columns.
            sql.push_str(&format!(" GENERATED ALWAYS AS ({expr}) VIRTUAL"));
            return sql;
        }
        if !col.nullable {
            sql.push_str(" NOT NULL");
        }
        if Self::inline_identity_column(table).is_some_and(|c| c.name == col.name) {
            sql.push_str(" PRIMARY KEY AUTOINCREMENT");
        }
        if let Some(default) = &col.default {
            sql.push_str(&format!(" DEFAULT {default}"));
        }
        sql
    }

    fn alter_column(&self, _table: &ObjectName, _old: &Column, _new: &Column) -> Vec<String> {
        Vec::new()
    }

    fn alter_default(&self, _table: &ObjectName, _old: &Column, _new: &Column) -> Vec<String> {
        Vec::new()
    }

    fn drop_index(&self, _table: &ObjectName, index: &Index) -> String {
        // SQLite index names are global, not per-table
        format!("DROP INDEX {}", self.quote_identifier(&index.name))
    }

    fn session_setup(&self) -> Vec<String> {
        vec![String::from("PRAGMA defer_foreign_keys = ON")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{bigint, varchar, TableSpec};
    use pretty_assertions::assert_eq;

    fn books() -> Table {
        TableSpec::new("books")
            .column(bigint("id").identity())
            .column(varchar("title", 200).not_null().default_expr("''"))
            .column(bigint("publisher_id").references("publishers", "id"))
            .primary_key(&["id"])
            .resolve(&TYPES)
    }

    #[test]
    fn test_create_table_inlines_identity_and_foreign_keys() {
        let sql = SqliteDialect::new().create_table(&books(), true);
        assert_eq!(
            sql,
            "CREATE TABLE \"books\" (\n\
             \x20   \"id\" INTEGER NOT NULL PRIMARY KEY AUTOINCREMENT,\n\
             \x20   \"title\" TEXT NOT NULL DEFAULT '',\n\
             \x20   \"publisher_id\" INTEGER,\n\
             \x20   CONSTRAINT \"fk_books_publishers_publisher_id\" FOREIGN KEY (\"publisher_id\") \
             REFERENCES \"publishers\" (\"id\")\n\
             )"
        );
    }

    #[test]
    fn test_drop_index_is_global() {
        let index = Index {
            name: String::from("ix_books_title"),
            columns: vec![String::from("title")],
            unique: false,
            filter: None,
        };
        assert_eq!(
            SqliteDialect::new().drop_index(&ObjectName::new("books"), &index),
            "DROP INDEX \"ix_books_title\""
        );
    }
}
