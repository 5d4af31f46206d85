//! `PostgreSQL` dialect.

use std::sync::LazyLock;

use crate::model::{Column, Index, ObjectName};
use crate::types::TypeRegistry;

use super::{DdlDialect, Dialect, Features, SqlTemplates, Vendor};

static TYPES: LazyLock<TypeRegistry> = LazyLock::new(TypeRegistry::postgres);
static TEMPLATES: LazyLock<SqlTemplates> = LazyLock::new(SqlTemplates::ansi);

/// `PostgreSQL` dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Creates a new `PostgreSQL` dialect.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn vendor(&self) -> Vendor {
        Vendor::Postgres
    }

    fn features(&self) -> Features {
        Features::POSTGRES
    }

    fn types(&self) -> &TypeRegistry {
        &TYPES
    }

    fn templates(&self) -> &SqlTemplates {
        &TEMPLATES
    }

    fn parameter_marker(&self, position: usize) -> String {
        format!("${position}")
    }

    fn default_schema(&self) -> Option<&'static str> {
        Some("public")
    }
}

impl DdlDialect for PostgresDialect {
    fn as_dialect(&self) -> &dyn Dialect {
        self
    }

    fn identity_clause(&self) -> &'static str {
        " GENERATED BY DEFAULT AS IDENTITY"
    }

    fn alter_column(&self, table: &ObjectName, old: &Column, new: &Column) -> Vec<String> {
        let prefix = format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            self.quote_name(table),
            self.quote_identifier(&new.name)
        );
        let mut sql = Vec::new();
        if !old.type_info.same_as(&new.type_info) {
            sql.push(format!(
                "{prefix} TYPE {ty} USING {col}::{ty}",
                ty = new.type_info,
                col = self.quote_identifier(&new.name)
            ));
        }
        if old.nullable != new.nullable {
            let action = if new.nullable {
                "DROP NOT NULL"
            } else {
                "SET NOT NULL"
            };
            sql.push(format!("{prefix} {action}"));
        }
        sql
    }

    fn alter_default(&self, table: &ObjectName, _old: &Column, new: &Column) -> Vec<String> {
        let prefix = format!(
            "ALTER TABLE {} ALTER COLUMN {}",
            self.quote_name(table),
            self.quote_identifier(&new.name)
        );
        vec![match &new.default {
            Some(default) => format!("{prefix} SET DEFAULT {default}"),
            None => format!("{prefix} DROP DEFAULT"),
        }]
    }

    fn drop_index(&self, table: &ObjectName, index: &Index) -> String {
        let qualified = ObjectName {
            schema: table.schema.clone(),
            name: index.name.clone(),
        };
        format!("DROP INDEX {}", self.quote_name(&qualified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{bigint, varchar, TableSpec};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_identity_and_schema() {
        let table = TableSpec::new("lib.books")
            .column(bigint("id").identity())
            .column(varchar("title", 200))
            .primary_key(&["id"])
            .resolve(&TYPES);
        assert_eq!(
            PostgresDialect::new().create_table(&table, false),
            "CREATE TABLE \"lib\".\"books\" (\n\
             \x20   \"id\" bigint GENERATED BY DEFAULT AS IDENTITY NOT NULL,\n\
             \x20   \"title\" character varying(200),\n\
             \x20   CONSTRAINT \"pk_books\" PRIMARY KEY (\"id\")\n\
             )"
        );
    }

    #[test]
    fn test_alter_column_type_and_nullability() {
        let old = Column::new("title", crate::types::DbTypeInfo::sized("character varying", 100));
        let mut new = Column::new("title", crate::types::DbTypeInfo::simple("text"));
        new.nullable = false;
        let sql = PostgresDialect::new().alter_column(&ObjectName::new("books"), &old, &new);
        assert_eq!(
            sql,
            vec![
                String::from(
                    "ALTER TABLE \"books\" ALTER COLUMN \"title\" TYPE text USING \"title\"::text"
                ),
                String::from("ALTER TABLE \"books\" ALTER COLUMN \"title\" SET NOT NULL"),
            ]
        );
    }
}
