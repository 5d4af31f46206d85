//! Dialect-specific DDL generation.

use crate::model::{Column, Index, Key, ObjectName, Sequence, Table, View};

use super::{Dialect, Features};

/// Trait for dialect-specific DDL generation.
///
/// Every method renders exactly one statement unless documented otherwise.
/// The schema updater decides which methods to call from [`Features`]; a
/// dialect never reorders or drops work.
pub trait DdlDialect: Dialect {
    /// Returns `self` as a query dialect.
    fn as_dialect(&self) -> &dyn Dialect;

    /// Generates SQL for CREATE SCHEMA.
    fn create_schema(&self, schema: &str) -> String {
        format!("CREATE SCHEMA {}", self.quote_identifier(schema))
    }

    /// Generates SQL for CREATE TABLE.
    ///
    /// With `inline_foreign_keys` the table's foreign keys are declared in
    /// the statement; otherwise they are added separately.
    fn create_table(&self, table: &Table, inline_foreign_keys: bool) -> String {
        let mut sql = String::from("CREATE TABLE ");
        sql.push_str(&self.quote_name(&table.name));
        sql.push_str(" (\n");

        let mut lines: Vec<String> = table
            .columns
            .iter()
            .map(|c| format!("    {}", self.column_definition(table, c)))
            .collect();

        if let Some(pk) = &table.primary_key {
            if !self.primary_key_is_inline(table) {
                lines.push(format!("    {}", self.primary_key_clause(table, pk)));
            }
        }
        if inline_foreign_keys {
            for fk in &table.foreign_keys {
                lines.push(format!("    {}", self.foreign_key_clause(table, fk)));
            }
        }
        sql.push_str(&lines.join(",\n"));
        sql.push_str("\n)");
        sql
    }

    /// Whether the primary key is declared on the column itself.
    fn primary_key_is_inline(&self, table: &Table) -> bool {
        let _ = table;
        false
    }

    /// Generates SQL for DROP TABLE.
    fn drop_table(&self, name: &ObjectName) -> String {
        format!("DROP TABLE {}", self.quote_name(name))
    }

    /// Generates SQL for RENAME TABLE.
    fn rename_table(&self, old: &ObjectName, new_name: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quote_name(old),
            self.quote_identifier(new_name)
        )
    }

    /// Generates SQL for a column definition.
    fn column_definition(&self, table: &Table, col: &Column) -> String {
        let mut sql = format!("{} {}", self.quote_identifier(&col.name), col.type_info);
        if let Some(expr) = &col.computed {
            sql.push_str(&format!(" GENERATED ALWAYS AS ({expr}) STORED"));
            return sql;
        }
        if col.identity {
            sql.push_str(self.identity_clause());
        }
        if !col.nullable {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = &col.default {
            sql.push_str(&self.default_clause(&table.name, col, default));
        }
        sql
    }

    /// Returns the identity clause, with its leading space.
    fn identity_clause(&self) -> &'static str;

    /// Renders a DEFAULT clause, with its leading space.
    fn default_clause(&self, table: &ObjectName, col: &Column, default: &str) -> String {
        let _ = (table, col);
        format!(" DEFAULT {default}")
    }

    /// Generates SQL for a PRIMARY KEY table constraint.
    fn primary_key_clause(&self, table: &Table, key: &Key) -> String {
        let mut sql = String::new();
        if let Some(name) = &key.name {
            sql.push_str(&format!("CONSTRAINT {} ", self.quote_identifier(name)));
        }
        let _ = table;
        sql.push_str(&format!("PRIMARY KEY ({})", self.column_list(&key.columns)));
        sql
    }

    /// Generates SQL for a FOREIGN KEY table constraint.
    fn foreign_key_clause(&self, table: &Table, key: &Key) -> String {
        let _ = table;
        let mut sql = String::new();
        if let Some(name) = &key.name {
            sql.push_str(&format!("CONSTRAINT {} ", self.quote_identifier(name)));
        }
        sql.push_str(&format!("FOREIGN KEY ({})", self.column_list(&key.columns)));
        if let Some((target, target_columns)) = key.target() {
            sql.push_str(&format!(
                " REFERENCES {} ({})",
                self.quote_name(target),
                self.column_list(target_columns)
            ));
        }
        if key.cascade_delete {
            sql.push_str(" ON DELETE CASCADE");
        }
        sql
    }

    /// Quotes and joins column names.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Generates SQL for ADD COLUMN.
    fn add_column(&self, table: &Table, col: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_name(&table.name),
            self.column_definition(table, col)
        )
    }

    /// Generates SQL for DROP COLUMN.
    fn drop_column(&self, table: &ObjectName, col: &Column) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            self.quote_name(table),
            self.quote_identifier(&col.name)
        )
    }

    /// Generates SQL for RENAME COLUMN.
    fn rename_column(&self, table: &ObjectName, old: &str, new: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            self.quote_name(table),
            self.quote_identifier(old),
            self.quote_identifier(new)
        )
    }

    /// Generates the statements changing a column's type and nullability in
    /// place. Only called when the vendor has [`Features::ALTER_COLUMN`].
    fn alter_column(&self, table: &ObjectName, old: &Column, new: &Column) -> Vec<String>;

    /// Generates the statements changing a column's default. Only called
    /// when the vendor has [`Features::ALTER_COLUMN`].
    fn alter_default(&self, table: &ObjectName, old: &Column, new: &Column) -> Vec<String>;

    /// Generates the back-fill UPDATE for a column being tightened to NOT NULL.
    fn backfill(&self, table: &ObjectName, column: &str, value: &str) -> String {
        let col = self.quote_identifier(column);
        format!(
            "UPDATE {} SET {col} = {value} WHERE {col} IS NULL",
            self.quote_name(table)
        )
    }

    /// Generates the UPDATE copying one column into another.
    fn copy_column(&self, table: &ObjectName, from: &str, to: &str) -> String {
        format!(
            "UPDATE {} SET {} = {}",
            self.quote_name(table),
            self.quote_identifier(to),
            self.quote_identifier(from)
        )
    }

    /// Generates SQL for CREATE INDEX.
    fn create_index(&self, table: &ObjectName, index: &Index) -> String {
        let mut sql = String::from("CREATE ");
        if index.unique {
            sql.push_str("UNIQUE ");
        }
        sql.push_str("INDEX ");
        sql.push_str(&self.quote_identifier(&index.name));
        sql.push_str(" ON ");
        sql.push_str(&self.quote_name(table));
        sql.push_str(&format!(" ({})", self.column_list(&index.columns)));
        if let Some(filter) = &index.filter {
            if self.features().contains(Features::FILTERED_INDEXES) {
                sql.push_str(" WHERE ");
                sql.push_str(filter);
            }
        }
        sql
    }

    /// Generates SQL for DROP INDEX.
    fn drop_index(&self, table: &ObjectName, index: &Index) -> String;

    /// Generates SQL adding a primary key to an existing table.
    fn add_primary_key(&self, table: &Table, key: &Key) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.quote_name(&table.name),
            self.primary_key_clause(table, key)
        )
    }

    /// Generates SQL dropping a primary key.
    fn drop_primary_key(&self, table: &ObjectName, key: &Key) -> String {
        let name = key
            .name
            .clone()
            .unwrap_or_else(|| format!("{}_pkey", table.name));
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_name(table),
            self.quote_identifier(&name)
        )
    }

    /// Generates SQL for ADD FOREIGN KEY.
    fn add_foreign_key(&self, table: &Table, key: &Key) -> String {
        format!(
            "ALTER TABLE {} ADD {}",
            self.quote_name(&table.name),
            self.foreign_key_clause(table, key)
        )
    }

    /// Generates SQL for DROP FOREIGN KEY.
    fn drop_foreign_key(&self, table: &ObjectName, key: &Key) -> String {
        let name = key.name.clone().unwrap_or_default();
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            self.quote_name(table),
            self.quote_identifier(&name)
        )
    }

    /// Generates SQL for CREATE VIEW.
    fn create_view(&self, view: &View) -> String {
        let kind = if view.materialized {
            "MATERIALIZED VIEW"
        } else {
            "VIEW"
        };
        format!(
            "CREATE {kind} {} AS {}",
            self.quote_name(&view.name),
            view.definition.trim().trim_end_matches(';')
        )
    }

    /// Generates SQL for DROP VIEW.
    fn drop_view(&self, view: &View) -> String {
        let kind = if view.materialized {
            "MATERIALIZED VIEW"
        } else {
            "VIEW"
        };
        format!("DROP {kind} {}", self.quote_name(&view.name))
    }

    /// Generates SQL for CREATE SEQUENCE.
    fn create_sequence(&self, sequence: &Sequence) -> String {
        format!(
            "CREATE SEQUENCE {} START WITH {} INCREMENT BY {}",
            self.quote_name(&sequence.name),
            sequence.start,
            sequence.increment
        )
    }

    /// Generates SQL for DROP SEQUENCE.
    fn drop_sequence(&self, sequence: &Sequence) -> String {
        format!("DROP SEQUENCE {}", self.quote_name(&sequence.name))
    }

    /// Session statements issued before any DDL.
    fn session_setup(&self) -> Vec<String> {
        Vec::new()
    }

    /// Session statements issued after all DDL.
    fn session_teardown(&self) -> Vec<String> {
        Vec::new()
    }
}
