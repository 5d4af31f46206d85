//! Schema loaders.
//!
//! A loader reads a live database's catalog and builds the [`DbModel`] the
//! schema updater compares against the declared one. Vendor modules only
//! issue read-only catalog queries and turn each result row into a
//! [`CatalogRow`]; [`fold`] assembles the model the same way for every
//! vendor.

mod postgres;
mod sqlite;

use std::collections::BTreeMap;

use tracing::info;
use vellum_core::model::{Column, DbModel, Index, Key, KeyKind, ObjectName, Sequence, Table, View};
use vellum_core::types::{DbTypeInfo, TypeRegistry};
use vellum_core::{Value, Vendor};

use crate::driver::Driver;
use crate::error::{DbError, Result};
use crate::version::VERSION_TABLE;

/// One normalized catalog fact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogRow {
    /// A schema.
    Schema {
        /// Schema name.
        name: String,
    },
    /// A table, possibly without columns yet.
    Table {
        /// Table name.
        table: ObjectName,
    },
    /// A column, in ordinal order within its table.
    Column {
        /// Owning table.
        table: ObjectName,
        /// Column name.
        name: String,
        /// Type as the catalog spells it, size arguments included.
        type_spec: String,
        /// Whether NULL is allowed.
        nullable: bool,
        /// Database-generated values.
        identity: bool,
        /// Stored default expression.
        default: Option<String>,
        /// Computed column expression.
        computed: Option<String>,
    },
    /// One column of a primary key.
    PrimaryKey {
        /// Owning table.
        table: ObjectName,
        /// Constraint name, when the vendor keeps one.
        name: Option<String>,
        /// Key column.
        column: String,
    },
    /// One column of an index.
    Index {
        /// Owning table.
        table: ObjectName,
        /// Index name.
        name: String,
        /// Indexed column.
        column: String,
        /// Unique index.
        unique: bool,
        /// Partial index predicate.
        filter: Option<String>,
    },
    /// One column pair of a foreign key.
    ForeignKey {
        /// Referencing table.
        table: ObjectName,
        /// Constraint name, or the vendor's per-table key id.
        name: String,
        /// Whether `name` is a real constraint name.
        named: bool,
        /// Referencing column.
        column: String,
        /// Referenced table.
        target: ObjectName,
        /// Referenced column.
        target_column: String,
        /// `ON DELETE CASCADE`
        cascade_delete: bool,
    },
    /// A view.
    View {
        /// View name.
        name: ObjectName,
        /// The SELECT text.
        definition: String,
        /// Materialized view.
        materialized: bool,
    },
    /// A free-standing sequence.
    Sequence {
        /// Sequence name.
        name: ObjectName,
        /// Start value.
        start: i64,
        /// Increment.
        increment: i64,
    },
}

/// Loads the model of the database behind `driver`.
///
/// `schemas` is the allow-list; empty means the vendor's default schema.
/// The version record table is never part of the model.
///
/// # Errors
///
/// [`DbError::Config`] for vendors without a loader, or the catalog query
/// error.
pub async fn load_schema(driver: &dyn Driver, schemas: &[String]) -> Result<DbModel> {
    let vendor = driver.vendor();
    let rows = match vendor {
        Vendor::Sqlite => sqlite::catalog(driver).await?,
        Vendor::Postgres => postgres::catalog(driver, schemas).await?,
        Vendor::MsSql | Vendor::MySql => {
            return Err(DbError::Config(format!("no schema loader for {vendor}")))
        }
    };
    let model = fold(driver.dialect().types(), rows);
    info!(
        vendor = %vendor,
        tables = model.tables.len(),
        views = model.views.len(),
        sequences = model.sequences.len(),
        "loaded schema"
    );
    Ok(model)
}

/// Builds a model from catalog rows. Types are canonicalized through
/// `registry`; rows of the version record table are dropped.
#[must_use]
pub fn fold(registry: &TypeRegistry, rows: Vec<CatalogRow>) -> DbModel {
    let mut model = DbModel::new();
    let mut tables: BTreeMap<ObjectName, Table> = BTreeMap::new();
    let mut fks: BTreeMap<(ObjectName, String), Key> = BTreeMap::new();

    for row in rows {
        match row {
            CatalogRow::Schema { name } => {
                model.schemas.insert(name);
            }
            CatalogRow::Table { table: name } => {
                table(&mut tables, &name);
            }
            CatalogRow::Column {
                table: name,
                name: column,
                type_spec,
                nullable,
                identity,
                default,
                computed,
            } => {
                let mut col = Column::new(column, registry.normalize(&DbTypeInfo::parse(&type_spec)));
                col.nullable = nullable;
                col.identity = identity;
                col.default = default;
                col.computed = computed;
                table(&mut tables, &name).columns.push(col);
            }
            CatalogRow::PrimaryKey {
                table: name,
                name: key_name,
                column,
            } => {
                let t = table(&mut tables, &name);
                let key = t.primary_key.get_or_insert_with(|| Key {
                    name: key_name,
                    kind: KeyKind::Primary,
                    columns: Vec::new(),
                    cascade_delete: false,
                });
                key.columns.push(column);
            }
            CatalogRow::Index {
                table: name,
                name: index_name,
                column,
                unique,
                filter,
            } => {
                let t = table(&mut tables, &name);
                match t.indexes.iter_mut().find(|i| i.name == index_name) {
                    Some(index) => index.columns.push(column),
                    None => t.indexes.push(Index {
                        name: index_name,
                        columns: vec![column],
                        unique,
                        filter,
                    }),
                }
            }
            CatalogRow::ForeignKey {
                table: name,
                name: key_name,
                named,
                column,
                target,
                target_column,
                cascade_delete,
            } => {
                let key = fks
                    .entry((name, key_name.clone()))
                    .or_insert_with(|| Key {
                        name: named.then_some(key_name),
                        kind: KeyKind::Foreign {
                            target,
                            target_columns: Vec::new(),
                        },
                        columns: Vec::new(),
                        cascade_delete,
                    });
                key.columns.push(column);
                if let KeyKind::Foreign { target_columns, .. } = &mut key.kind {
                    target_columns.push(target_column);
                }
            }
            CatalogRow::View {
                name,
                definition,
                materialized,
            } => model.views.push(View {
                name,
                definition,
                materialized,
            }),
            CatalogRow::Sequence {
                name,
                start,
                increment,
            } => model.sequences.push(Sequence {
                name,
                start,
                increment,
            }),
        }
    }

    for ((name, _), key) in fks {
        table(&mut tables, &name).foreign_keys.push(key);
    }
    for (name, t) in tables {
        if name.name.eq_ignore_ascii_case(VERSION_TABLE) {
            continue;
        }
        model.add_table(t);
    }
    model
}

fn table<'a>(tables: &'a mut BTreeMap<ObjectName, Table>, name: &ObjectName) -> &'a mut Table {
    tables
        .entry(name.clone())
        .or_insert_with(|| Table::new(name.clone()))
}

/// Drops the schema from names in the vendor's default schema.
pub(crate) fn object_name(schema: &str, name: String, default_schema: Option<&str>) -> ObjectName {
    if Some(schema) == default_schema {
        ObjectName::new(name)
    } else {
        ObjectName::qualified(schema, name)
    }
}

/// Positional access to a catalog result row.
pub(crate) struct CatalogValues<'r> {
    query: &'static str,
    row: &'r [Value],
}

impl<'r> CatalogValues<'r> {
    pub(crate) const fn new(query: &'static str, row: &'r [Value]) -> Self {
        Self { query, row }
    }

    fn unexpected(&self, index: usize, wanted: &str) -> DbError {
        DbError::Core(vellum_core::Error::Schema(format!(
            "catalog query `{}` returned {} in column {index}, expected {wanted}",
            self.query,
            self.row
                .get(index)
                .map_or_else(|| String::from("nothing"), ToString::to_string),
        )))
    }

    pub(crate) fn text(&self, index: usize) -> Result<String> {
        self.opt_text(index)?
            .ok_or_else(|| self.unexpected(index, "text"))
    }

    pub(crate) fn opt_text(&self, index: usize) -> Result<Option<String>> {
        match self.row.get(index) {
            Some(Value::Null) => Ok(None),
            Some(Value::Text(s)) => Ok(Some(s.clone())),
            _ => Err(self.unexpected(index, "text")),
        }
    }

    pub(crate) fn int(&self, index: usize) -> Result<i64> {
        self.opt_int(index)?
            .ok_or_else(|| self.unexpected(index, "an integer"))
    }

    pub(crate) fn opt_int(&self, index: usize) -> Result<Option<i64>> {
        match self.row.get(index) {
            Some(Value::Null) => Ok(None),
            Some(Value::Int(i)) => Ok(Some(*i)),
            Some(Value::Decimal(d)) => d
                .parse()
                .map(Some)
                .map_err(|_| self.unexpected(index, "an integer")),
            _ => Err(self.unexpected(index, "an integer")),
        }
    }

    pub(crate) fn flag(&self, index: usize) -> Result<bool> {
        match self.row.get(index) {
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Int(i)) => Ok(*i != 0),
            Some(Value::Text(s)) => Ok(s.eq_ignore_ascii_case("yes") || s == "1"),
            _ => Err(self.unexpected(index, "a flag")),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn column(table: &str, name: &str, type_spec: &str, nullable: bool) -> CatalogRow {
        CatalogRow::Column {
            table: ObjectName::new(table),
            name: name.to_string(),
            type_spec: type_spec.to_string(),
            nullable,
            identity: false,
            default: None,
            computed: None,
        }
    }

    #[test]
    fn test_fold_groups_multi_column_keys() {
        let fk = |column: &str, target_column: &str| CatalogRow::ForeignKey {
            table: ObjectName::new("loans"),
            name: String::from("fk_loans_copies"),
            named: true,
            column: column.to_string(),
            target: ObjectName::new("copies"),
            target_column: target_column.to_string(),
            cascade_delete: true,
        };
        let rows = vec![
            column("loans", "book_id", "int8", false),
            column("loans", "copy_no", "int4", false),
            column("loans", "note", "character varying(200)", true),
            fk("book_id", "book_id"),
            fk("copy_no", "copy_no"),
            CatalogRow::Index {
                table: ObjectName::new("loans"),
                name: String::from("ix_loans_book_id_copy_no"),
                column: String::from("book_id"),
                unique: false,
                filter: None,
            },
            CatalogRow::Index {
                table: ObjectName::new("loans"),
                name: String::from("ix_loans_book_id_copy_no"),
                column: String::from("copy_no"),
                unique: false,
                filter: None,
            },
        ];
        let model = fold(&TypeRegistry::postgres(), rows);
        let loans = model.table("loans").unwrap();

        let types: Vec<String> = loans.columns.iter().map(|c| c.type_info.to_string()).collect();
        assert_eq!(types, ["bigint", "integer", "character varying(200)"]);
        assert_eq!(loans.foreign_keys.len(), 1);
        assert_eq!(loans.foreign_keys[0].columns, ["book_id", "copy_no"]);
        assert_eq!(
            loans.foreign_keys[0].target().map(|(_, c)| c.to_vec()),
            Some(vec![String::from("book_id"), String::from("copy_no")])
        );
        assert!(loans.foreign_keys[0].cascade_delete);
        assert_eq!(loans.indexes[0].columns, ["book_id", "copy_no"]);
    }

    #[test]
    fn test_fold_skips_version_table() {
        let rows = vec![
            CatalogRow::Table {
                table: ObjectName::new(VERSION_TABLE),
            },
            column(VERSION_TABLE, "app_name", "TEXT", false),
            CatalogRow::Table {
                table: ObjectName::new("books"),
            },
        ];
        let model = fold(&TypeRegistry::sqlite(), rows);
        assert_eq!(model.tables.len(), 1);
        assert!(model.table("books").is_some());
    }

    #[test]
    fn test_object_name_strips_default_schema() {
        assert_eq!(
            object_name("public", String::from("books"), Some("public")),
            ObjectName::new("books")
        );
        assert_eq!(
            object_name("audit", String::from("log"), Some("public")),
            ObjectName::qualified("audit", "log")
        );
    }

    #[test]
    fn test_catalog_values() {
        let row = [
            Value::Text(String::from("id")),
            Value::Int(1),
            Value::Null,
            Value::Text(String::from("YES")),
        ];
        let values = CatalogValues::new("q", &row);
        assert_eq!(values.text(0).unwrap(), "id");
        assert_eq!(values.int(1).unwrap(), 1);
        assert_eq!(values.opt_text(2).unwrap(), None);
        assert!(values.flag(3).unwrap());
        assert!(values.int(0).is_err());
        assert!(values.text(9).is_err());
    }
}
