//! Vendor-neutral table declarations.
//!
//! A [`TableSpec`] names host types rather than storage types; resolving it
//! against a [`TypeRegistry`] yields a [`Table`].

use crate::types::{HostType, TypeRegistry};

use super::{Column, Index, Key, KeyKind, ObjectName, Table};

/// A column declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    name: String,
    host: HostType,
    size: Option<u32>,
    precision: Option<u8>,
    scale: Option<u8>,
    nullable: bool,
    primary_key: bool,
    unique: bool,
    identity: bool,
    default: Option<String>,
    computed: Option<String>,
    references: Option<(String, String)>,
    cascade_delete: bool,
    renamed_from: Vec<String>,
}

impl ColumnSpec {
    /// Creates a nullable column of the given host type.
    #[must_use]
    pub fn new(name: impl Into<String>, host: HostType) -> Self {
        Self {
            name: name.into(),
            host,
            size: None,
            precision: None,
            scale: None,
            nullable: true,
            primary_key: false,
            unique: false,
            identity: false,
            default: None,
            computed: None,
            references: None,
            cascade_delete: false,
            renamed_from: Vec::new(),
        }
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the size (string and binary types).
    #[must_use]
    pub const fn size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    /// Sets precision and scale (decimal types).
    #[must_use]
    pub const fn precision(mut self, precision: u8, scale: u8) -> Self {
        self.precision = Some(precision);
        self.scale = Some(scale);
        self
    }

    /// Marks the column as NOT NULL.
    #[must_use]
    pub const fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Marks the column as nullable (default).
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Makes the column part of the primary key.
    #[must_use]
    pub const fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Adds a unique index on this column alone.
    #[must_use]
    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Database-generated values.
    #[must_use]
    pub const fn identity(mut self) -> Self {
        self.identity = true;
        self.nullable = false;
        self
    }

    /// Sets the default expression.
    #[must_use]
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(expr.into());
        self
    }

    /// Makes this a computed column.
    #[must_use]
    pub fn computed(mut self, expr: impl Into<String>) -> Self {
        self.computed = Some(expr.into());
        self
    }

    /// Adds a foreign key to `table(column)`.
    #[must_use]
    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some((table.into(), column.into()));
        self
    }

    /// Deletes referencing rows with the parent.
    #[must_use]
    pub const fn on_delete_cascade(mut self) -> Self {
        self.cascade_delete = true;
        self
    }

    /// Records a former name of this column.
    #[must_use]
    pub fn renamed_from(mut self, old_name: impl Into<String>) -> Self {
        self.renamed_from.push(old_name.into());
        self
    }

    fn resolve(&self, registry: &TypeRegistry) -> Column {
        Column {
            name: self.name.clone(),
            type_info: registry.type_info(self.host, self.size, self.precision, self.scale),
            nullable: self.nullable,
            identity: self.identity,
            computed: self.computed.clone(),
            default: self.default.clone(),
            renamed_from: self.renamed_from.clone(),
            host: Some(self.host),
        }
    }
}

/// An index declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Explicit name; generated from table and columns when absent.
    pub name: Option<String>,
    /// Indexed columns.
    pub columns: Vec<String>,
    /// UNIQUE index.
    pub unique: bool,
    /// Partial index predicate.
    pub filter: Option<String>,
}

/// A foreign key declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeySpec {
    /// Columns in this table.
    pub columns: Vec<String>,
    /// Referenced table.
    pub target: String,
    /// Referenced columns.
    pub target_columns: Vec<String>,
    /// `ON DELETE CASCADE`.
    pub cascade_delete: bool,
}

/// A table declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    name: ObjectName,
    columns: Vec<ColumnSpec>,
    primary_key: Vec<String>,
    indexes: Vec<IndexSpec>,
    foreign_keys: Vec<ForeignKeySpec>,
    renamed_from: Vec<String>,
}

impl TableSpec {
    /// Starts a table declaration. `name` may be schema-qualified.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: ObjectName::from(name),
            columns: Vec::new(),
            primary_key: Vec::new(),
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            renamed_from: Vec::new(),
        }
    }

    /// Table name.
    #[must_use]
    pub const fn name(&self) -> &ObjectName {
        &self.name
    }

    /// Adds a column.
    #[must_use]
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Sets the primary key columns.
    #[must_use]
    pub fn primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns.iter().map(ToString::to_string).collect();
        self
    }

    /// Adds a non-unique index.
    #[must_use]
    pub fn index(mut self, columns: &[&str]) -> Self {
        self.indexes.push(IndexSpec {
            name: None,
            columns: columns.iter().map(ToString::to_string).collect(),
            unique: false,
            filter: None,
        });
        self
    }

    /// Adds a unique index.
    #[must_use]
    pub fn unique_index(mut self, columns: &[&str]) -> Self {
        self.indexes.push(IndexSpec {
            name: None,
            columns: columns.iter().map(ToString::to_string).collect(),
            unique: true,
            filter: None,
        });
        self
    }

    /// Adds a fully specified index.
    #[must_use]
    pub fn index_spec(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Adds a foreign key.
    #[must_use]
    pub fn foreign_key(mut self, columns: &[&str], target: &str, target_columns: &[&str]) -> Self {
        self.foreign_keys.push(ForeignKeySpec {
            columns: columns.iter().map(ToString::to_string).collect(),
            target: target.to_string(),
            target_columns: target_columns.iter().map(ToString::to_string).collect(),
            cascade_delete: false,
        });
        self
    }

    /// Adds a fully specified foreign key.
    #[must_use]
    pub fn foreign_key_spec(mut self, fk: ForeignKeySpec) -> Self {
        self.foreign_keys.push(fk);
        self
    }

    /// Records a former name of this table.
    #[must_use]
    pub fn renamed_from(mut self, old_name: impl Into<String>) -> Self {
        self.renamed_from.push(old_name.into());
        self
    }

    /// Resolves host types into vendor storage types.
    #[must_use]
    pub fn resolve(&self, registry: &TypeRegistry) -> Table {
        let table_name = &self.name.name;
        let mut table = Table::new(self.name.clone());
        table.renamed_from.clone_from(&self.renamed_from);
        table.columns = self.columns.iter().map(|c| c.resolve(registry)).collect();

        let mut pk: Vec<String> = self.primary_key.clone();
        if pk.is_empty() {
            pk = self
                .columns
                .iter()
                .filter(|c| c.primary_key)
                .map(|c| c.name.clone())
                .collect();
        }
        if !pk.is_empty() {
            for col in &mut table.columns {
                if pk.contains(&col.name) {
                    col.nullable = false;
                }
            }
            table.primary_key = Some(Key {
                name: Some(format!("pk_{table_name}")),
                kind: KeyKind::Primary,
                columns: pk,
                cascade_delete: false,
            });
        }

        for col in self.columns.iter().filter(|c| c.unique) {
            table.indexes.push(Index {
                name: format!("ux_{table_name}_{}", col.name),
                columns: vec![col.name.clone()],
                unique: true,
                filter: None,
            });
        }
        for index in &self.indexes {
            let prefix = if index.unique { "ux" } else { "ix" };
            table.indexes.push(Index {
                name: index
                    .name
                    .clone()
                    .unwrap_or_else(|| format!("{prefix}_{table_name}_{}", index.columns.join("_"))),
                columns: index.columns.clone(),
                unique: index.unique,
                filter: index.filter.clone(),
            });
        }

        let column_fks = self.columns.iter().filter_map(|c| {
            c.references.as_ref().map(|(target, target_col)| ForeignKeySpec {
                columns: vec![c.name.clone()],
                target: target.clone(),
                target_columns: vec![target_col.clone()],
                cascade_delete: c.cascade_delete,
            })
        });
        for fk in column_fks.chain(self.foreign_keys.iter().cloned()) {
            let target = ObjectName::from(fk.target.as_str());
            table.foreign_keys.push(Key {
                name: Some(format!("fk_{table_name}_{}_{}", target.name, fk.columns.join("_"))),
                kind: KeyKind::Foreign {
                    target,
                    target_columns: fk.target_columns,
                },
                columns: fk.columns,
                cascade_delete: fk.cascade_delete,
            });
        }
        table
    }
}

// =============================================================================
// Shorthand Functions for Common Types
// =============================================================================

/// Creates a 16-bit integer column.
#[must_use]
pub fn smallint(name: impl Into<String>) -> ColumnSpec {
    ColumnSpec::new(name, HostType::I16)
}

/// Creates a 32-bit integer column.
#[must_use]
pub fn integer(name: impl Into<String>) -> ColumnSpec {
    ColumnSpec::new(name, HostType::I32)
}

/// Creates a 64-bit integer column.
#[must_use]
pub fn bigint(name: impl Into<String>) -> ColumnSpec {
    ColumnSpec::new(name, HostType::I64)
}

/// Creates a single-precision float column.
#[must_use]
pub fn real(name: impl Into<String>) -> ColumnSpec {
    ColumnSpec::new(name, HostType::F32)
}

/// Creates a double-precision float column.
#[must_use]
pub fn double(name: impl Into<String>) -> ColumnSpec {
    ColumnSpec::new(name, HostType::F64)
}

/// Creates an exact decimal column.
#[must_use]
pub fn decimal(name: impl Into<String>, precision: u8, scale: u8) -> ColumnSpec {
    ColumnSpec::new(name, HostType::Decimal).precision(precision, scale)
}

/// Creates a bounded string column.
#[must_use]
pub fn varchar(name: impl Into<String>, len: u32) -> ColumnSpec {
    ColumnSpec::new(name, HostType::String).size(len)
}

/// Creates an unbounded string column.
#[must_use]
pub fn text(name: impl Into<String>) -> ColumnSpec {
    ColumnSpec::new(name, HostType::String)
}

/// Creates a binary column.
#[must_use]
pub fn blob(name: impl Into<String>) -> ColumnSpec {
    ColumnSpec::new(name, HostType::Bytes)
}

/// Creates a GUID column.
#[must_use]
pub fn guid(name: impl Into<String>) -> ColumnSpec {
    ColumnSpec::new(name, HostType::Uuid)
}

/// Creates a timestamp column.
#[must_use]
pub fn timestamp(name: impl Into<String>) -> ColumnSpec {
    ColumnSpec::new(name, HostType::DateTime)
}

/// Creates a date column.
#[must_use]
pub fn date(name: impl Into<String>) -> ColumnSpec {
    ColumnSpec::new(name, HostType::Date)
}

/// Creates a time-of-day column.
#[must_use]
pub fn time(name: impl Into<String>) -> ColumnSpec {
    ColumnSpec::new(name, HostType::Time)
}

/// Creates a boolean column.
#[must_use]
pub fn boolean(name: impl Into<String>) -> ColumnSpec {
    ColumnSpec::new(name, HostType::Bool)
}
