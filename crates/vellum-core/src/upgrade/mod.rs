//! Schema diff and DDL planning.
//!
//! [`SchemaUpdater`] compares a declared [`DbModel`](crate::model::DbModel)
//! with one loaded from a live database and produces a [`SchemaDiff`]: a list
//! of [`DbObjectChange`]s whose scripts, sorted by [`ScriptType`], converge
//! the database onto the declared model.
//!
//! Ordering is decided here and nowhere else. Dialects only render the
//! individual statements.

mod diff;
mod script;

pub use diff::SchemaUpdater;
pub use script::{DbScript, ScriptType};

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::model::{Column, Index, Key, ObjectName, Sequence, Table, View};

/// Kind of database object a change applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DbObjectType {
    /// A named schema.
    Schema,
    /// A table.
    Table,
    /// A column.
    Column,
    /// A primary key.
    PrimaryKey,
    /// An index, unique or not.
    Index,
    /// A foreign key.
    ForeignKey,
    /// A view.
    View,
    /// A sequence.
    Sequence,
}

impl fmt::Display for DbObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Schema => "schema",
            Self::Table => "table",
            Self::Column => "column",
            Self::PrimaryKey => "primary key",
            Self::Index => "index",
            Self::ForeignKey => "foreign key",
            Self::View => "view",
            Self::Sequence => "sequence",
        })
    }
}

/// One side of a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DbObject {
    /// A schema name.
    Schema {
        /// Schema name.
        name: String,
    },
    /// A table.
    Table(Table),
    /// A column of a table.
    Column {
        /// Owning table.
        table: ObjectName,
        /// The column.
        column: Column,
    },
    /// A primary or foreign key of a table.
    Key {
        /// Owning table.
        table: ObjectName,
        /// The key.
        key: Key,
    },
    /// An index of a table.
    Index {
        /// Owning table.
        table: ObjectName,
        /// The index.
        index: Index,
    },
    /// A view.
    View(View),
    /// A sequence.
    Sequence(Sequence),
}

impl DbObject {
    /// Display name, qualified by the owning table where there is one.
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Schema { name } => name.clone(),
            Self::Table(t) => t.name.to_string(),
            Self::Column { table, column } => format!("{table}.{}", column.name),
            Self::Key { table, key } => match &key.name {
                Some(name) => format!("{table}.{name}"),
                None => format!("{table}({})", key.columns.join(", ")),
            },
            Self::Index { table, index } => format!("{table}.{}", index.name),
            Self::View(v) => v.name.to_string(),
            Self::Sequence(s) => s.name.to_string(),
        }
    }
}

/// Whether a change adds, drops or modifies its object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Only the new side exists.
    Add,
    /// Only the old side exists.
    Drop,
    /// Both sides exist.
    Modify,
}

/// A diff unit: one object, its old and new shape, and the scripts that
/// take the database from one to the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbObjectChange {
    /// What kind of object changes.
    pub object_type: DbObjectType,
    /// The object as loaded from the database.
    pub old: Option<DbObject>,
    /// The object as declared.
    pub new: Option<DbObject>,
    /// Rendered DDL, each tagged with its ordering key.
    pub scripts: Vec<DbScript>,
}

impl DbObjectChange {
    pub(crate) const fn new(
        object_type: DbObjectType,
        old: Option<DbObject>,
        new: Option<DbObject>,
    ) -> Self {
        Self {
            object_type,
            old,
            new,
            scripts: Vec::new(),
        }
    }

    pub(crate) fn script(mut self, script_type: ScriptType, sql: impl Into<String>) -> Self {
        self.scripts.push(DbScript::new(script_type, sql));
        self
    }

    pub(crate) fn scripts(mut self, script_type: ScriptType, sql: Vec<String>) -> Self {
        self.scripts
            .extend(sql.into_iter().map(|s| DbScript::new(script_type, s)));
        self
    }

    /// Whether this adds, drops or modifies its object.
    #[must_use]
    pub const fn kind(&self) -> ChangeKind {
        match (&self.old, &self.new) {
            (None, _) => ChangeKind::Add,
            (Some(_), None) => ChangeKind::Drop,
            (Some(_), Some(_)) => ChangeKind::Modify,
        }
    }

    /// Number of ordering phases this change spans. A safe column add is
    /// three steps (add, back-fill, tighten) where the vendor cannot add a
    /// NOT NULL column with a default in one statement.
    #[must_use]
    pub fn steps(&self) -> usize {
        self.scripts
            .iter()
            .map(|s| s.script_type)
            .collect::<BTreeSet<_>>()
            .len()
    }
}

impl fmt::Display for DbObjectChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.kind() {
            ChangeKind::Add => "add",
            ChangeKind::Drop => "drop",
            ChangeKind::Modify => "modify",
        };
        let name = self
            .new
            .as_ref()
            .or(self.old.as_ref())
            .map(DbObject::name)
            .unwrap_or_default();
        write!(f, "{verb} {} {name}", self.object_type)
    }
}

/// A change the updater detected but will not apply on a guess.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmbiguousChange {
    /// A dropped and an added column of the same type with similar names.
    /// Declare `renamed_from` on the new column to confirm the rename.
    ColumnRename {
        /// Table holding both columns.
        table: ObjectName,
        /// Column present in the database only.
        from: String,
        /// Column declared only.
        to: String,
        /// Name similarity in `[0, 1]`.
        similarity: f64,
    },
    /// A dropped and an added table with the same columns and similar names.
    TableRename {
        /// Table present in the database only.
        from: ObjectName,
        /// Table declared only.
        to: ObjectName,
        /// Name similarity in `[0, 1]`.
        similarity: f64,
    },
}

impl fmt::Display for AmbiguousChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ColumnRename {
                table,
                from,
                to,
                similarity,
            } => write!(
                f,
                "{table}.{from} may have been renamed to {to} (similarity {similarity:.2})"
            ),
            Self::TableRename {
                from,
                to,
                similarity,
            } => write!(
                f,
                "table {from} may have been renamed to {to} (similarity {similarity:.2})"
            ),
        }
    }
}

/// A difference the vendor cannot reconcile in place. No script is
/// generated for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffWarning {
    /// The primary key changed on a vendor that cannot alter constraints.
    PrimaryKeyChange {
        /// Table name.
        table: ObjectName,
    },
    /// A column gained or lost its identity property.
    IdentityChange {
        /// Table name.
        table: ObjectName,
        /// Column name.
        column: String,
    },
    /// A column became computed or stopped being computed.
    ComputedChange {
        /// Table name.
        table: ObjectName,
        /// Column name.
        column: String,
    },
    /// A column needs a rebuild but takes part in a key.
    ColumnRebuildBlocked {
        /// Table name.
        table: ObjectName,
        /// Column name.
        column: String,
    },
    /// A foreign key cannot be added to or dropped from an existing table.
    ConstraintUnsupported {
        /// Table name.
        table: ObjectName,
        /// Constraint name or column list.
        constraint: String,
    },
    /// A column cannot be dropped.
    ColumnDropUnsupported {
        /// Table name.
        table: ObjectName,
        /// Column name.
        column: String,
    },
    /// Materialized views are not available.
    MaterializedViewUnsupported {
        /// View name.
        view: ObjectName,
    },
}

impl fmt::Display for DiffWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrimaryKeyChange { table } => {
                write!(f, "primary key of {table} changed; recreate the table")
            }
            Self::IdentityChange { table, column } => {
                write!(f, "identity of {table}.{column} changed; recreate the column")
            }
            Self::ComputedChange { table, column } => {
                write!(f, "{table}.{column} changed between stored and computed")
            }
            Self::ColumnRebuildBlocked { table, column } => {
                write!(f, "{table}.{column} is part of a key and cannot be rebuilt")
            }
            Self::ConstraintUnsupported { table, constraint } => {
                write!(f, "constraint {constraint} on {table} cannot be changed in place")
            }
            Self::ColumnDropUnsupported { table, column } => {
                write!(f, "{table}.{column} cannot be dropped")
            }
            Self::MaterializedViewUnsupported { view } => {
                write!(f, "materialized view {view} is not supported")
            }
        }
    }
}

/// Everything needed to converge a database onto a declared model.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaDiff {
    /// Changes with their scripts.
    pub changes: Vec<DbObjectChange>,
    /// Suspected renames, not applied.
    pub ambiguous: Vec<AmbiguousChange>,
    /// Differences without a script.
    pub warnings: Vec<DiffWarning>,
    #[serde(skip)]
    setup: Vec<String>,
    #[serde(skip)]
    teardown: Vec<String>,
}

impl SchemaDiff {
    /// Whether the database already matches: no changes and no suspected
    /// renames. Warnings do not count.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty() && self.ambiguous.is_empty()
    }

    /// All scripts in execution order, wrapped in the vendor's session
    /// statements. Empty when there are no changes.
    #[must_use]
    pub fn scripts(&self) -> Vec<DbScript> {
        if self.changes.is_empty() {
            return Vec::new();
        }
        let mut body: Vec<DbScript> = self
            .changes
            .iter()
            .flat_map(|c| c.scripts.iter().cloned())
            .collect();
        // Stable: insertion order is the dependency order within a phase.
        body.sort_by_key(|s| s.script_type);

        let mut scripts: Vec<DbScript> = self
            .setup
            .iter()
            .map(|s| DbScript::new(ScriptType::SessionSetup, s.clone()))
            .collect();
        scripts.extend(body);
        scripts.extend(
            self.teardown
                .iter()
                .map(|s| DbScript::new(ScriptType::SessionTeardown, s.clone())),
        );
        scripts
    }

    /// Renders every script as one text file, each statement followed by
    /// `separator` and a newline.
    #[must_use]
    pub fn export(&self, separator: &str) -> String {
        self.scripts()
            .iter()
            .map(|s| format!("{}{separator}\n", s.sql))
            .collect()
    }
}
