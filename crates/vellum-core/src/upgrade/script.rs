//! DDL scripts and their ordering keys.

use serde::Serialize;

/// Execution phase of a script. Scripts run in the declared order of these
/// variants; within a phase they keep the order the updater emitted them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptType {
    /// Vendor session statements issued first.
    SessionSetup,
    /// Views go before anything they select from changes.
    ViewDrop,
    /// Foreign keys go before the tables and columns they reference.
    RefConstraintDrop,
    /// Index drops.
    IndexDrop,
    /// Primary key drops.
    PrimaryKeyDrop,
    /// Table renames.
    TableRename,
    /// Column renames, against the renamed tables.
    ColumnRename,
    /// Schema creation.
    SchemaAdd,
    /// Sequence creation.
    SequenceAdd,
    /// Table creation, parents before children.
    TableAdd,
    /// Column additions.
    ColumnAdd,
    /// Back-fills of columns about to become NOT NULL.
    ColumnInit,
    /// In-place column changes and column rebuilds.
    ColumnModify,
    /// Column drops.
    ColumnDrop,
    /// Table drops, children before parents.
    TableDrop,
    /// Primary key creation.
    PrimaryKeyAdd,
    /// Index creation.
    IndexAdd,
    /// Foreign key creation, once every table exists.
    RefConstraintAdd,
    /// View creation.
    ViewAdd,
    /// Sequence drops.
    SequenceDrop,
    /// Vendor session statements issued last.
    SessionTeardown,
}

/// One DDL statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DbScript {
    /// Ordering key.
    pub script_type: ScriptType,
    /// Statement text, without a terminator.
    pub sql: String,
}

impl DbScript {
    /// Creates a script.
    #[must_use]
    pub fn new(script_type: ScriptType, sql: impl Into<String>) -> Self {
        Self {
            script_type,
            sql: sql.into(),
        }
    }
}
