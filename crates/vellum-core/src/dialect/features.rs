//! Vendor capability flags.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// What a back-end can do. Consumed by the translator (paging, array
    /// parameters) and the schema updater (DDL strategy).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Features: u32 {
        /// Named schemas (`CREATE SCHEMA`).
        const SCHEMAS = 1;
        /// Sequences.
        const SEQUENCES = 1 << 1;
        /// Materialized views.
        const MATERIALIZED_VIEWS = 1 << 2;
        /// Changing a column's type or nullability in place.
        const ALTER_COLUMN = 1 << 3;
        /// `ALTER TABLE ... ADD ... NOT NULL DEFAULT x` in one step.
        const ADD_NOT_NULL_WITH_DEFAULT = 1 << 4;
        /// Adding and dropping constraints on existing tables.
        const ADD_CONSTRAINT = 1 << 5;
        /// `ALTER TABLE ... DROP COLUMN`.
        const DROP_COLUMN = 1 << 6;
        /// `ALTER TABLE ... RENAME COLUMN`.
        const RENAME_COLUMN = 1 << 7;
        /// DDL participates in transactions.
        const TRANSACTIONAL_DDL = 1 << 8;
        /// Lists can be sent as one array parameter.
        const ARRAY_PARAMETERS = 1 << 9;
        /// `ORDER BY (SELECT 1)` is accepted when paging needs an ordering.
        const FAKE_ORDER_BY = 1 << 10;
        /// Partial (filtered) indexes.
        const FILTERED_INDEXES = 1 << 11;
        /// Unquoted identifiers compare case-insensitively in the catalog.
        const CASE_INSENSITIVE_IDENTIFIERS = 1 << 12;
    }
}

impl Features {
    /// `SQLite` 3.35+.
    pub const SQLITE: Self = Self::TRANSACTIONAL_DDL
        .union(Self::RENAME_COLUMN)
        .union(Self::DROP_COLUMN)
        .union(Self::FILTERED_INDEXES)
        .union(Self::CASE_INSENSITIVE_IDENTIFIERS);

    /// `PostgreSQL`.
    pub const POSTGRES: Self = Self::SCHEMAS
        .union(Self::SEQUENCES)
        .union(Self::MATERIALIZED_VIEWS)
        .union(Self::ALTER_COLUMN)
        .union(Self::ADD_NOT_NULL_WITH_DEFAULT)
        .union(Self::ADD_CONSTRAINT)
        .union(Self::DROP_COLUMN)
        .union(Self::RENAME_COLUMN)
        .union(Self::TRANSACTIONAL_DDL)
        .union(Self::ARRAY_PARAMETERS)
        .union(Self::FILTERED_INDEXES);

    /// SQL Server.
    pub const MSSQL: Self = Self::SCHEMAS
        .union(Self::SEQUENCES)
        .union(Self::ALTER_COLUMN)
        .union(Self::ADD_NOT_NULL_WITH_DEFAULT)
        .union(Self::ADD_CONSTRAINT)
        .union(Self::DROP_COLUMN)
        .union(Self::RENAME_COLUMN)
        .union(Self::TRANSACTIONAL_DDL)
        .union(Self::FAKE_ORDER_BY)
        .union(Self::FILTERED_INDEXES)
        .union(Self::CASE_INSENSITIVE_IDENTIFIERS);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vendor_sets() {
        assert!(!Features::SQLITE.contains(Features::ALTER_COLUMN));
        assert!(Features::POSTGRES.contains(Features::ADD_NOT_NULL_WITH_DEFAULT));
        assert!(Features::MSSQL.contains(Features::FAKE_ORDER_BY));
        assert!(!Features::POSTGRES.contains(Features::FAKE_ORDER_BY));
    }
}
