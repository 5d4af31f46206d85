//! Schema model.
//!
//! Dialect-resolved description of tables, columns, keys, indexes, sequences
//! and views. Declared models come from [`TableSpec`]s resolved against a
//! [`TypeRegistry`](crate::types::TypeRegistry); loaded models come from a
//! live database's catalog. The diff engine compares the two.

mod graph;
mod spec;

pub use graph::DependencyOrder;
pub use spec::{
    bigint, blob, boolean, date, decimal, double, guid, integer, real, smallint, text, time,
    timestamp, varchar, ColumnSpec, ForeignKeySpec, IndexSpec, TableSpec,
};

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{DbTypeInfo, HostType, TypeRegistry};

/// A possibly schema-qualified object name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectName {
    /// Schema, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    /// Object name.
    pub name: String,
}

impl ObjectName {
    /// An unqualified name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    /// A schema-qualified name.
    #[must_use]
    pub fn qualified(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// Lookup key; lowercased when the vendor ignores identifier case.
    #[must_use]
    pub fn key(&self, case_insensitive: bool) -> String {
        let raw = match &self.schema {
            Some(s) => format!("{s}.{}", self.name),
            None => self.name.clone(),
        };
        if case_insensitive {
            raw.to_lowercase()
        } else {
            raw
        }
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.schema {
            Some(s) => write!(f, "{s}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl From<&str> for ObjectName {
    fn from(name: &str) -> Self {
        match name.split_once('.') {
            Some((schema, name)) => Self::qualified(schema, name),
            None => Self::new(name),
        }
    }
}

/// A column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Storage type.
    pub type_info: DbTypeInfo,
    /// Whether NULL is allowed.
    pub nullable: bool,
    /// Whether the database generates values.
    #[serde(default)]
    pub identity: bool,
    /// Expression of a computed column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computed: Option<String>,
    /// Default expression.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    /// Former names, most recent first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub renamed_from: Vec<String>,
    /// Host type, known for declared columns only. Used to shape values read
    /// back from drivers; never compared by the diff engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<HostType>,
}

impl Column {
    /// A nullable column of the given type.
    #[must_use]
    pub fn new(name: impl Into<String>, type_info: DbTypeInfo) -> Self {
        Self {
            name: name.into(),
            type_info,
            nullable: true,
            identity: false,
            computed: None,
            default: None,
            renamed_from: Vec::new(),
            host: None,
        }
    }
}

/// Kind of a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Primary key.
    Primary,
    /// Unique key.
    Unique,
    /// Foreign key referencing another table.
    Foreign {
        /// Referenced table.
        target: ObjectName,
        /// Referenced columns, parallel to the key's columns.
        target_columns: Vec<String>,
    },
}

/// A primary, unique or foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Constraint name, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// What kind of key this is.
    pub kind: KeyKind,
    /// Ordered key columns.
    pub columns: Vec<String>,
    /// `ON DELETE CASCADE`, for foreign keys.
    #[serde(default)]
    pub cascade_delete: bool,
}

impl Key {
    /// A primary key.
    #[must_use]
    pub fn primary(columns: &[&str]) -> Self {
        Self {
            name: None,
            kind: KeyKind::Primary,
            columns: columns.iter().map(ToString::to_string).collect(),
            cascade_delete: false,
        }
    }

    /// A foreign key.
    #[must_use]
    pub fn foreign(columns: &[&str], target: ObjectName, target_columns: &[&str]) -> Self {
        Self {
            name: None,
            kind: KeyKind::Foreign {
                target,
                target_columns: target_columns.iter().map(ToString::to_string).collect(),
            },
            columns: columns.iter().map(ToString::to_string).collect(),
            cascade_delete: false,
        }
    }

    /// Target table and columns, for foreign keys.
    #[must_use]
    pub fn target(&self) -> Option<(&ObjectName, &[String])> {
        match &self.kind {
            KeyKind::Foreign {
                target,
                target_columns,
            } => Some((target, target_columns)),
            _ => None,
        }
    }

    /// Whether two keys describe the same constraint, ignoring names.
    #[must_use]
    pub fn equivalent(&self, other: &Self, case_insensitive: bool) -> bool {
        let kinds_match = match (&self.kind, &other.kind) {
            (
                KeyKind::Foreign {
                    target: t1,
                    target_columns: c1,
                },
                KeyKind::Foreign {
                    target: t2,
                    target_columns: c2,
                },
            ) => t1.key(case_insensitive) == t2.key(case_insensitive) && names_eq(c1, c2, case_insensitive),
            (a, b) => a == b,
        };
        kinds_match
            && names_eq(&self.columns, &other.columns, case_insensitive)
            && self.cascade_delete == other.cascade_delete
    }
}

/// An index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,
    /// Indexed columns in order.
    pub columns: Vec<String>,
    /// UNIQUE index.
    #[serde(default)]
    pub unique: bool,
    /// Partial index predicate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl Index {
    /// Whether two indexes are structurally equal, ignoring names.
    #[must_use]
    pub fn equivalent(&self, other: &Self, case_insensitive: bool) -> bool {
        self.unique == other.unique
            && names_eq(&self.columns, &other.columns, case_insensitive)
            && self.filter.as_deref().map(normalize_sql) == other.filter.as_deref().map(normalize_sql)
    }
}

/// A table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: ObjectName,
    /// Columns in declaration order.
    pub columns: Vec<Column>,
    /// Primary key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Key>,
    /// Indexes, unique keys included.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<Index>,
    /// Foreign keys.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub foreign_keys: Vec<Key>,
    /// Former names, most recent first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub renamed_from: Vec<String>,
}

impl Table {
    /// An empty table.
    #[must_use]
    pub fn new(name: ObjectName) -> Self {
        Self {
            name,
            columns: Vec::new(),
            primary_key: None,
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
            renamed_from: Vec::new(),
        }
    }

    /// Looks up a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Looks up a column ignoring case.
    #[must_use]
    pub fn column_ci(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Primary key column names, empty without a primary key.
    #[must_use]
    pub fn primary_key_columns(&self) -> &[String] {
        self.primary_key.as_ref().map_or(&[], |k| k.columns.as_slice())
    }

    /// Finds the unique index covering exactly `columns`.
    #[must_use]
    pub fn unique_index_on(&self, columns: &[String]) -> Option<&Index> {
        self.indexes
            .iter()
            .filter(|i| i.unique)
            .find(|i| names_eq(&i.columns, columns, true))
    }
}

/// A sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sequence {
    /// Sequence name.
    pub name: ObjectName,
    /// First value.
    #[serde(default = "one")]
    pub start: i64,
    /// Step.
    #[serde(default = "one")]
    pub increment: i64,
}

const fn one() -> i64 {
    1
}

/// A view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct View {
    /// View name.
    pub name: ObjectName,
    /// The `SELECT` text.
    pub definition: String,
    /// Materialized view.
    #[serde(default)]
    pub materialized: bool,
}

impl View {
    /// Whether two views have the same definition modulo whitespace, case and
    /// a trailing semicolon.
    #[must_use]
    pub fn same_definition(&self, other: &Self) -> bool {
        self.materialized == other.materialized
            && normalize_sql(&self.definition) == normalize_sql(&other.definition)
    }
}

/// A whole database schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbModel {
    /// Named schemas.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub schemas: BTreeSet<String>,
    /// Tables, keyed by name for deterministic iteration.
    #[serde(default, with = "tables_as_list")]
    pub tables: BTreeMap<ObjectName, Table>,
    /// Sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sequences: Vec<Sequence>,
    /// Views.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<View>,
}

impl DbModel {
    /// An empty model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves table specs against a vendor's type registry.
    #[must_use]
    pub fn from_specs(registry: &TypeRegistry, specs: &[TableSpec]) -> Self {
        let mut model = Self::new();
        for spec in specs {
            model.add_table(spec.resolve(registry));
        }
        model
    }

    /// Adds a table, registering its schema.
    pub fn add_table(&mut self, table: Table) {
        if let Some(schema) = &table.name.schema {
            self.schemas.insert(schema.clone());
        }
        self.tables.insert(table.name.clone(), table);
    }

    /// Looks up a table by name, optionally schema-qualified
    /// (`"books"`, `"lib.books"`).
    #[must_use]
    pub fn table(&self, name: &str) -> Option<&Table> {
        let wanted = ObjectName::from(name);
        if let Some(t) = self.tables.get(&wanted) {
            return Some(t);
        }
        if wanted.schema.is_none() {
            let mut matches = self.tables.values().filter(|t| t.name.name == wanted.name);
            let first = matches.next();
            if matches.next().is_none() {
                return first;
            }
            return None;
        }
        self.tables
            .values()
            .find(|t| t.name.key(true) == wanted.key(true))
    }

    /// Finds the foreign key from `child` to `parent`.
    #[must_use]
    pub fn foreign_key_between<'a>(&self, child: &'a Table, parent: &Table) -> Option<&'a Key> {
        child.foreign_keys.iter().find(|fk| {
            fk.target()
                .is_some_and(|(target, _)| target.key(true) == parent.name.key(true))
        })
    }
}

mod tables_as_list {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::{ObjectName, Table};

    pub fn serialize<S: Serializer>(
        tables: &BTreeMap<ObjectName, Table>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let list: Vec<&Table> = tables.values().collect();
        list.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<ObjectName, Table>, D::Error> {
        let list = Vec::<Table>::deserialize(deserializer)?;
        Ok(list.into_iter().map(|t| (t.name.clone(), t)).collect())
    }
}

fn names_eq(a: &[String], b: &[String], case_insensitive: bool) -> bool {
    a.len() == b.len()
        && a.iter().zip(b).all(|(x, y)| {
            if case_insensitive {
                x.eq_ignore_ascii_case(y)
            } else {
                x == y
            }
        })
}

/// Collapses whitespace, lowercases and strips a trailing semicolon, so SQL
/// text reported by a catalog compares equal to the declared text.
#[must_use]
pub fn normalize_sql(sql: &str) -> String {
    sql.trim()
        .trim_end_matches(';')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Normalizes a default expression: strips redundant outer parentheses and
/// `::type` casts, which catalogs add to stored defaults.
#[must_use]
pub fn normalize_default(expr: &str) -> String {
    let mut s = expr.trim().to_string();
    loop {
        let stripped = strip_outer_parens(&s);
        if stripped.len() == s.len() {
            break;
        }
        s = stripped.trim().to_string();
    }
    if let Some(pos) = s.rfind("::") {
        if !s[pos..].contains('\'') {
            s.truncate(pos);
        }
    }
    normalize_sql(&s)
}

fn strip_outer_parens(s: &str) -> &str {
    if !(s.starts_with('(') && s.ends_with(')')) {
        return s;
    }
    let mut depth = 0_i32;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != s.len() - 1 {
                    return s;
                }
            }
            _ => {}
        }
    }
    &s[1..s.len() - 1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_default() {
        assert_eq!(normalize_default("((0))"), "0");
        assert_eq!(normalize_default("'abc'::character varying"), "'abc'");
        assert_eq!(normalize_default("(a) + (b)"), "(a) + (b)");
        assert_eq!(normalize_default("CURRENT_TIMESTAMP"), "current_timestamp");
    }

    #[test]
    fn test_table_lookup() {
        let mut model = DbModel::new();
        model.add_table(Table::new(ObjectName::qualified("lib", "books")));
        assert!(model.table("books").is_some());
        assert!(model.table("lib.books").is_some());
        assert!(model.table("LIB.BOOKS").is_some());
        assert!(model.table("authors").is_none());
        assert!(model.schemas.contains("lib"));
    }

    #[test]
    fn test_key_equivalence_ignores_names() {
        let mut a = Key::foreign(&["author_id"], ObjectName::new("authors"), &["id"]);
        let mut b = a.clone();
        a.name = Some(String::from("fk_1"));
        b.name = Some(String::from("FK_books_authors"));
        assert!(a.equivalent(&b, false));
        b.cascade_delete = true;
        assert!(!a.equivalent(&b, false));
    }

    #[test]
    fn test_view_definition_comparison() {
        let a = View {
            name: ObjectName::new("v"),
            definition: String::from("SELECT id\n  FROM books;"),
            materialized: false,
        };
        let b = View {
            definition: String::from("select id from books"),
            ..a.clone()
        };
        assert!(a.same_definition(&b));
    }
}
