//! Declared-versus-loaded schema comparison.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::dialect::{DdlDialect, Features};
use crate::model::{normalize_default, Column, DbModel, Index, Key, KeyKind, ObjectName, Table};

use super::{
    AmbiguousChange, DbObject, DbObjectChange, DbObjectType, DiffWarning, SchemaDiff, ScriptType,
};

/// Name similarity at or above which a dropped/added pair is reported as a
/// possible rename.
const RENAME_SIMILARITY: f64 = 0.4;

/// Suffix of the scratch column a column is rebuilt into.
const REBUILD_SUFFIX: &str = "$new";

/// Plans DDL for one vendor.
///
/// ```rust
/// use vellum_core::dialect::{Dialect, PostgresDialect};
/// use vellum_core::model::{bigint, boolean, DbModel, TableSpec};
/// use vellum_core::upgrade::SchemaUpdater;
///
/// let dialect = PostgresDialect::new();
/// let v1 = TableSpec::new("books").column(bigint("id")).primary_key(&["id"]);
/// let v2 = v1.clone().column(boolean("active").not_null().default_expr("true"));
///
/// let diff = SchemaUpdater::new(&dialect).diff(
///     &DbModel::from_specs(dialect.types(), &[v2]),
///     &DbModel::from_specs(dialect.types(), &[v1]),
/// );
/// let scripts: Vec<_> = diff.scripts().into_iter().map(|s| s.sql).collect();
/// assert_eq!(
///     scripts,
///     ["ALTER TABLE \"books\" ADD COLUMN \"active\" boolean NOT NULL DEFAULT true"]
/// );
/// ```
#[derive(Clone, Copy)]
pub struct SchemaUpdater<'a> {
    dialect: &'a dyn DdlDialect,
}

impl<'a> SchemaUpdater<'a> {
    /// Creates an updater rendering through `dialect`.
    #[must_use]
    pub const fn new(dialect: &'a dyn DdlDialect) -> Self {
        Self { dialect }
    }

    /// Computes the changes that turn `loaded` into `declared`.
    #[must_use]
    pub fn diff(&self, declared: &DbModel, loaded: &DbModel) -> SchemaDiff {
        let mut planner = Planner {
            dialect: self.dialect,
            features: self.dialect.features(),
            diff: SchemaDiff::default(),
            renamed_tables: BTreeMap::new(),
            structural: false,
        };
        planner.schemas(declared, loaded);
        planner.sequences(declared, loaded);
        planner.tables(declared, loaded);
        planner.views(declared, loaded);

        let mut diff = planner.diff;
        if !diff.changes.is_empty() {
            diff.setup = self.dialect.session_setup();
            diff.teardown = self.dialect.session_teardown();
        }
        info!(
            dialect = self.dialect.name(),
            changes = diff.changes.len(),
            ambiguous = diff.ambiguous.len(),
            warnings = diff.warnings.len(),
            "schema diff computed"
        );
        diff
    }
}

struct Planner<'a> {
    dialect: &'a dyn DdlDialect,
    features: Features,
    diff: SchemaDiff,
    /// Loaded table key to declared name.
    renamed_tables: BTreeMap<String, ObjectName>,
    /// Set once a change can invalidate view definitions.
    structural: bool,
}

impl Planner<'_> {
    const fn has(&self, feature: Features) -> bool {
        self.features.contains(feature)
    }

    const fn case_insensitive(&self) -> bool {
        self.has(Features::CASE_INSENSITIVE_IDENTIFIERS)
    }

    /// Lookup key of an object name; the default schema counts as none.
    fn key(&self, name: &ObjectName) -> String {
        let default_schema = self.dialect.default_schema();
        let schema = name
            .schema
            .as_deref()
            .filter(|s| self.has(Features::SCHEMAS) && Some(*s) != default_schema);
        let raw = match schema {
            Some(s) => format!("{s}.{}", name.name),
            None => name.name.clone(),
        };
        if self.case_insensitive() {
            raw.to_lowercase()
        } else {
            raw
        }
    }

    fn push(&mut self, change: DbObjectChange) {
        debug!(change = %change, scripts = change.scripts.len(), "planned");
        self.diff.changes.push(change);
    }

    fn warning(&mut self, warning: DiffWarning) {
        warn!(%warning, "schema difference left unapplied");
        self.diff.warnings.push(warning);
    }

    /// Value a NOT NULL column is back-filled with.
    fn fill_value(&self, col: &Column) -> String {
        col.default.clone().unwrap_or_else(|| {
            self.dialect
                .types()
                .default_initializer(&col.type_info)
                .to_string()
        })
    }

    fn same_type(&self, a: &Column, b: &Column) -> bool {
        let types = self.dialect.types();
        types.normalize(&a.type_info).same_as(&types.normalize(&b.type_info))
    }

    fn schemas(&mut self, declared: &DbModel, loaded: &DbModel) {
        if !self.has(Features::SCHEMAS) {
            return;
        }
        let ci = self.case_insensitive();
        for schema in &declared.schemas {
            if Some(schema.as_str()) == self.dialect.default_schema()
                || loaded.schemas.iter().any(|s| same_name(s, schema, ci))
            {
                continue;
            }
            let change = DbObjectChange::new(
                DbObjectType::Schema,
                None,
                Some(DbObject::Schema {
                    name: schema.clone(),
                }),
            )
            .script(ScriptType::SchemaAdd, self.dialect.create_schema(schema));
            self.push(change);
        }
    }

    fn sequences(&mut self, declared: &DbModel, loaded: &DbModel) {
        if !self.has(Features::SEQUENCES) {
            return;
        }
        for seq in &declared.sequences {
            if !loaded.sequences.iter().any(|s| self.key(&s.name) == self.key(&seq.name)) {
                let change =
                    DbObjectChange::new(DbObjectType::Sequence, None, Some(DbObject::Sequence(seq.clone())))
                        .script(ScriptType::SequenceAdd, self.dialect.create_sequence(seq));
                self.push(change);
            }
        }
        for seq in &loaded.sequences {
            if !declared.sequences.iter().any(|s| self.key(&s.name) == self.key(&seq.name)) {
                let change =
                    DbObjectChange::new(DbObjectType::Sequence, Some(DbObject::Sequence(seq.clone())), None)
                        .script(ScriptType::SequenceDrop, self.dialect.drop_sequence(seq));
                self.push(change);
            }
        }
    }

    fn tables(&mut self, declared: &DbModel, loaded: &DbModel) {
        let loaded_by_key: BTreeMap<String, &Table> = loaded
            .tables
            .values()
            .map(|t| (self.key(&t.name), t))
            .collect();

        // Exact names first, so a former name never claims a live table.
        let mut claimed: BTreeSet<String> = BTreeSet::new();
        let mut pairs: Vec<(&Table, &Table)> = Vec::new();
        let mut unmatched: Vec<&Table> = Vec::new();
        for table in declared.tables.values() {
            let key = self.key(&table.name);
            match loaded_by_key.get(&key) {
                Some(old) => {
                    claimed.insert(key);
                    pairs.push((table, *old));
                }
                None => unmatched.push(table),
            }
        }

        let mut added: Vec<&Table> = Vec::new();
        for table in unmatched {
            let former = table.renamed_from.iter().find_map(|name| {
                let key = self.key(&ObjectName {
                    schema: table.name.schema.clone(),
                    name: name.clone(),
                });
                loaded_by_key
                    .get(&key)
                    .filter(|_| !claimed.contains(&key))
                    .map(|old| (key, *old))
            });
            let Some((key, old)) = former else {
                added.push(table);
                continue;
            };
            claimed.insert(key.clone());
            self.renamed_tables.insert(key, table.name.clone());
            self.structural = true;
            let change = DbObjectChange::new(
                DbObjectType::Table,
                Some(DbObject::Table(old.clone())),
                Some(DbObject::Table(table.clone())),
            )
            .script(
                ScriptType::TableRename,
                self.dialect.rename_table(&old.name, &table.name.name),
            );
            self.push(change);
            pairs.push((table, old));
        }

        let mut dropped: Vec<&Table> = loaded_by_key
            .iter()
            .filter(|(key, _)| !claimed.contains(*key))
            .map(|(_, t)| *t)
            .collect();
        self.ambiguous_tables(&mut added, &mut dropped);

        let inline_foreign_keys = !self.has(Features::ADD_CONSTRAINT);
        for name in &declared.dependency_order().order {
            if let Some(table) = added.iter().find(|t| &t.name == name) {
                self.create_table(table, inline_foreign_keys);
            }
        }

        for (new, old) in pairs {
            self.table(new, old);
        }

        for name in loaded.dependency_order().order.iter().rev() {
            if let Some(table) = dropped.iter().find(|t| &t.name == name) {
                self.drop_table(table);
            }
        }
    }

    fn ambiguous_tables(&mut self, added: &mut Vec<&Table>, dropped: &mut Vec<&Table>) {
        let column_set = |t: &Table| -> BTreeSet<String> {
            t.columns.iter().map(|c| c.name.to_lowercase()).collect()
        };
        let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
        for (d, old) in dropped.iter().enumerate() {
            for (a, new) in added.iter().enumerate() {
                if column_set(old) != column_set(new) {
                    continue;
                }
                let score = similarity(&old.name.name, &new.name.name);
                if score >= RENAME_SIMILARITY {
                    candidates.push((d, a, score));
                }
            }
        }
        let (used_dropped, used_added) = pick_best(candidates, |d, a, similarity| {
            self.diff.ambiguous.push(AmbiguousChange::TableRename {
                from: dropped[d].name.clone(),
                to: added[a].name.clone(),
                similarity,
            });
        });
        retain_unused(dropped, &used_dropped);
        retain_unused(added, &used_added);
    }

    fn create_table(&mut self, table: &Table, inline_foreign_keys: bool) {
        let change = DbObjectChange::new(DbObjectType::Table, None, Some(DbObject::Table(table.clone())))
            .script(
                ScriptType::TableAdd,
                self.dialect.create_table(table, inline_foreign_keys),
            );
        self.push(change);
        for index in &table.indexes {
            self.add_index(table, index);
        }
        if !inline_foreign_keys {
            for fk in &table.foreign_keys {
                self.add_foreign_key(table, fk);
            }
        }
    }

    fn drop_table(&mut self, table: &Table) {
        self.structural = true;
        if self.has(Features::ADD_CONSTRAINT) {
            // Cycles among dropped tables need their constraints gone first.
            for fk in table.foreign_keys.iter().filter(|fk| fk.name.is_some()) {
                let change = key_change(DbObjectType::ForeignKey, &table.name, Some(fk), None)
                    .script(
                        ScriptType::RefConstraintDrop,
                        self.dialect.drop_foreign_key(&table.name, fk),
                    );
                self.push(change);
            }
        }
        let change = DbObjectChange::new(DbObjectType::Table, Some(DbObject::Table(table.clone())), None)
            .script(ScriptType::TableDrop, self.dialect.drop_table(&table.name));
        self.push(change);
    }

    /// Diffs a table present on both sides. `new` carries the declared
    /// name; `old` the loaded one, which differs after a rename.
    fn table(&mut self, new: &Table, old: &Table) {
        let ci = self.case_insensitive();
        let find = |name: &str| old.columns.iter().find(|c| same_name(&c.name, name, ci));

        let mut matched: Vec<(&Column, &Column)> = Vec::new();
        let mut unmatched: Vec<&Column> = Vec::new();
        for col in &new.columns {
            match find(&col.name) {
                Some(o) => matched.push((col, o)),
                None => unmatched.push(col),
            }
        }

        let mut renamed: Vec<(String, String)> = Vec::new();
        let mut added: Vec<&Column> = Vec::new();
        for col in unmatched {
            let former = col
                .renamed_from
                .iter()
                .filter_map(|name| find(name))
                .find(|o| !matched.iter().any(|(_, m)| std::ptr::eq(*m, *o)));
            match former {
                Some(o) if self.has(Features::RENAME_COLUMN) => {
                    self.structural = true;
                    let change = DbObjectChange::new(
                        DbObjectType::Column,
                        Some(column_object(&old.name, o)),
                        Some(column_object(&new.name, col)),
                    )
                    .script(
                        ScriptType::ColumnRename,
                        self.dialect.rename_column(&new.name, &o.name, &col.name),
                    );
                    self.push(change);
                    renamed.push((o.name.clone(), col.name.clone()));
                    matched.push((col, o));
                }
                _ => added.push(col),
            }
        }

        let mut dropped: Vec<&Column> = old
            .columns
            .iter()
            .filter(|o| !matched.iter().any(|(_, m)| std::ptr::eq(*m, *o)))
            .collect();
        self.ambiguous_columns(&new.name, &mut added, &mut dropped);

        let mapped_pk = old
            .primary_key
            .as_ref()
            .map(|k| self.remap_key(k, &renamed));
        let old_fks: Vec<(&Key, Key)> = old
            .foreign_keys
            .iter()
            .map(|k| (k, self.remap_key(k, &renamed)))
            .collect();

        let mut rebuilt: Vec<String> = Vec::new();
        for (col, o) in matched {
            if self.modify_column(new, old, col, o) {
                rebuilt.push(col.name.clone());
            }
        }
        for col in added {
            self.add_column(new, col);
        }
        for o in dropped {
            self.drop_column(new, old, o);
        }

        let touches_rebuilt =
            |columns: &[String]| columns.iter().any(|c| rebuilt.iter().any(|r| same_name(c, r, ci)));

        self.primary_key(new, old, mapped_pk);

        let old_indexes: Vec<(&Index, Index)> = old
            .indexes
            .iter()
            .map(|i| {
                let mapped = Index {
                    columns: i.columns.iter().map(|c| rename(c, &renamed, ci)).collect(),
                    ..i.clone()
                };
                (i, mapped)
            })
            .collect();
        for (index, mapped) in &old_indexes {
            let kept = !touches_rebuilt(&mapped.columns)
                && new.indexes.iter().any(|n| n.equivalent(mapped, ci));
            if !kept {
                let change = index_change(&old.name, Some(index), None).script(
                    ScriptType::IndexDrop,
                    self.dialect.drop_index(&old.name, index),
                );
                self.push(change);
            }
        }
        for index in &new.indexes {
            let exists = !touches_rebuilt(&index.columns)
                && old_indexes.iter().any(|(_, m)| m.equivalent(index, ci));
            if !exists {
                self.add_index(new, index);
            }
        }

        for (fk, mapped) in &old_fks {
            if new.foreign_keys.iter().any(|n| self.same_foreign_key(n, mapped)) {
                continue;
            }
            if self.has(Features::ADD_CONSTRAINT) && fk.name.is_some() {
                let change = key_change(DbObjectType::ForeignKey, &old.name, Some(fk), None).script(
                    ScriptType::RefConstraintDrop,
                    self.dialect.drop_foreign_key(&old.name, fk),
                );
                self.push(change);
            } else {
                self.warning(DiffWarning::ConstraintUnsupported {
                    table: new.name.clone(),
                    constraint: constraint_label(fk),
                });
            }
        }
        for fk in &new.foreign_keys {
            if old_fks.iter().any(|(_, m)| self.same_foreign_key(fk, m)) {
                continue;
            }
            if self.has(Features::ADD_CONSTRAINT) {
                self.add_foreign_key(new, fk);
            } else {
                self.warning(DiffWarning::ConstraintUnsupported {
                    table: new.name.clone(),
                    constraint: constraint_label(fk),
                });
            }
        }
    }

    fn ambiguous_columns(
        &mut self,
        table: &ObjectName,
        added: &mut Vec<&Column>,
        dropped: &mut Vec<&Column>,
    ) {
        let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
        for (d, old) in dropped.iter().enumerate() {
            for (a, new) in added.iter().enumerate() {
                if !self.same_type(old, new) {
                    continue;
                }
                let score = similarity(&old.name, &new.name);
                if score >= RENAME_SIMILARITY {
                    candidates.push((d, a, score));
                }
            }
        }
        let (used_dropped, used_added) = pick_best(candidates, |d, a, similarity| {
            self.diff.ambiguous.push(AmbiguousChange::ColumnRename {
                table: table.clone(),
                from: dropped[d].name.clone(),
                to: added[a].name.clone(),
                similarity,
            });
        });
        retain_unused(dropped, &used_dropped);
        retain_unused(added, &used_added);
    }

    /// Adds a column. A NOT NULL column goes in nullable with a default,
    /// is back-filled, then tightened, unless the vendor does all of it in
    /// one statement.
    fn add_column(&mut self, table: &Table, col: &Column) {
        let mut change =
            DbObjectChange::new(DbObjectType::Column, None, Some(column_object(&table.name, col)));
        if col.nullable || col.identity || col.computed.is_some() {
            change = change.script(ScriptType::ColumnAdd, self.dialect.add_column(table, col));
        } else if self.has(Features::ADD_NOT_NULL_WITH_DEFAULT) {
            let staged = Column {
                default: Some(self.fill_value(col)),
                ..col.clone()
            };
            change = change.script(ScriptType::ColumnAdd, self.dialect.add_column(table, &staged));
            if col.default.is_none() {
                change = change.scripts(
                    ScriptType::ColumnModify,
                    self.dialect.alter_default(&table.name, &staged, col),
                );
            }
        } else {
            let fill = self.fill_value(col);
            let staged = Column {
                nullable: true,
                default: Some(fill.clone()),
                ..col.clone()
            };
            change = change
                .script(ScriptType::ColumnAdd, self.dialect.add_column(table, &staged))
                .script(
                    ScriptType::ColumnInit,
                    self.dialect.backfill(&table.name, &col.name, &fill),
                );
            let tighten = if self.has(Features::ALTER_COLUMN) {
                let mut sql = self.dialect.alter_column(&table.name, &staged, col);
                if col.default.is_none() {
                    sql.extend(self.dialect.alter_default(&table.name, &staged, col));
                }
                sql
            } else {
                self.rebuild_column(table, &staged, col)
            };
            change = change.scripts(ScriptType::ColumnModify, tighten);
        }
        debug!(table = %table.name, column = %col.name, steps = change.steps(), "column added");
        self.push(change);
    }

    /// Emits the change for a column present on both sides. Returns whether
    /// the column is rebuilt, which drops the indexes over it.
    fn modify_column(&mut self, new: &Table, old: &Table, col: &Column, o: &Column) -> bool {
        if o.identity != col.identity {
            self.warning(DiffWarning::IdentityChange {
                table: new.name.clone(),
                column: col.name.clone(),
            });
        }
        if o.computed.is_some() != col.computed.is_some() {
            self.warning(DiffWarning::ComputedChange {
                table: new.name.clone(),
                column: col.name.clone(),
            });
            return false;
        }

        let type_changed = col.computed.is_none() && !self.same_type(o, col);
        let null_changed = o.nullable != col.nullable;
        let default_changed = match (&o.default, &col.default) {
            (Some(a), Some(b)) => normalize_default(a) != normalize_default(b),
            (None, Some(_)) => true,
            // A rebuild cannot leave a NOT NULL column without a default.
            (Some(_), None) => self.has(Features::ALTER_COLUMN),
            (None, None) => false,
        };
        if !(type_changed || null_changed || default_changed) {
            return false;
        }

        // The loaded shape under the declared name; renames already ran.
        let current = Column {
            name: col.name.clone(),
            ..o.clone()
        };
        let mut change = DbObjectChange::new(
            DbObjectType::Column,
            Some(column_object(&old.name, o)),
            Some(column_object(&new.name, col)),
        );
        if null_changed && !col.nullable {
            change = change.script(
                ScriptType::ColumnInit,
                self.dialect.backfill(&new.name, &col.name, &self.fill_value(col)),
            );
        }

        let mut rebuilt = false;
        if self.has(Features::ALTER_COLUMN) {
            if type_changed || null_changed {
                change = change.scripts(
                    ScriptType::ColumnModify,
                    self.dialect.alter_column(&new.name, &current, col),
                );
            }
            if default_changed {
                change = change.scripts(
                    ScriptType::ColumnModify,
                    self.dialect.alter_default(&new.name, &current, col),
                );
            }
        } else if in_key(old, &o.name, self.case_insensitive())
            || in_key(new, &col.name, self.case_insensitive())
        {
            self.warning(DiffWarning::ColumnRebuildBlocked {
                table: new.name.clone(),
                column: col.name.clone(),
            });
            return false;
        } else {
            change = change.scripts(
                ScriptType::ColumnModify,
                self.rebuild_column(new, &current, col),
            );
            rebuilt = true;
        }
        self.structural = true;
        self.push(change);
        rebuilt
    }

    /// Replaces `current` with `col` through a scratch column: add, copy,
    /// drop, rename.
    fn rebuild_column(&self, table: &Table, current: &Column, col: &Column) -> Vec<String> {
        let scratch = Column {
            name: format!("{}{REBUILD_SUFFIX}", col.name),
            default: if col.nullable {
                col.default.clone()
            } else {
                Some(self.fill_value(col))
            },
            renamed_from: Vec::new(),
            ..col.clone()
        };
        vec![
            self.dialect.add_column(table, &scratch),
            self.dialect.copy_column(&table.name, &col.name, &scratch.name),
            self.dialect.drop_column(&table.name, current),
            self.dialect.rename_column(&table.name, &scratch.name, &col.name),
        ]
    }

    fn drop_column(&mut self, new: &Table, old: &Table, col: &Column) {
        let blocked = !self.has(Features::ADD_CONSTRAINT)
            && in_key(old, &col.name, self.case_insensitive());
        if !self.has(Features::DROP_COLUMN) || blocked {
            self.warning(DiffWarning::ColumnDropUnsupported {
                table: new.name.clone(),
                column: col.name.clone(),
            });
            return;
        }
        self.structural = true;
        let change =
            DbObjectChange::new(DbObjectType::Column, Some(column_object(&old.name, col)), None)
                .script(ScriptType::ColumnDrop, self.dialect.drop_column(&new.name, col));
        self.push(change);
    }

    fn primary_key(&mut self, new: &Table, old: &Table, mapped: Option<Key>) {
        let same = match (&mapped, &new.primary_key) {
            (None, None) => true,
            (Some(a), Some(b)) => a.equivalent(b, self.case_insensitive()),
            _ => false,
        };
        if same {
            return;
        }
        if !self.has(Features::ADD_CONSTRAINT) {
            self.warning(DiffWarning::PrimaryKeyChange {
                table: new.name.clone(),
            });
            return;
        }
        let mut change = DbObjectChange::new(
            DbObjectType::PrimaryKey,
            old.primary_key.as_ref().map(|key| DbObject::Key {
                table: old.name.clone(),
                key: key.clone(),
            }),
            new.primary_key.as_ref().map(|key| DbObject::Key {
                table: new.name.clone(),
                key: key.clone(),
            }),
        );
        if let Some(key) = &old.primary_key {
            change = change.script(
                ScriptType::PrimaryKeyDrop,
                self.dialect.drop_primary_key(&old.name, key),
            );
        }
        if let Some(key) = &new.primary_key {
            change = change.script(ScriptType::PrimaryKeyAdd, self.dialect.add_primary_key(new, key));
        }
        self.push(change);
    }

    fn add_index(&mut self, table: &Table, index: &Index) {
        let change = index_change(&table.name, None, Some(index)).script(
            ScriptType::IndexAdd,
            self.dialect.create_index(&table.name, index),
        );
        self.push(change);
    }

    fn add_foreign_key(&mut self, table: &Table, fk: &Key) {
        let change = key_change(DbObjectType::ForeignKey, &table.name, None, Some(fk)).script(
            ScriptType::RefConstraintAdd,
            self.dialect.add_foreign_key(table, fk),
        );
        self.push(change);
    }

    /// Maps a loaded key onto declared names: renamed columns and renamed
    /// target tables.
    fn remap_key(&self, key: &Key, renamed: &[(String, String)]) -> Key {
        let ci = self.case_insensitive();
        let kind = match &key.kind {
            KeyKind::Foreign {
                target,
                target_columns,
            } => KeyKind::Foreign {
                target: self
                    .renamed_tables
                    .get(&self.key(target))
                    .cloned()
                    .unwrap_or_else(|| target.clone()),
                target_columns: target_columns.clone(),
            },
            other => other.clone(),
        };
        Key {
            kind,
            columns: key.columns.iter().map(|c| rename(c, renamed, ci)).collect(),
            ..key.clone()
        }
    }

    fn same_foreign_key(&self, a: &Key, b: &Key) -> bool {
        let ci = self.case_insensitive();
        match (a.target(), b.target()) {
            (Some((ta, ca)), Some((tb, cb))) => {
                self.key(ta) == self.key(tb)
                    && names_match(ca, cb, ci)
                    && names_match(&a.columns, &b.columns, ci)
                    && a.cascade_delete == b.cascade_delete
            }
            _ => false,
        }
    }

    fn views(&mut self, declared: &DbModel, loaded: &DbModel) {
        for view in &declared.views {
            if view.materialized && !self.has(Features::MATERIALIZED_VIEWS) {
                self.warning(DiffWarning::MaterializedViewUnsupported {
                    view: view.name.clone(),
                });
                continue;
            }
            let existing = loaded
                .views
                .iter()
                .find(|v| self.key(&v.name) == self.key(&view.name));
            let change = match existing {
                None => DbObjectChange::new(DbObjectType::View, None, Some(DbObject::View(view.clone())))
                    .script(ScriptType::ViewAdd, self.dialect.create_view(view)),
                // Column changes under a view can break it; recreate.
                Some(old) if self.structural || !old.same_definition(view) => DbObjectChange::new(
                    DbObjectType::View,
                    Some(DbObject::View(old.clone())),
                    Some(DbObject::View(view.clone())),
                )
                .script(ScriptType::ViewDrop, self.dialect.drop_view(old))
                .script(ScriptType::ViewAdd, self.dialect.create_view(view)),
                Some(_) => continue,
            };
            self.push(change);
        }
        for old in &loaded.views {
            if !declared.views.iter().any(|v| self.key(&v.name) == self.key(&old.name)) {
                let change = DbObjectChange::new(DbObjectType::View, Some(DbObject::View(old.clone())), None)
                    .script(ScriptType::ViewDrop, self.dialect.drop_view(old));
                self.push(change);
            }
        }
    }
}

fn same_name(a: &str, b: &str, case_insensitive: bool) -> bool {
    if case_insensitive {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}

fn names_match(a: &[String], b: &[String], case_insensitive: bool) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| same_name(x, y, case_insensitive))
}

fn rename(name: &str, renamed: &[(String, String)], case_insensitive: bool) -> String {
    renamed
        .iter()
        .find(|(from, _)| same_name(from, name, case_insensitive))
        .map_or_else(|| name.to_string(), |(_, to)| to.clone())
}

fn in_key(table: &Table, column: &str, case_insensitive: bool) -> bool {
    table
        .primary_key
        .iter()
        .chain(&table.foreign_keys)
        .any(|k| k.columns.iter().any(|c| same_name(c, column, case_insensitive)))
}

fn column_object(table: &ObjectName, column: &Column) -> DbObject {
    DbObject::Column {
        table: table.clone(),
        column: column.clone(),
    }
}

fn key_change(
    object_type: DbObjectType,
    table: &ObjectName,
    old: Option<&Key>,
    new: Option<&Key>,
) -> DbObjectChange {
    let object = |key: &Key| DbObject::Key {
        table: table.clone(),
        key: key.clone(),
    };
    DbObjectChange::new(object_type, old.map(object), new.map(object))
}

fn index_change(table: &ObjectName, old: Option<&Index>, new: Option<&Index>) -> DbObjectChange {
    let object = |index: &Index| DbObject::Index {
        table: table.clone(),
        index: index.clone(),
    };
    DbObjectChange::new(DbObjectType::Index, old.map(object), new.map(object))
}

fn constraint_label(key: &Key) -> String {
    key.name
        .clone()
        .unwrap_or_else(|| format!("({})", key.columns.join(", ")))
}

/// Greedy one-to-one matching, best score first. Calls `report` for each
/// accepted `(dropped, added, score)` pair and returns the used indices.
fn pick_best(
    mut candidates: Vec<(usize, usize, f64)>,
    mut report: impl FnMut(usize, usize, f64),
) -> (BTreeSet<usize>, BTreeSet<usize>) {
    candidates.sort_by(|x, y| y.2.total_cmp(&x.2));
    let mut used_dropped = BTreeSet::new();
    let mut used_added = BTreeSet::new();
    for (d, a, score) in candidates {
        if used_dropped.contains(&d) || used_added.contains(&a) {
            continue;
        }
        report(d, a, score);
        used_dropped.insert(d);
        used_added.insert(a);
    }
    (used_dropped, used_added)
}

fn retain_unused<T: Copy>(items: &mut Vec<T>, used: &BTreeSet<usize>) {
    *items = items
        .iter()
        .enumerate()
        .filter(|(i, _)| !used.contains(i))
        .map(|(_, item)| *item)
        .collect();
}

/// Levenshtein distance over chars, one row at a time.
fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == *cb {
                diagonal
            } else {
                1 + diagonal.min(above).min(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

/// Case-insensitive name similarity in `[0, 1]`.
#[allow(clippy::cast_precision_loss)]
fn similarity(a: &str, b: &str) -> f64 {
    let (a, b) = (a.to_lowercase(), b.to_lowercase());
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - edit_distance(&a, &b) as f64 / longest as f64
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::dialect::{Dialect, MsSqlDialect, PostgresDialect, SqliteDialect};
    use crate::model::{bigint, boolean, integer, text, varchar, TableSpec};

    fn model(dialect: &dyn Dialect, specs: &[TableSpec]) -> DbModel {
        DbModel::from_specs(dialect.types(), specs)
    }

    fn sql(diff: &SchemaDiff) -> Vec<String> {
        diff.scripts().into_iter().map(|s| s.sql).collect()
    }

    fn books() -> TableSpec {
        TableSpec::new("books")
            .column(bigint("id").identity())
            .column(text("title").not_null())
            .primary_key(&["id"])
    }

    #[test]
    fn test_similarity() {
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("", "abc"), 3);
        assert!((similarity("Title", "titel") - 0.6).abs() < 1e-9);
        assert!(similarity("name", "price") < RENAME_SIMILARITY);
    }

    #[test]
    fn test_identical_models_have_no_changes() {
        let dialect = SqliteDialect::new();
        let m = model(&dialect, &[books()]);
        let diff = SchemaUpdater::new(&dialect).diff(&m, &m);
        assert!(diff.is_empty());
        assert!(diff.scripts().is_empty());
    }

    #[test]
    fn test_safe_add_on_sqlite_takes_three_steps() {
        let dialect = SqliteDialect::new();
        let v1 = model(&dialect, &[books()]);
        let v2 = model(
            &dialect,
            &[books().column(boolean("active").not_null().default_expr("1"))],
        );
        let diff = SchemaUpdater::new(&dialect).diff(&v2, &v1);

        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].steps(), 3);
        assert_eq!(
            sql(&diff),
            [
                "PRAGMA defer_foreign_keys = ON",
                "ALTER TABLE \"books\" ADD COLUMN \"active\" BOOLEAN DEFAULT 1",
                "UPDATE \"books\" SET \"active\" = 1 WHERE \"active\" IS NULL",
                "ALTER TABLE \"books\" ADD COLUMN \"active$new\" BOOLEAN NOT NULL DEFAULT 1",
                "UPDATE \"books\" SET \"active$new\" = \"active\"",
                "ALTER TABLE \"books\" DROP COLUMN \"active\"",
                "ALTER TABLE \"books\" RENAME COLUMN \"active$new\" TO \"active\"",
            ]
        );
    }

    #[test]
    fn test_safe_add_on_postgres_takes_one_step() {
        let dialect = PostgresDialect::new();
        let v1 = model(&dialect, &[books()]);
        let v2 = model(
            &dialect,
            &[books().column(boolean("active").not_null().default_expr("true"))],
        );
        let diff = SchemaUpdater::new(&dialect).diff(&v2, &v1);

        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].steps(), 1);
        assert_eq!(
            sql(&diff),
            ["ALTER TABLE \"books\" ADD COLUMN \"active\" boolean NOT NULL DEFAULT true"]
        );
    }

    #[test]
    fn test_add_without_default_drops_the_staging_default() {
        let dialect = PostgresDialect::new();
        let v1 = model(&dialect, &[books()]);
        let v2 = model(&dialect, &[books().column(integer("pages").not_null())]);
        let diff = SchemaUpdater::new(&dialect).diff(&v2, &v1);
        assert_eq!(
            sql(&diff),
            [
                "ALTER TABLE \"books\" ADD COLUMN \"pages\" integer NOT NULL DEFAULT 0",
                "ALTER TABLE \"books\" ALTER COLUMN \"pages\" DROP DEFAULT",
            ]
        );
    }

    #[test]
    fn test_new_tables_are_created_parents_first() {
        let dialect = PostgresDialect::new();
        let declared = model(
            &dialect,
            &[
                TableSpec::new("reviews")
                    .column(bigint("id"))
                    .column(bigint("book_id").not_null().references("books", "id"))
                    .primary_key(&["id"]),
                books(),
            ],
        );
        let diff = SchemaUpdater::new(&dialect).diff(&declared, &DbModel::new());
        let scripts = diff.scripts();
        let types: Vec<ScriptType> = scripts.iter().map(|s| s.script_type).collect();
        assert_eq!(
            types,
            [ScriptType::TableAdd, ScriptType::TableAdd, ScriptType::RefConstraintAdd]
        );
        assert!(scripts[0].sql.starts_with("CREATE TABLE \"books\""));
        assert!(scripts[1].sql.starts_with("CREATE TABLE \"reviews\""));
        assert_eq!(
            scripts[2].sql,
            "ALTER TABLE \"reviews\" ADD CONSTRAINT \"fk_reviews_books_book_id\" \
             FOREIGN KEY (\"book_id\") REFERENCES \"books\" (\"id\")"
        );
    }

    #[test]
    fn test_tables_are_dropped_children_first() {
        let dialect = SqliteDialect::new();
        let loaded = model(
            &dialect,
            &[
                TableSpec::new("publishers").column(bigint("id")).primary_key(&["id"]),
                TableSpec::new("books")
                    .column(bigint("id"))
                    .column(bigint("publisher_id").references("publishers", "id"))
                    .primary_key(&["id"]),
            ],
        );
        let diff = SchemaUpdater::new(&dialect).diff(&DbModel::new(), &loaded);
        assert_eq!(
            sql(&diff),
            [
                "PRAGMA defer_foreign_keys = ON",
                "DROP TABLE \"books\"",
                "DROP TABLE \"publishers\"",
            ]
        );
    }

    #[test]
    fn test_declared_rename_is_applied() {
        let dialect = SqliteDialect::new();
        let v1 = model(
            &dialect,
            &[TableSpec::new("authors")
                .column(bigint("id"))
                .column(varchar("name", 100))
                .index(&["name"])
                .primary_key(&["id"])],
        );
        let v2 = model(
            &dialect,
            &[TableSpec::new("authors")
                .column(bigint("id"))
                .column(varchar("full_name", 100).renamed_from("name"))
                .index(&["full_name"])
                .primary_key(&["id"])],
        );
        let diff = SchemaUpdater::new(&dialect).diff(&v2, &v1);
        assert!(diff.ambiguous.is_empty());
        assert_eq!(
            sql(&diff),
            [
                "PRAGMA defer_foreign_keys = ON",
                "ALTER TABLE \"authors\" RENAME COLUMN \"name\" TO \"full_name\"",
            ]
        );
    }

    #[test]
    fn test_similar_names_are_reported_not_applied() {
        let dialect = PostgresDialect::new();
        let v1 = model(&dialect, &[books().column(text("summery"))]);
        let v2 = model(&dialect, &[books().column(text("summary"))]);
        let diff = SchemaUpdater::new(&dialect).diff(&v2, &v1);

        assert!(diff.changes.is_empty());
        assert!(!diff.is_empty());
        assert_eq!(diff.ambiguous.len(), 1);
        assert!(matches!(
            &diff.ambiguous[0],
            AmbiguousChange::ColumnRename { from, to, .. } if from == "summery" && to == "summary"
        ));
    }

    #[test]
    fn test_sqlite_rebuild_recreates_indexes() {
        let dialect = SqliteDialect::new();
        let v1 = model(
            &dialect,
            &[TableSpec::new("books")
                .column(bigint("id").identity())
                .column(text("title"))
                .index(&["title"])
                .primary_key(&["id"])],
        );
        let v2 = model(
            &dialect,
            &[TableSpec::new("books")
                .column(bigint("id").identity())
                .column(text("title").not_null())
                .index(&["title"])
                .primary_key(&["id"])],
        );
        let diff = SchemaUpdater::new(&dialect).diff(&v2, &v1);
        let scripts = diff.scripts();
        let types: Vec<ScriptType> = scripts.iter().map(|s| s.script_type).collect();
        assert_eq!(
            types,
            [
                ScriptType::SessionSetup,
                ScriptType::IndexDrop,
                ScriptType::ColumnInit,
                ScriptType::ColumnModify,
                ScriptType::ColumnModify,
                ScriptType::ColumnModify,
                ScriptType::ColumnModify,
                ScriptType::IndexAdd,
            ]
        );
        assert_eq!(scripts[1].sql, "DROP INDEX \"ix_books_title\"");
        assert_eq!(
            scripts[2].sql,
            "UPDATE \"books\" SET \"title\" = '' WHERE \"title\" IS NULL"
        );
        assert_eq!(
            scripts[7].sql,
            "CREATE INDEX \"ix_books_title\" ON \"books\" (\"title\")"
        );
    }

    #[test]
    fn test_postgres_alters_column_type_in_place() {
        let dialect = PostgresDialect::new();
        let v1 = model(&dialect, &[books().column(integer("pages"))]);
        let v2 = model(&dialect, &[books().column(bigint("pages"))]);
        let diff = SchemaUpdater::new(&dialect).diff(&v2, &v1);
        assert_eq!(
            sql(&diff),
            ["ALTER TABLE \"books\" ALTER COLUMN \"pages\" TYPE bigint USING \"pages\"::bigint"]
        );
    }

    #[test]
    fn test_sqlite_cannot_add_foreign_keys_later() {
        let dialect = SqliteDialect::new();
        let publishers = TableSpec::new("publishers").column(bigint("id")).primary_key(&["id"]);
        let v1 = model(
            &dialect,
            &[publishers.clone(), books().column(bigint("publisher_id"))],
        );
        let v2 = model(
            &dialect,
            &[
                publishers,
                books().column(bigint("publisher_id").references("publishers", "id")),
            ],
        );
        let diff = SchemaUpdater::new(&dialect).diff(&v2, &v1);
        assert!(diff.changes.is_empty());
        assert_eq!(diff.warnings.len(), 1);
    }

    #[test]
    fn test_export_uses_the_batch_separator() {
        let dialect = MsSqlDialect::new();
        let declared = model(&dialect, &[books()]);
        let diff = SchemaUpdater::new(&dialect).diff(&declared, &DbModel::new());
        let script = diff.export(dialect.batch_separator());
        assert!(script.starts_with("CREATE TABLE [books]"));
        assert!(script.ends_with(")\nGO\n"));
    }
}
