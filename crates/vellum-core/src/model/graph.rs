//! Foreign-key dependency ordering.

use std::collections::{BTreeMap, BTreeSet};

use super::{DbModel, ObjectName};

/// Tables in foreign-key dependency order: referenced tables first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyOrder {
    /// Table names, parents before children.
    pub order: Vec<ObjectName>,
    /// Tables that sit on a foreign-key cycle. Their constraints must be
    /// added once every table exists.
    pub cyclic: BTreeSet<ObjectName>,
}

impl DependencyOrder {
    /// Position of a table in the order.
    #[must_use]
    pub fn position(&self, name: &ObjectName) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }
}

impl DbModel {
    /// Orders tables so that every table comes after the tables it references.
    ///
    /// Self-references are ignored. Tables on a cycle are appended in name
    /// order and reported in [`DependencyOrder::cyclic`].
    #[must_use]
    pub fn dependency_order(&self) -> DependencyOrder {
        let by_key: BTreeMap<String, &ObjectName> =
            self.tables.keys().map(|n| (n.key(true), n)).collect();

        let mut parents: BTreeMap<&ObjectName, BTreeSet<&ObjectName>> = BTreeMap::new();
        for (name, table) in &self.tables {
            let deps = parents.entry(name).or_default();
            for fk in &table.foreign_keys {
                if let Some((target, _)) = fk.target() {
                    if let Some(target) = by_key.get(&target.key(true)) {
                        if *target != name {
                            deps.insert(*target);
                        }
                    }
                }
            }
        }

        let mut order = Vec::with_capacity(parents.len());
        let mut placed: BTreeSet<&ObjectName> = BTreeSet::new();
        loop {
            let ready: Vec<&ObjectName> = parents
                .iter()
                .filter(|(name, deps)| !placed.contains(*name) && deps.is_subset(&placed))
                .map(|(name, _)| *name)
                .collect();
            if ready.is_empty() {
                break;
            }
            for name in ready {
                placed.insert(name);
                order.push(name.clone());
            }
        }

        let cyclic: BTreeSet<ObjectName> = parents
            .keys()
            .filter(|n| !placed.contains(*n))
            .map(|n| (*n).clone())
            .collect();
        order.extend(cyclic.iter().cloned());
        DependencyOrder { order, cyclic }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{bigint, TableSpec};
    use crate::types::TypeRegistry;

    fn model(specs: &[TableSpec]) -> DbModel {
        DbModel::from_specs(&TypeRegistry::sqlite(), specs)
    }

    #[test]
    fn test_parents_first() {
        let m = model(&[
            TableSpec::new("reviews").column(bigint("book_id").references("books", "id")),
            TableSpec::new("books").column(bigint("publisher_id").references("publishers", "id")),
            TableSpec::new("publishers").column(bigint("id")),
        ]);
        let order = m.dependency_order();
        let names: Vec<&str> = order.order.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, ["publishers", "books", "reviews"]);
        assert!(order.cyclic.is_empty());
    }

    #[test]
    fn test_cycles_are_reported() {
        let m = model(&[
            TableSpec::new("a").column(bigint("b_id").references("b", "id")),
            TableSpec::new("b").column(bigint("a_id").references("a", "id")),
            TableSpec::new("c").column(bigint("c_id").references("c", "id")),
        ]);
        let order = m.dependency_order();
        assert_eq!(order.order.len(), 3);
        assert_eq!(order.order[0].name, "c");
        assert_eq!(order.cyclic.len(), 2);
    }
}
