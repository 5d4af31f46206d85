//! Compiled statement cache.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::trace;

use crate::fragment::SqlStatement;

/// Concurrent cache of compiled statements keyed by normalized command shape.
///
/// Keys are the dialect name plus the parameterized command text, so two
/// commands differing only in literal values share one statement. Two threads
/// compiling the same shape may both populate the entry; the last write wins
/// and both statements are equivalent.
#[derive(Debug, Default)]
pub struct StatementCache {
    entries: DashMap<String, Arc<SqlStatement>>,
}

impl StatementCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the cache key for a command shape.
    #[must_use]
    pub fn key(dialect: &str, shape: &str) -> String {
        format!("{dialect}:{shape}")
    }

    /// Returns a cached statement.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<SqlStatement>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Stores a statement, replacing any previous entry.
    pub fn insert(&self, key: String, statement: SqlStatement) -> Arc<SqlStatement> {
        let statement = Arc::new(statement);
        trace!(key = %key, "caching statement");
        self.entries.insert(key, Arc::clone(&statement));
        statement
    }

    /// Returns the cached statement or compiles and stores it.
    ///
    /// # Errors
    ///
    /// Propagates the compile error; nothing is cached on failure.
    pub fn get_or_try_insert<E>(
        &self,
        key: &str,
        compile: impl FnOnce() -> Result<SqlStatement, E>,
    ) -> Result<Arc<SqlStatement>, E> {
        if let Some(hit) = self.get(key) {
            return Ok(hit);
        }
        Ok(self.insert(key.to_string(), compile()?))
    }

    /// Number of cached statements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::SqlFragment;
    use crate::query::ResultProcessor;

    fn statement(text: &str) -> SqlStatement {
        SqlStatement::new(vec![SqlFragment::text(text)], ResultProcessor::NonQuery)
    }

    #[test]
    fn test_compile_once() {
        let cache = StatementCache::new();
        let key = StatementCache::key("sqlite", "from(books)");
        let first = cache
            .get_or_try_insert::<()>(&key, || Ok(statement("SELECT 1")))
            .unwrap();
        let second = cache
            .get_or_try_insert::<()>(&key, || panic!("compiled twice"))
            .unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_failed_compile_is_not_cached() {
        let cache = StatementCache::new();
        let result = cache.get_or_try_insert(&String::from("k"), || Err("boom"));
        assert_eq!(result.unwrap_err(), "boom");
        assert!(cache.is_empty());
    }

    #[test]
    fn test_last_writer_wins() {
        let cache = StatementCache::new();
        cache.insert(String::from("k"), statement("SELECT 1"));
        cache.insert(String::from("k"), statement("SELECT 2"));
        let hit = cache.get("k").unwrap();
        assert_eq!(hit.fragments, vec![SqlFragment::text("SELECT 2")]);
    }
}
