//! Data source entry points.
//!
//! [`DataSource`] is what the layers above the database use: it compiles
//! commands against the declared model, runs them through a [`Driver`] and
//! shapes the rows. Compiled statements are cached per command shape, so a
//! data source is meant to be long-lived and shared.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use vellum_core::query::{Delete, Insert, Update};
use vellum_core::{
    BoundCommand, CommandCompiler, CompiledCommand, DbCommand, DbModel, Query, QueryResult, Record,
    StatementCache, Value,
};

use crate::classify::{resolve_unique_index, ErrorKind};
use crate::driver::{BatchError, Driver};
use crate::error::{DbError, Result};

/// Per-call context: a label for logs and an optional timeout that
/// replaces the driver's command timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    label: String,
    timeout: Option<Duration>,
}

impl Session {
    /// A session labelled `label`.
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            timeout: None,
        }
    }

    /// Limits every call made with this session to `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new("default")
    }
}

/// One pending change for [`DataSource::save_changes`].
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// A new row.
    Insert(Insert),
    /// Changed rows.
    Update(Update),
    /// Removed rows.
    Delete(Delete),
}

impl Change {
    fn into_command(self) -> DbCommand {
        match self {
            Self::Insert(i) => DbCommand::Insert(i),
            Self::Update(u) => DbCommand::Update(u),
            Self::Delete(d) => DbCommand::Delete(d),
        }
    }

    fn table(&self) -> &str {
        match self {
            Self::Insert(i) => &i.table,
            Self::Update(u) => &u.table,
            Self::Delete(d) => &d.table,
        }
    }
}

impl From<Insert> for Change {
    fn from(insert: Insert) -> Self {
        Self::Insert(insert)
    }
}

impl From<Update> for Change {
    fn from(update: Update) -> Self {
        Self::Update(update)
    }
}

impl From<Delete> for Change {
    fn from(delete: Delete) -> Self {
        Self::Delete(delete)
    }
}

/// Executes commands against one database and declared model.
#[derive(Debug)]
pub struct DataSource {
    driver: Arc<dyn Driver>,
    model: DbModel,
    cache: StatementCache,
}

impl DataSource {
    /// Creates a data source for `model`.
    #[must_use]
    pub fn new(driver: Arc<dyn Driver>, model: DbModel) -> Self {
        Self {
            driver,
            model,
            cache: StatementCache::new(),
        }
    }

    /// The declared model.
    #[must_use]
    pub const fn model(&self) -> &DbModel {
        &self.model
    }

    /// The driver.
    #[must_use]
    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// Compiled statements held in the cache.
    #[must_use]
    pub fn cached_statements(&self) -> usize {
        self.cache.len()
    }

    /// Runs a query and shapes its rows as its terminal operator asks.
    ///
    /// # Errors
    ///
    /// Translation errors, result-shape errors (`first` without rows,
    /// `single` with several) and classified driver errors.
    pub async fn execute_select(&self, query: &Query, session: &Session) -> Result<QueryResult> {
        self.execute_command(DbCommand::Select(query.clone()), session)
            .await
    }

    /// Runs any command: queries return rows, other commands the affected
    /// row count.
    ///
    /// # Errors
    ///
    /// See [`Self::execute_select`].
    pub async fn execute_command(
        &self,
        command: impl Into<DbCommand>,
        session: &Session,
    ) -> Result<QueryResult> {
        let compiled = self.compile(&command.into())?;
        let bound = compiled.bind(self.driver.dialect().as_dialect())?;
        let processor = compiled.processor();
        debug!(
            session = %session.label,
            command = %compiled.description,
            "executing command"
        );

        if !processor.returns_rows() {
            let affected = timed(session, self.driver.execute(&bound))
                .await?
                .map_err(|e| self.resolve(e))?;
            return Ok(QueryResult::Affected(affected));
        }

        let rows = timed(session, self.driver.fetch(&bound))
            .await?
            .map_err(|e| self.resolve(e))?;
        let records = read_rows(&compiled, rows);
        Ok(processor.process(records, &compiled.description)?)
    }

    /// Applies changes in one transaction and returns the affected row
    /// count.
    ///
    /// Inserts run first, referenced tables before referencing ones, then
    /// updates in the given order, then deletes, referencing tables first.
    /// Nothing is applied when any command fails.
    ///
    /// # Errors
    ///
    /// Translation errors before anything runs, or the failing command's
    /// classified error.
    pub async fn save_changes(&self, session: &Session, changes: Vec<Change>) -> Result<u64> {
        if changes.is_empty() {
            return Ok(0);
        }
        let ordered = self.order_changes(changes);
        let dialect = self.driver.dialect().as_dialect();
        let mut commands: Vec<BoundCommand> = Vec::with_capacity(ordered.len());
        let mut descriptions: Vec<String> = Vec::with_capacity(ordered.len());
        for change in ordered {
            let compiled = self.compile(&change.into_command())?;
            commands.push(compiled.bind(dialect)?);
            descriptions.push(compiled.description);
        }

        let batch = self.driver.execute_batch(&commands, true);
        let affected = match timed(session, batch).await? {
            Ok(affected) => affected,
            Err(BatchError { position, source }) => {
                warn!(
                    session = %session.label,
                    position,
                    command = descriptions.get(position).map_or("COMMIT", String::as_str),
                    error = %source,
                    "save failed, rolled back"
                );
                return Err(self.resolve(source));
            }
        };
        info!(
            session = %session.label,
            commands = commands.len(),
            affected,
            "saved changes"
        );
        Ok(affected)
    }

    /// Closes the driver's pool.
    pub async fn close(&self) {
        self.driver.close().await;
    }

    fn compile(&self, command: &DbCommand) -> Result<CompiledCommand> {
        let compiled = CommandCompiler::new(&self.model, self.driver.dialect().as_dialect())
            .with_cache(&self.cache)
            .compile(command)?;
        Ok(compiled)
    }

    fn order_changes(&self, changes: Vec<Change>) -> Vec<Change> {
        let order = self.model.dependency_order();
        let rank = |change: &Change| {
            self.model
                .table(change.table())
                .and_then(|t| order.position(&t.name))
                .unwrap_or(usize::MAX)
        };

        let mut inserts = Vec::new();
        let mut updates = Vec::new();
        let mut deletes = Vec::new();
        for change in changes {
            match change {
                Change::Insert(_) => inserts.push(change),
                Change::Update(_) => updates.push(change),
                Change::Delete(_) => deletes.push(change),
            }
        }
        inserts.sort_by_key(&rank);
        deletes.sort_by_key(|c| std::cmp::Reverse(rank(c)));

        inserts.extend(updates);
        inserts.extend(deletes);
        inserts
    }

    /// Names the unique index behind a violation the vendor only reported
    /// by table and columns.
    fn resolve(&self, error: DbError) -> DbError {
        match error {
            DbError::DataAccess { kind, source } => DbError::DataAccess {
                kind: resolve_unique_index(kind, &self.model),
                source,
            },
            other => other,
        }
    }
}

/// Runs `future` under the session's timeout, when it has one.
async fn timed<F: Future>(session: &Session, future: F) -> Result<F::Output> {
    match session.timeout {
        Some(timeout) => tokio::time::timeout(timeout, future)
            .await
            .map_err(|elapsed| DbError::data_access(ErrorKind::Timeout, elapsed)),
        None => Ok(future.await),
    }
}

fn read_rows(compiled: &CompiledCommand, rows: Vec<Vec<Value>>) -> Vec<Record> {
    match &compiled.statement.row_reader {
        Some(reader) => rows.into_iter().map(|row| reader.read(row)).collect(),
        None => rows
            .into_iter()
            .map(|row| Record::new(Arc::from(Vec::<String>::new()), row))
            .collect(),
    }
}
