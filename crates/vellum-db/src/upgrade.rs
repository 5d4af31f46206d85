//! Upgrade orchestrator.
//!
//! Loads the live schema, diffs it against the declared model and applies
//! the scripts, keeping the version record current. Upgrades are serial:
//! running two against one database at the same time is not supported.

use std::path::Path;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};
use vellum_core::upgrade::{DbScript, SchemaDiff, SchemaUpdater};
use vellum_core::{BoundCommand, Clock, DbModel, Dialect, Features};

use crate::config::DbSettings;
use crate::driver::{BatchError, Driver};
use crate::error::{DbError, Result};
use crate::loader::load_schema;
use crate::version::{Outcome, VersionRecord, VersionStore};

/// Upgrade progress, sent on the optional progress channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradeEvent {
    /// The diff is computed.
    Planned {
        /// Number of object changes.
        changes: usize,
        /// Number of scripts to run.
        scripts: usize,
    },
    /// Scripts are being sent.
    Applying {
        /// Number of scripts.
        scripts: usize,
        /// Whether they run in one transaction.
        transactional: bool,
    },
    /// Every script was applied.
    Applied {
        /// Number of scripts.
        scripts: usize,
    },
    /// A script failed.
    Failed {
        /// Zero-based position of the failing script.
        position: usize,
    },
    /// The version record was written.
    Recorded,
}

/// The result of a successful upgrade.
#[derive(Debug, Clone)]
pub struct UpgradeReport {
    /// What was changed.
    pub diff: SchemaDiff,
    /// Number of scripts run.
    pub applied: usize,
    /// The version record written afterwards.
    pub record: VersionRecord,
}

/// Plans and applies schema upgrades for one database.
pub struct Upgrader<'a> {
    driver: &'a dyn Driver,
    settings: &'a DbSettings,
    clock: &'a dyn Clock,
    progress: Option<mpsc::Sender<UpgradeEvent>>,
}

impl<'a> Upgrader<'a> {
    /// Creates an upgrader.
    #[must_use]
    pub const fn new(driver: &'a dyn Driver, settings: &'a DbSettings, clock: &'a dyn Clock) -> Self {
        Self {
            driver,
            settings,
            clock,
            progress: None,
        }
    }

    /// Reports progress on `sender`. Events are dropped while the channel
    /// is full, and a dropped receiver does not stop the upgrade.
    #[must_use]
    pub fn with_progress(mut self, sender: mpsc::Sender<UpgradeEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Diffs `declared` against the live schema without changing anything.
    ///
    /// # Errors
    ///
    /// Fails when the schema cannot be loaded.
    pub async fn plan(&self, declared: &DbModel) -> Result<SchemaDiff> {
        let loaded = load_schema(self.driver, &self.schemas(declared)).await?;
        let diff = SchemaUpdater::new(self.driver.dialect()).diff(declared, &loaded);
        for warning in &diff.warnings {
            warn!(%warning, "schema difference without a script");
        }
        for ambiguous in &diff.ambiguous {
            warn!(?ambiguous, "suspected rename withheld; declare the former name to apply it");
        }
        info!(
            changes = diff.changes.len(),
            ambiguous = diff.ambiguous.len(),
            warnings = diff.warnings.len(),
            "planned upgrade"
        );
        Ok(diff)
    }

    /// Brings the database to `declared` and records the new version.
    ///
    /// # Errors
    ///
    /// [`DbError::PreviousUpgradeFailed`] when the record holds a failure and
    /// `force` is not set; [`DbError::Upgrade`] when a script fails, after
    /// the failure was recorded.
    pub async fn upgrade(&self, declared: &DbModel) -> Result<UpgradeReport> {
        let store = VersionStore::new(self.driver, self.clock);
        store.ensure_table().await?;
        if let Some(previous) = store.read(&self.settings.app_name).await? {
            if previous.failed {
                if !self.settings.force {
                    return Err(DbError::PreviousUpgradeFailed {
                        message: previous.failure_message.unwrap_or_default(),
                        script: previous.failed_script,
                    });
                }
                warn!(app = %previous.app_name, "previous upgrade failed, forcing");
            }
        }

        let diff = self.plan(declared).await?;
        let scripts = diff.scripts();
        self.report(UpgradeEvent::Planned {
            changes: diff.changes.len(),
            scripts: scripts.len(),
        });

        if let Err(error) = self.apply(&scripts).await {
            let BatchError { position, source } = error;
            self.report(UpgradeEvent::Failed { position });
            let script = scripts
                .get(position)
                .map_or_else(|| String::from("COMMIT"), |s| s.sql.clone());
            let message = source.to_string();
            if let Err(e) = store
                .write(
                    &self.settings.app_name,
                    &self.settings.app_version,
                    &self.settings.modules,
                    Outcome::Failed {
                        message: &message,
                        script: Some(&script),
                    },
                )
                .await
            {
                warn!(error = %e, "could not record the failed upgrade");
            }
            return Err(DbError::Upgrade {
                position,
                script,
                source: Box::new(source),
            });
        }

        let record = store
            .write(
                &self.settings.app_name,
                &self.settings.app_version,
                &self.settings.modules,
                Outcome::Succeeded,
            )
            .await?;
        self.report(UpgradeEvent::Recorded);
        info!(
            app = %record.app_name,
            version = %record.version,
            scripts = scripts.len(),
            "upgrade complete"
        );
        Ok(UpgradeReport {
            diff,
            applied: scripts.len(),
            record,
        })
    }

    async fn apply(&self, scripts: &[DbScript]) -> std::result::Result<(), BatchError> {
        if scripts.is_empty() {
            debug!("schema is current");
            return Ok(());
        }
        let transactional = self
            .driver
            .features()
            .contains(Features::TRANSACTIONAL_DDL);
        self.report(UpgradeEvent::Applying {
            scripts: scripts.len(),
            transactional,
        });

        let commands: Vec<BoundCommand> = scripts
            .iter()
            .map(|s| {
                debug!(script_type = ?s.script_type, sql = %s.sql, "upgrade script");
                BoundCommand::raw(s.sql.as_str())
            })
            .collect();
        self.driver.execute_batch(&commands, transactional).await?;
        self.report(UpgradeEvent::Applied { scripts: scripts.len() });
        Ok(())
    }

    /// The loader allow-list: the default schema, the configured ones and
    /// every schema the declared model uses.
    fn schemas(&self, declared: &DbModel) -> Vec<String> {
        let mut schemas: Vec<String> = Vec::new();
        let candidates = self
            .driver
            .dialect()
            .default_schema()
            .map(str::to_string)
            .into_iter()
            .chain(self.settings.schemas.iter().cloned())
            .chain(declared.schemas.iter().cloned());
        for schema in candidates {
            if !schemas.contains(&schema) {
                schemas.push(schema);
            }
        }
        schemas
    }

    fn report(&self, event: UpgradeEvent) {
        if let Some(sender) = &self.progress {
            match sender.try_send(event) {
                Ok(()) => {}
                Err(TrySendError::Full(event)) => debug!(?event, "progress channel full"),
                Err(TrySendError::Closed(_)) => debug!("progress receiver dropped"),
            }
        }
    }
}

/// Reads a declared model from a JSON file.
///
/// # Errors
///
/// Fails when the file cannot be read or does not hold a model.
pub fn read_model<P: AsRef<Path>>(path: P) -> Result<DbModel> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Writes the diff's scripts to `path`, each followed by the dialect's
/// batch separator, and returns the number of scripts written.
///
/// # Errors
///
/// Fails when the file cannot be written.
pub fn write_scripts<P: AsRef<Path>>(diff: &SchemaDiff, dialect: &dyn Dialect, path: P) -> Result<usize> {
    std::fs::write(path.as_ref(), diff.export(dialect.batch_separator()))?;
    let count = diff.scripts().len();
    info!(path = %path.as_ref().display(), scripts = count, "wrote upgrade scripts");
    Ok(count)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use sqlx::sqlite::SqlitePoolOptions;
    use vellum_core::model::{bigint, varchar, TableSpec};
    use vellum_core::FixedClock;

    use super::*;
    use crate::driver::{DataSourceLifecycle, SqliteDriver};

    async fn driver() -> SqliteDriver {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        SqliteDriver::from_pool(pool, Duration::from_secs(5))
    }

    fn books(driver: &SqliteDriver) -> DbModel {
        DbModel::from_specs(
            driver.dialect().types(),
            &[TableSpec::new("books")
                .column(bigint("id").identity())
                .column(varchar("title", 200))
                .primary_key(&["id"])],
        )
    }

    #[tokio::test]
    async fn test_upgrade_reports_progress() {
        let driver = driver().await;
        let settings = DbSettings::new("sqlite::memory:");
        let clock = FixedClock(Utc::now());
        let (tx, mut rx) = mpsc::channel(16);

        let report = Upgrader::new(&driver, &settings, &clock)
            .with_progress(tx)
            .upgrade(&books(&driver))
            .await
            .unwrap();
        assert!(report.applied > 0);
        assert_eq!(report.record.app_name, "vellum");

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events[0], UpgradeEvent::Planned { .. }));
        assert_eq!(
            events[1],
            UpgradeEvent::Applying {
                scripts: report.applied,
                transactional: true,
            }
        );
        assert_eq!(events.last(), Some(&UpgradeEvent::Recorded));
    }

    #[tokio::test]
    async fn test_unread_progress_does_not_block() {
        let driver = driver().await;
        let settings = DbSettings::new("sqlite::memory:");
        let clock = FixedClock(Utc::now());
        let (tx, mut rx) = mpsc::channel(1);

        let report = Upgrader::new(&driver, &settings, &clock)
            .with_progress(tx)
            .upgrade(&books(&driver))
            .await
            .unwrap();
        assert!(report.applied > 0);
        assert!(matches!(rx.try_recv(), Ok(UpgradeEvent::Planned { .. })));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_plan_is_empty() {
        let driver = driver().await;
        let settings = DbSettings::new("sqlite::memory:");
        let clock = FixedClock(Utc::now());
        let upgrader = Upgrader::new(&driver, &settings, &clock);
        let declared = books(&driver);

        upgrader.upgrade(&declared).await.unwrap();
        let diff = upgrader.plan(&declared).await.unwrap();
        assert!(diff.is_empty(), "{:?}", diff.scripts());

        let again = upgrader.upgrade(&declared).await.unwrap();
        assert_eq!(again.applied, 0);
    }
}
