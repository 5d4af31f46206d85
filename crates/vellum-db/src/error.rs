//! Error types for drivers, loaders and the upgrade orchestrator.

use crate::classify::ErrorKind;

/// Errors that can occur while talking to a database.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    /// A command failed in the database or on the way to it.
    #[error("Data access failed ({kind}): {source}")]
    DataAccess {
        /// Vendor-independent classification.
        kind: ErrorKind,
        /// The native error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An upgrade script failed. Scripts before `position` were applied
    /// unless the vendor runs DDL in a transaction.
    #[error("Upgrade script #{position} failed: {script}")]
    Upgrade {
        /// Zero-based position of the script in the plan.
        position: usize,
        /// The failing statement.
        script: String,
        /// Why it failed.
        #[source]
        source: Box<DbError>,
    },

    /// The version record holds a failure from an earlier run.
    #[error("Previous upgrade failed: {message}")]
    PreviousUpgradeFailed {
        /// Recorded failure message.
        message: String,
        /// Recorded failing script, if any.
        script: Option<String>,
    },

    /// Invalid settings or arguments.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error (settings, declared model and script files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to read or write JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Translation, rendering or result-shape failure.
    #[error(transparent)]
    Core(#[from] vellum_core::Error),
}

impl DbError {
    /// Wraps a native error with its classification.
    pub fn data_access(
        kind: ErrorKind,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::DataAccess {
            kind,
            source: source.into(),
        }
    }

    /// The classification of a data access failure, looking through upgrade
    /// failures.
    #[must_use]
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            Self::DataAccess { kind, .. } => Some(kind),
            Self::Upgrade { source, .. } => source.kind(),
            _ => None,
        }
    }

    /// Whether this is a unique index or constraint violation.
    #[must_use]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self.kind(), Some(ErrorKind::UniqueViolation { .. }))
    }
}

impl From<vellum_core::ResultError> for DbError {
    fn from(error: vellum_core::ResultError) -> Self {
        Self::Core(error.into())
    }
}

impl From<vellum_core::SqlError> for DbError {
    fn from(error: vellum_core::SqlError) -> Self {
        Self::Core(error.into())
    }
}

/// Result type for database operations.
pub type Result<T> = std::result::Result<T, DbError>;
