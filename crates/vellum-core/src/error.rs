//! Error types for translation, rendering and result processing.

/// Errors raised while parsing templates or rendering SQL text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SqlError {
    /// A template string could not be parsed.
    #[error("Malformed template {template:?} at byte {position}: {reason}")]
    MalformedTemplate {
        /// The template source text.
        template: String,
        /// Byte offset of the problem.
        position: usize,
        /// What went wrong.
        reason: String,
    },

    /// A template was formatted with the wrong number of arguments.
    #[error("Template {template:?} expects {expected} argument(s), got {actual}")]
    TemplateArity {
        /// The template source text.
        template: String,
        /// Number of slots in the template.
        expected: usize,
        /// Number of arguments supplied.
        actual: usize,
    },

    /// A statement was bound with too few values.
    #[error("Statement references parameter {index} but only {supplied} value(s) were supplied")]
    MissingParameter {
        /// Index of the missing value.
        index: usize,
        /// Number of values supplied.
        supplied: usize,
    },

    /// A value cannot be rendered as a literal of the requested type.
    #[error("Cannot render {value} as a {kind} literal")]
    Literal {
        /// Debug rendering of the value.
        value: String,
        /// The literal kind that was requested.
        kind: String,
    },

    /// A column placeholder was bound to something that is not an identifier.
    #[error("Column placeholder {index} must be bound to a text value")]
    ColumnPlaceholder {
        /// Index of the placeholder.
        index: usize,
    },

    /// The dialect cannot express the requested construct.
    #[error("{dialect} does not support {construct}")]
    Unsupported {
        /// Dialect name.
        dialect: &'static str,
        /// The construct that was requested.
        construct: String,
    },
}

/// A query could not be translated into SQL.
///
/// Carries the offending sub-expression and the description of the whole
/// command so the failure can be located without a debugger.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Cannot translate `{expression}` in `{command}`: {reason}")]
pub struct TranslationError {
    /// What went wrong.
    pub reason: String,
    /// The sub-expression being translated.
    pub expression: String,
    /// Description of the whole command.
    pub command: String,
}

impl TranslationError {
    /// Creates a new translation error.
    #[must_use]
    pub fn new(
        reason: impl Into<String>,
        expression: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            reason: reason.into(),
            expression: expression.into(),
            command: command.into(),
        }
    }
}

/// Returned rows did not match the shape the command asked for.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResultError {
    /// `first`/`single`/`last` found nothing.
    #[error("Query `{command}` returned no rows")]
    NoRows {
        /// Description of the command.
        command: String,
    },

    /// `single` found more than one row.
    #[error("Query `{command}` returned more than one row")]
    MultipleRows {
        /// Description of the command.
        command: String,
    },

    /// A scalar command returned no value.
    #[error("Query `{command}` returned no scalar value")]
    NoScalar {
        /// Description of the command.
        command: String,
    },

    /// A record has no column of that name.
    #[error("Record has no column `{column}`")]
    MissingColumn {
        /// Requested column.
        column: String,
    },

    /// A column value does not convert to the requested type.
    #[error("Column `{column}` holds {value}, which is not a {target}")]
    Conversion {
        /// Column name.
        column: String,
        /// Debug rendering of the value.
        value: String,
        /// Requested Rust type.
        target: &'static str,
    },
}

/// Errors produced by `vellum-core`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Template or rendering failure.
    #[error(transparent)]
    Sql(#[from] SqlError),

    /// Query translation failure.
    #[error(transparent)]
    Translation(#[from] TranslationError),

    /// Result shape failure.
    #[error(transparent)]
    Execution(#[from] ResultError),

    /// The schema model is inconsistent.
    #[error("Schema error: {0}")]
    Schema(String),
}

/// Result type for `vellum-core` operations.
pub type Result<T> = std::result::Result<T, Error>;
