//! Query DSL, translation and result shaping.
//!
//! Commands are plain data built with [`Query`], [`Insert`], [`Update`] and
//! [`Delete`]. Compilation extracts their literals ([`parameterize`]),
//! resolves them against a [`DbModel`](crate::model::DbModel) into the IR
//! ([`Translator`]) and renders the IR with a
//! [`SqlBuilder`](crate::builder::SqlBuilder).

mod command;
mod expr;
mod ir;
mod parameterize;
mod result;
mod translate;

pub use command::{DbCommand, Delete, Insert, JoinKind, Query, QueryOp, Terminal, Update};
pub use expr::{
    avg, coalesce, col, col_of, count, count_all, count_distinct, lit, max, min, related, sum,
    AggregateFunc, BinaryOp, Expr, Function, IntoExpr, Ordering, Projection, Related, RelatedKind,
    UnaryOp,
};
pub use ir::{
    DeleteExpression, InsertExpression, OrderItem, OutputColumn, SelectExpression, SourceKind,
    SqlExpr, TableId, TableSource, UpdateExpression,
};
pub use parameterize::{parameterize, parameterize_query, Parameterized};
pub use result::{QueryResult, ReaderColumn, Record, ResultProcessor, RowReader};
pub use translate::{short_name, TranslatedCommand, TranslatedQuery, Translator, ALIAS_SENTINEL};
