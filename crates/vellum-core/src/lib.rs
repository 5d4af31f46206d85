//! # vellum-core
//!
//! Query translation, SQL generation and schema diffing for relational back-ends.
//!
//! This crate provides:
//! - A SQL fragment/template model with precedence-aware parenthesization
//! - A type registry mapping host types to vendor storage types and literals
//! - A schema model and a diff engine producing ordered DDL scripts
//! - A strongly typed query DSL, translated into a dialect-neutral IR and
//!   rendered into vendor SQL
//!
//! Nothing here talks to a database; drivers, schema loaders and the upgrade
//! orchestrator live in `vellum-db`.
//!
//! ## Building a query
//!
//! ```rust
//! use vellum_core::dialect::{Dialect, SqliteDialect};
//! use vellum_core::model::{DbModel, TableSpec, bigint, varchar};
//! use vellum_core::query::{Query, col};
//! use vellum_core::CommandCompiler;
//!
//! let dialect = SqliteDialect::new();
//! let model = DbModel::from_specs(
//!     dialect.types(),
//!     &[TableSpec::new("books")
//!         .column(bigint("id").identity())
//!         .column(varchar("title", 200))
//!         .primary_key(&["id"])],
//! );
//!
//! let compiler = CommandCompiler::new(&model, &dialect);
//! let query = Query::from("books")
//!     .filter(col("title").starts_with("c#"))
//!     .skip(0)
//!     .take(10);
//! let compiled = compiler.compile_query(&query).unwrap();
//! let bound = compiled.bind(&dialect).unwrap();
//!
//! assert_eq!(
//!     bound.sql,
//!     "SELECT \"id\", \"title\" FROM \"books\" WHERE \"title\" LIKE ? ESCAPE '\\' \
//!      ORDER BY \"id\" LIMIT ? OFFSET ?"
//! );
//! ```

extern crate self as vellum_core;

pub mod builder;
pub mod cache;
pub mod context;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod fragment;
pub mod model;
pub mod query;
pub mod types;
pub mod upgrade;
pub mod value;

mod compiler;

pub use cache::StatementCache;
pub use compiler::{CommandCompiler, CompiledCommand};
pub use context::{Clock, FixedClock, SystemClock};
pub use dialect::{DdlDialect, Dialect, Features, Vendor};
pub use entity::{ColumnSchema, Entity};
pub use error::{Error, ResultError, Result, SqlError, TranslationError};
pub use fragment::{BoundCommand, SqlFragment, SqlStatement, Template};
pub use model::DbModel;
pub use query::{DbCommand, Query, QueryResult, Record};
pub use value::{ToSqlValue, Value};
pub use vellum_derive::Entity;
