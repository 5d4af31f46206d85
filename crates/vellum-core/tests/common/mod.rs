#![allow(dead_code)]

use vellum_core::model::{bigint, decimal, integer, varchar, TableSpec};
use vellum_core::{BoundCommand, CommandCompiler, DbCommand, DbModel, Dialect, Entity};

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(table = "authors")]
pub struct Author {
    #[column(primary_key, identity)]
    pub id: i64,
    #[column(size = 100)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Entity)]
#[entity(table = "books")]
pub struct Book {
    #[column(primary_key, identity)]
    pub id: i64,
    #[column(size = 200)]
    pub title: String,
    #[column(size = 20, unique)]
    pub isbn: String,
    pub price: f64,
    #[column(references = "authors.id")]
    pub author_id: i64,
    pub pages: Option<i32>,
}

/// The library model declared through `Entity` derives.
pub fn entity_model(dialect: &dyn Dialect) -> DbModel {
    DbModel::from_specs(
        dialect.types(),
        &[
            Book::table_spec().unwrap_or_else(|e| panic!("books: {e}")),
            Author::table_spec().unwrap_or_else(|e| panic!("authors: {e}")),
        ],
    )
}

/// A library model with a three-level foreign key chain, declared children
/// first.
pub fn chain_specs() -> Vec<TableSpec> {
    vec![
        TableSpec::new("reviews")
            .column(bigint("id"))
            .column(bigint("edition_id").not_null().references("editions", "id"))
            .column(integer("rating"))
            .primary_key(&["id"]),
        TableSpec::new("editions")
            .column(bigint("id"))
            .column(bigint("book_id").not_null().references("books", "id"))
            .column(decimal("price", 10, 2))
            .primary_key(&["id"]),
        TableSpec::new("books")
            .column(bigint("id"))
            .column(varchar("title", 200))
            .primary_key(&["id"]),
    ]
}

pub fn bind(dialect: &dyn Dialect, model: &DbModel, command: impl Into<DbCommand>) -> BoundCommand {
    let command = command.into();
    CommandCompiler::new(model, dialect)
        .compile(&command)
        .unwrap_or_else(|e| panic!("Failed to compile {command}: {e}"))
        .bind(dialect)
        .unwrap_or_else(|e| panic!("Failed to bind {command}: {e}"))
}
