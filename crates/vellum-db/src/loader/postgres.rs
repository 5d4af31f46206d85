//! `PostgreSQL` catalog queries.
//!
//! Queries run once per allow-listed schema with the schema name bound as
//! `$1`. Catalog columns of internal types (`name`, `oid`, `char`) are cast
//! so every value arrives as text or an integer.

use vellum_core::{BoundCommand, Value};

use super::{object_name, CatalogRow, CatalogValues};
use crate::driver::Driver;
use crate::error::Result;

const DEFAULT_SCHEMA: &str = "public";

const SCHEMAS: &str = "SELECT schema_name::text FROM information_schema.schemata \
     WHERE schema_name = $1";

const TABLES: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema = $1 AND table_type = 'BASE TABLE' ORDER BY table_name";

const COLUMNS: &str = "SELECT table_name::text, column_name::text, data_type::text, \
     character_maximum_length::int, numeric_precision::int, numeric_scale::int, \
     is_nullable::text, column_default::text, is_identity::text, is_generated::text, \
     generation_expression::text \
     FROM information_schema.columns c \
     WHERE table_schema = $1 AND EXISTS (SELECT 1 FROM information_schema.tables t \
         WHERE t.table_schema = c.table_schema AND t.table_name = c.table_name \
         AND t.table_type = 'BASE TABLE') \
     ORDER BY table_name, ordinal_position";

const PRIMARY_KEYS: &str = "SELECT tc.table_name::text, tc.constraint_name::text, kcu.column_name::text \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
       ON kcu.constraint_schema = tc.constraint_schema AND kcu.constraint_name = tc.constraint_name \
     WHERE tc.table_schema = $1 AND tc.constraint_type = 'PRIMARY KEY' \
     ORDER BY tc.table_name, kcu.ordinal_position";

const INDEXES: &str = "SELECT t.relname::text, i.relname::text, a.attname::text, ix.indisunique, \
     pg_get_expr(ix.indpred, ix.indrelid) \
     FROM pg_index ix \
     JOIN pg_class t ON t.oid = ix.indrelid \
     JOIN pg_class i ON i.oid = ix.indexrelid \
     JOIN pg_namespace n ON n.oid = t.relnamespace \
     CROSS JOIN LATERAL unnest(ix.indkey) WITH ORDINALITY AS k(attnum, ord) \
     JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
     WHERE n.nspname = $1 AND t.relkind = 'r' AND NOT ix.indisprimary \
       AND NOT EXISTS (SELECT 1 FROM pg_constraint c WHERE c.conindid = ix.indexrelid AND c.contype = 'u') \
     ORDER BY t.relname, i.relname, k.ord";

const UNIQUE_CONSTRAINTS: &str = "SELECT t.relname::text, c.conname::text, a.attname::text \
     FROM pg_constraint c \
     JOIN pg_class t ON t.oid = c.conrelid \
     JOIN pg_namespace n ON n.oid = t.relnamespace \
     CROSS JOIN LATERAL unnest(c.conkey) WITH ORDINALITY AS k(attnum, ord) \
     JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
     WHERE n.nspname = $1 AND c.contype = 'u' \
     ORDER BY t.relname, c.conname, k.ord";

const FOREIGN_KEYS: &str = "SELECT t.relname::text, c.conname::text, a.attname::text, \
     rn.nspname::text, rt.relname::text, ra.attname::text, (c.confdeltype = 'c') \
     FROM pg_constraint c \
     JOIN pg_class t ON t.oid = c.conrelid \
     JOIN pg_namespace n ON n.oid = t.relnamespace \
     JOIN pg_class rt ON rt.oid = c.confrelid \
     JOIN pg_namespace rn ON rn.oid = rt.relnamespace \
     CROSS JOIN LATERAL unnest(c.conkey, c.confkey) WITH ORDINALITY AS k(attnum, ref_attnum, ord) \
     JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum \
     JOIN pg_attribute ra ON ra.attrelid = rt.oid AND ra.attnum = k.ref_attnum \
     WHERE n.nspname = $1 AND c.contype = 'f' \
     ORDER BY t.relname, c.conname, k.ord";

const VIEWS: &str = "SELECT table_name::text, view_definition::text, false \
     FROM information_schema.views WHERE table_schema = $1 \
     UNION ALL \
     SELECT matviewname::text, definition::text, true \
     FROM pg_matviews WHERE schemaname = $1 \
     ORDER BY 1";

const SEQUENCES: &str = "SELECT c.relname::text, s.seqstart, s.seqincrement \
     FROM pg_sequence s \
     JOIN pg_class c ON c.oid = s.seqrelid \
     JOIN pg_namespace n ON n.oid = c.relnamespace \
     WHERE n.nspname = $1 AND NOT EXISTS (SELECT 1 FROM pg_depend d \
         WHERE d.classid = 'pg_class'::regclass AND d.objid = c.oid AND d.deptype IN ('a', 'i')) \
     ORDER BY c.relname";

fn in_schema(sql: &str, schema: &str) -> BoundCommand {
    BoundCommand {
        sql: sql.to_string(),
        params: vec![Value::Text(schema.to_string())],
    }
}

/// `information_schema` type name plus its size arguments.
fn type_spec(
    data_type: &str,
    length: Option<i64>,
    precision: Option<i64>,
    scale: Option<i64>,
) -> String {
    match (data_type, length, precision, scale) {
        (_, Some(length), _, _) => format!("{data_type}({length})"),
        ("numeric", _, Some(precision), Some(scale)) => {
            format!("{data_type}({precision},{scale})")
        }
        _ => data_type.to_string(),
    }
}

pub(super) async fn catalog(driver: &dyn Driver, schemas: &[String]) -> Result<Vec<CatalogRow>> {
    let default_schema = driver.dialect().default_schema();
    let schemas: Vec<&str> = if schemas.is_empty() {
        vec![DEFAULT_SCHEMA]
    } else {
        schemas.iter().map(String::as_str).collect()
    };

    let mut rows = Vec::new();
    for schema in schemas {
        let qualify = |table: String| object_name(schema, table, default_schema);

        for row in driver.fetch(&in_schema(SCHEMAS, schema)).await? {
            let name = CatalogValues::new(SCHEMAS, &row).text(0)?;
            rows.push(CatalogRow::Schema { name });
        }

        for row in driver.fetch(&in_schema(TABLES, schema)).await? {
            let values = CatalogValues::new(TABLES, &row);
            rows.push(CatalogRow::Table {
                table: qualify(values.text(0)?),
            });
        }

        for row in driver.fetch(&in_schema(COLUMNS, schema)).await? {
            let values = CatalogValues::new(COLUMNS, &row);
            let default = values.opt_text(7)?;
            let serial = default
                .as_deref()
                .is_some_and(|d| d.starts_with("nextval("));
            let computed = if values.text(9)? == "ALWAYS" {
                values.opt_text(10)?
            } else {
                None
            };
            rows.push(CatalogRow::Column {
                table: qualify(values.text(0)?),
                name: values.text(1)?,
                type_spec: type_spec(
                    &values.text(2)?,
                    values.opt_int(3)?,
                    values.opt_int(4)?,
                    values.opt_int(5)?,
                ),
                nullable: values.flag(6)?,
                identity: serial || values.flag(8)?,
                default: if serial { None } else { default },
                computed,
            });
        }

        for row in driver.fetch(&in_schema(PRIMARY_KEYS, schema)).await? {
            let values = CatalogValues::new(PRIMARY_KEYS, &row);
            rows.push(CatalogRow::PrimaryKey {
                table: qualify(values.text(0)?),
                name: Some(values.text(1)?),
                column: values.text(2)?,
            });
        }

        for row in driver.fetch(&in_schema(INDEXES, schema)).await? {
            let values = CatalogValues::new(INDEXES, &row);
            rows.push(CatalogRow::Index {
                table: qualify(values.text(0)?),
                name: values.text(1)?,
                column: values.text(2)?,
                unique: values.flag(3)?,
                filter: values.opt_text(4)?,
            });
        }

        // Unique constraints are loaded as the unique indexes backing them.
        for row in driver.fetch(&in_schema(UNIQUE_CONSTRAINTS, schema)).await? {
            let values = CatalogValues::new(UNIQUE_CONSTRAINTS, &row);
            rows.push(CatalogRow::Index {
                table: qualify(values.text(0)?),
                name: values.text(1)?,
                column: values.text(2)?,
                unique: true,
                filter: None,
            });
        }

        for row in driver.fetch(&in_schema(FOREIGN_KEYS, schema)).await? {
            let values = CatalogValues::new(FOREIGN_KEYS, &row);
            let target_schema = values.text(3)?;
            rows.push(CatalogRow::ForeignKey {
                table: qualify(values.text(0)?),
                name: values.text(1)?,
                named: true,
                column: values.text(2)?,
                target: object_name(&target_schema, values.text(4)?, default_schema),
                target_column: values.text(5)?,
                cascade_delete: values.flag(6)?,
            });
        }

        for row in driver.fetch(&in_schema(VIEWS, schema)).await? {
            let values = CatalogValues::new(VIEWS, &row);
            rows.push(CatalogRow::View {
                name: qualify(values.text(0)?),
                definition: values
                    .opt_text(1)?
                    .unwrap_or_default()
                    .trim()
                    .trim_end_matches(';')
                    .to_string(),
                materialized: values.flag(2)?,
            });
        }

        for row in driver.fetch(&in_schema(SEQUENCES, schema)).await? {
            let values = CatalogValues::new(SEQUENCES, &row);
            rows.push(CatalogRow::Sequence {
                name: qualify(values.text(0)?),
                start: values.int(1)?,
                increment: values.int(2)?,
            });
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_type_spec_keeps_size_arguments() {
        assert_eq!(
            type_spec("character varying", Some(200), None, None),
            "character varying(200)"
        );
        assert_eq!(type_spec("numeric", None, Some(18), Some(2)), "numeric(18,2)");
        assert_eq!(type_spec("integer", None, Some(32), Some(0)), "integer");
        assert_eq!(type_spec("text", None, None, None), "text");
    }
}
