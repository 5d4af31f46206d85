//! Per-vendor type registries.

use std::collections::HashMap;

use crate::error::SqlError;
use crate::value::Value;

use super::{render_literal, BinaryStyle, DbTypeDef, DbTypeInfo, HostType, LiteralKind, TypeFlags};

const SIZED: TypeFlags = TypeFlags::HAS_SIZE;
const NUMERIC: TypeFlags = TypeFlags::HAS_PRECISION_SCALE;
const NONE: TypeFlags = TypeFlags::empty();

const fn def(
    name: &'static str,
    aliases: &'static [&'static str],
    flags: TypeFlags,
    literal: LiteralKind,
    default_init: &'static str,
) -> DbTypeDef {
    DbTypeDef {
        name,
        aliases,
        flags,
        literal,
        default_init,
    }
}

/// Storage types of one vendor and the host-type mapping onto them.
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    vendor: &'static str,
    defs: Vec<DbTypeDef>,
    host_map: HashMap<HostType, usize>,
    /// Def used for strings with an explicit size, when it differs from the
    /// unsized one.
    sized_string: Option<usize>,
}

impl TypeRegistry {
    fn build(
        vendor: &'static str,
        defs: Vec<DbTypeDef>,
        mapping: &[(HostType, &str)],
        sized_string: Option<&str>,
    ) -> Self {
        let index_of = |name: &str| defs.iter().position(|d| d.name == name);
        let host_map = mapping
            .iter()
            .filter_map(|(host, name)| index_of(name).map(|i| (*host, i)))
            .collect();
        let sized_string = sized_string.and_then(index_of);
        Self {
            vendor,
            defs,
            host_map,
            sized_string,
        }
    }

    /// `SQLite` storage types.
    ///
    /// `SQLite` keeps declared type names verbatim, so temporal and GUID
    /// columns get descriptive names that the loader reads back unchanged.
    #[must_use]
    pub fn sqlite() -> Self {
        let defs = vec![
            def("INTEGER", &["INT", "BIGINT"], NONE, LiteralKind::Integer, "0"),
            def("BOOLEAN", &["BOOL"], NONE, LiteralKind::BoolNumeric, "0"),
            def("REAL", &["DOUBLE", "FLOAT"], NONE, LiteralKind::Real, "0.0"),
            def("NUMERIC", &["DECIMAL"], NUMERIC, LiteralKind::Decimal, "0"),
            def("TEXT", &["VARCHAR"], NONE, LiteralKind::String { national: false }, "''"),
            def("BLOB", &[], NONE, LiteralKind::Binary(BinaryStyle::HexQuoted), "X''"),
            def("UUID", &[], NONE, LiteralKind::Guid, "'00000000-0000-0000-0000-000000000000'"),
            def("DATETIME", &["TIMESTAMP"], NONE, LiteralKind::DateTime, "'1900-01-01 00:00:00'"),
            def("DATE", &[], NONE, LiteralKind::Date, "'1900-01-01'"),
            def("TIME", &[], NONE, LiteralKind::Time, "'00:00:00'"),
        ];
        let mapping = [
            (HostType::Bool, "BOOLEAN"),
            (HostType::I8, "INTEGER"),
            (HostType::I16, "INTEGER"),
            (HostType::I32, "INTEGER"),
            (HostType::I64, "INTEGER"),
            (HostType::U8, "INTEGER"),
            (HostType::U16, "INTEGER"),
            (HostType::U32, "INTEGER"),
            (HostType::U64, "INTEGER"),
            (HostType::F32, "REAL"),
            (HostType::F64, "REAL"),
            (HostType::Decimal, "NUMERIC"),
            (HostType::String, "TEXT"),
            (HostType::Bytes, "BLOB"),
            (HostType::Uuid, "UUID"),
            (HostType::DateTime, "DATETIME"),
            (HostType::Date, "DATE"),
            (HostType::Time, "TIME"),
        ];
        Self::build("sqlite", defs, &mapping, None)
    }

    /// `PostgreSQL` storage types, named as `information_schema` reports them.
    #[must_use]
    pub fn postgres() -> Self {
        let defs = vec![
            def("smallint", &["int2"], NONE, LiteralKind::Integer, "0"),
            def("integer", &["int4", "int"], NONE, LiteralKind::Integer, "0"),
            def("bigint", &["int8"], NONE, LiteralKind::Integer, "0"),
            def("boolean", &["bool"], NONE, LiteralKind::BoolKeyword, "false"),
            def("real", &["float4"], NONE, LiteralKind::Real, "0"),
            def("double precision", &["float8"], NONE, LiteralKind::Real, "0"),
            def("numeric", &["decimal"], NUMERIC, LiteralKind::Decimal, "0"),
            def(
                "character varying",
                &["varchar"],
                SIZED,
                LiteralKind::String { national: false },
                "''",
            ),
            def(
                "text",
                &[],
                TypeFlags::UNLIMITED,
                LiteralKind::String { national: false },
                "''",
            ),
            def(
                "bytea",
                &[],
                TypeFlags::UNLIMITED,
                LiteralKind::Binary(BinaryStyle::Bytea),
                "'\\x'::bytea",
            ),
            def("uuid", &[], NONE, LiteralKind::Guid, "'00000000-0000-0000-0000-000000000000'"),
            def(
                "timestamp without time zone",
                &["timestamp"],
                NONE,
                LiteralKind::DateTime,
                "'1900-01-01 00:00:00'",
            ),
            def("date", &[], NONE, LiteralKind::Date, "'1900-01-01'"),
            def("time without time zone", &["time"], NONE, LiteralKind::Time, "'00:00:00'"),
        ];
        let mapping = [
            (HostType::Bool, "boolean"),
            (HostType::I8, "smallint"),
            (HostType::I16, "smallint"),
            (HostType::U8, "smallint"),
            (HostType::I32, "integer"),
            (HostType::U16, "integer"),
            (HostType::I64, "bigint"),
            (HostType::U32, "bigint"),
            (HostType::U64, "bigint"),
            (HostType::F32, "real"),
            (HostType::F64, "double precision"),
            (HostType::Decimal, "numeric"),
            (HostType::String, "text"),
            (HostType::Bytes, "bytea"),
            (HostType::Uuid, "uuid"),
            (HostType::DateTime, "timestamp without time zone"),
            (HostType::Date, "date"),
            (HostType::Time, "time without time zone"),
        ];
        Self::build("postgres", defs, &mapping, Some("character varying"))
    }

    /// SQL Server storage types.
    #[must_use]
    pub fn mssql() -> Self {
        let national = LiteralKind::String { national: true };
        let defs = vec![
            def("tinyint", &[], NONE, LiteralKind::Integer, "0"),
            def("smallint", &[], NONE, LiteralKind::Integer, "0"),
            def("int", &["integer"], NONE, LiteralKind::Integer, "0"),
            def("bigint", &[], NONE, LiteralKind::Integer, "0"),
            def("bit", &[], NONE, LiteralKind::BoolNumeric, "0"),
            def("real", &[], NONE, LiteralKind::Real, "0"),
            def("float", &[], NONE, LiteralKind::Real, "0"),
            def("decimal", &["numeric"], NUMERIC, LiteralKind::Decimal, "0"),
            def("nvarchar", &[], SIZED.union(TypeFlags::UNLIMITED), national, "N''"),
            def(
                "varbinary",
                &[],
                SIZED.union(TypeFlags::UNLIMITED),
                LiteralKind::Binary(BinaryStyle::HexPrefixed),
                "0x",
            ),
            def(
                "uniqueidentifier",
                &[],
                NONE,
                LiteralKind::Guid,
                "'00000000-0000-0000-0000-000000000000'",
            ),
            def("datetime2", &[], NONE, LiteralKind::DateTime, "'1900-01-01 00:00:00'"),
            def("date", &[], NONE, LiteralKind::Date, "'1900-01-01'"),
            def("time", &[], NONE, LiteralKind::Time, "'00:00:00'"),
        ];
        let mapping = [
            (HostType::Bool, "bit"),
            (HostType::U8, "tinyint"),
            (HostType::I8, "smallint"),
            (HostType::I16, "smallint"),
            (HostType::I32, "int"),
            (HostType::U16, "int"),
            (HostType::I64, "bigint"),
            (HostType::U32, "bigint"),
            (HostType::U64, "bigint"),
            (HostType::F32, "real"),
            (HostType::F64, "float"),
            (HostType::Decimal, "decimal"),
            (HostType::String, "nvarchar"),
            (HostType::Bytes, "varbinary"),
            (HostType::Uuid, "uniqueidentifier"),
            (HostType::DateTime, "datetime2"),
            (HostType::Date, "date"),
            (HostType::Time, "time"),
        ];
        Self::build("mssql", defs, &mapping, None)
    }

    /// Vendor name this registry belongs to.
    #[must_use]
    pub const fn vendor(&self) -> &'static str {
        self.vendor
    }

    /// All storage types.
    pub fn defs(&self) -> impl Iterator<Item = &DbTypeDef> {
        self.defs.iter()
    }

    /// Looks up a storage type by name or alias.
    #[must_use]
    pub fn def(&self, name: &str) -> Option<&DbTypeDef> {
        self.defs.iter().find(|d| d.matches(name))
    }

    /// The storage type a host type maps to, ignoring size.
    #[must_use]
    pub fn def_for_host(&self, host: HostType) -> Option<&DbTypeDef> {
        self.host_map.get(&host).map(|i| &self.defs[*i])
    }

    /// Resolves a host type plus optional size arguments to a concrete type.
    #[must_use]
    pub fn type_info(
        &self,
        host: HostType,
        size: Option<u32>,
        precision: Option<u8>,
        scale: Option<u8>,
    ) -> DbTypeInfo {
        let def = match (host, size, self.sized_string) {
            (HostType::String, Some(_), Some(i)) => Some(&self.defs[i]),
            _ => self.def_for_host(host),
        };
        let Some(def) = def else {
            return DbTypeInfo::simple("TEXT");
        };
        let mut info = DbTypeInfo::simple(def.name);
        if def.flags.contains(TypeFlags::HAS_SIZE) {
            match size {
                Some(n) => info.size = Some(n),
                None => info.unlimited = def.flags.contains(TypeFlags::UNLIMITED),
            }
        }
        if def.flags.contains(TypeFlags::HAS_PRECISION_SCALE) {
            if let (Some(p), Some(s)) = (precision, scale) {
                info.precision = Some(p);
                info.scale = Some(s);
            } else if let Some(p) = precision {
                info.precision = Some(p);
            } else if host == HostType::Decimal {
                info.precision = Some(18);
                info.scale = Some(2);
            }
        }
        info
    }

    /// Canonicalizes a type reported by a catalog: resolves aliases to the
    /// canonical name and drops size arguments the type does not take.
    #[must_use]
    pub fn normalize(&self, info: &DbTypeInfo) -> DbTypeInfo {
        let Some(def) = self.def(&info.type_name) else {
            return info.clone();
        };
        let mut out = DbTypeInfo::simple(def.name);
        if def.flags.contains(TypeFlags::HAS_SIZE) {
            out.size = info.size;
            out.unlimited = info.unlimited && def.flags.contains(TypeFlags::UNLIMITED);
        }
        if def.flags.contains(TypeFlags::HAS_PRECISION_SCALE) {
            out.precision = info.precision;
            out.scale = info.scale;
        }
        out
    }

    /// Back-fill literal for a type.
    #[must_use]
    pub fn default_initializer(&self, info: &DbTypeInfo) -> &'static str {
        self.def(&info.type_name).map_or("NULL", |d| d.default_init)
    }

    /// Renders a value as a literal of a column's storage type.
    ///
    /// # Errors
    ///
    /// Fails when the value does not fit the type.
    pub fn literal_for(&self, info: &DbTypeInfo, value: &Value) -> Result<String, SqlError> {
        match self.def(&info.type_name) {
            Some(def) => render_literal(def.literal, value),
            None => self.literal(value),
        }
    }

    /// Renders a value as a literal, inferring the type from the value.
    ///
    /// # Errors
    ///
    /// Fails for values the vendor cannot express inline.
    pub fn literal(&self, value: &Value) -> Result<String, SqlError> {
        match value {
            Value::Null => Ok(String::from("NULL")),
            Value::List(items) if items.is_empty() => Ok(String::from("(SELECT NULL WHERE 1 = 0)")),
            Value::List(items) => {
                let rendered = items
                    .iter()
                    .map(|item| self.literal(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", rendered.join(", ")))
            }
            other => {
                let kind = HostType::of_value(other)
                    .and_then(|host| self.def_for_host(host))
                    .map_or(LiteralKind::String { national: false }, |d| d.literal);
                render_literal(kind, other)
            }
        }
    }
}
