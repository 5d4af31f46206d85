//! Type registry.
//!
//! Maps host types to vendor storage types and renders values as SQL
//! literals. Several host types may share one storage type (`u32` and `u64`
//! both map to `bigint` on Postgres).

mod literal;
mod registry;

pub use literal::{parse_datetime, render_literal};
pub use registry::TypeRegistry;

use std::fmt;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Host-side type of a column, as declared by an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HostType {
    /// `bool`
    Bool,
    /// `i8`
    I8,
    /// `i16`
    I16,
    /// `i32`
    I32,
    /// `i64`
    I64,
    /// `u8`
    U8,
    /// `u16`
    U16,
    /// `u32`
    U32,
    /// `u64`
    U64,
    /// `f32`
    F32,
    /// `f64`
    F64,
    /// Exact decimal.
    Decimal,
    /// `String`
    String,
    /// `Vec<u8>`
    Bytes,
    /// `Uuid`
    Uuid,
    /// `DateTime<Utc>`
    DateTime,
    /// `NaiveDate`
    Date,
    /// `NaiveTime`
    Time,
}

impl HostType {
    /// All host types.
    pub const ALL: [Self; 18] = [
        Self::Bool,
        Self::I8,
        Self::I16,
        Self::I32,
        Self::I64,
        Self::U8,
        Self::U16,
        Self::U32,
        Self::U64,
        Self::F32,
        Self::F64,
        Self::Decimal,
        Self::String,
        Self::Bytes,
        Self::Uuid,
        Self::DateTime,
        Self::Date,
        Self::Time,
    ];

    /// Maps a Rust type name, as written in a struct field, to a host type.
    ///
    /// `Option<T>` is unwrapped; paths keep only their last segment.
    #[must_use]
    pub fn from_rust_type(rust_type: &str) -> Option<Self> {
        let compact: String = rust_type.chars().filter(|c| !c.is_whitespace()).collect();
        let inner = compact
            .strip_prefix("Option<")
            .and_then(|s| s.strip_suffix('>'))
            .unwrap_or(&compact);
        let base = inner.split('<').next().unwrap_or(inner);
        let last = base.rsplit("::").next().unwrap_or(base);
        Some(match last {
            "bool" => Self::Bool,
            "i8" => Self::I8,
            "i16" => Self::I16,
            "i32" => Self::I32,
            "i64" => Self::I64,
            "u8" => Self::U8,
            "u16" => Self::U16,
            "u32" => Self::U32,
            "u64" => Self::U64,
            "f32" => Self::F32,
            "f64" => Self::F64,
            "Decimal" => Self::Decimal,
            "String" | "str" => Self::String,
            "Vec" if inner.contains("u8") => Self::Bytes,
            "Uuid" => Self::Uuid,
            "DateTime" | "NaiveDateTime" => Self::DateTime,
            "NaiveDate" => Self::Date,
            "NaiveTime" => Self::Time,
            _ => return None,
        })
    }

    /// The host type a bare value naturally belongs to.
    #[must_use]
    pub const fn of_value(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Bool(_) => Self::Bool,
            Value::Int(_) => Self::I64,
            Value::Float(_) => Self::F64,
            Value::Decimal(_) => Self::Decimal,
            Value::Text(_) => Self::String,
            Value::Blob(_) => Self::Bytes,
            Value::Uuid(_) => Self::Uuid,
            Value::DateTime(_) => Self::DateTime,
            Value::Date(_) => Self::Date,
            Value::Time(_) => Self::Time,
            Value::Null | Value::List(_) => return None,
        })
    }

    /// Converts a raw value returned by a driver into this host type's
    /// natural variant. Values that do not convert are returned unchanged.
    #[must_use]
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (Self::Bool, Value::Int(i)) => Value::Bool(i != 0),
            (Self::F32 | Self::F64, Value::Int(i)) => {
                #[allow(clippy::cast_precision_loss)]
                let f = i as f64;
                Value::Float(f)
            }
            (Self::Decimal, Value::Int(i)) => Value::Decimal(i.to_string()),
            (Self::Decimal, Value::Float(f)) => Value::Decimal(f.to_string()),
            (Self::Uuid, Value::Text(s)) => match uuid::Uuid::parse_str(&s) {
                Ok(u) => Value::Uuid(u),
                Err(_) => Value::Text(s),
            },
            (Self::Uuid, Value::Blob(b)) => match uuid::Uuid::from_slice(&b) {
                Ok(u) => Value::Uuid(u),
                Err(_) => Value::Blob(b),
            },
            (Self::DateTime, Value::Text(s)) => {
                parse_datetime(&s).map_or(Value::Text(s), Value::DateTime)
            }
            (Self::Date, Value::Text(s)) => chrono::NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_or(Value::Text(s), Value::Date),
            (Self::Time, Value::Text(s)) => chrono::NaiveTime::parse_from_str(&s, "%H:%M:%S%.f")
                .map_or(Value::Text(s), Value::Time),
            (_, other) => other,
        }
    }
}

bitflags! {
    /// Shape of a storage type's size arguments.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct TypeFlags: u8 {
        /// Accepts an unlimited size (`nvarchar(max)`, `text`).
        const UNLIMITED = 1;
        /// Takes a size argument.
        const HAS_SIZE = 1 << 1;
        /// Takes precision and scale arguments.
        const HAS_PRECISION_SCALE = 1 << 2;
    }
}

/// How binary values are written as literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryStyle {
    /// `X'0AFF'`
    HexQuoted,
    /// `'\x0aff'::bytea`
    Bytea,
    /// `0x0AFF`
    HexPrefixed,
}

/// How values of a storage type are written as literals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiteralKind {
    /// Integer digits.
    Integer,
    /// Floating point, always with a fraction or exponent.
    Real,
    /// Exact decimal digits.
    Decimal,
    /// `TRUE` / `FALSE`
    BoolKeyword,
    /// `1` / `0`
    BoolNumeric,
    /// Quoted string; `national` adds the `N` prefix.
    String {
        /// Emit `N'...'`.
        national: bool,
    },
    /// Binary data.
    Binary(BinaryStyle),
    /// GUID as a quoted string.
    Guid,
    /// Quoted `YYYY-MM-DD HH:MM:SS.ffffff`.
    DateTime,
    /// Quoted `YYYY-MM-DD`.
    Date,
    /// Quoted `HH:MM:SS.ffffff`.
    Time,
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Decimal => "decimal",
            Self::BoolKeyword | Self::BoolNumeric => "boolean",
            Self::String { .. } => "string",
            Self::Binary(_) => "binary",
            Self::Guid => "guid",
            Self::DateTime => "datetime",
            Self::Date => "date",
            Self::Time => "time",
        };
        f.write_str(name)
    }
}

/// A vendor storage type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbTypeDef {
    /// Canonical name, as reported by the vendor's catalog.
    pub name: &'static str,
    /// Other spellings the catalog may report.
    pub aliases: &'static [&'static str],
    /// Size argument shape.
    pub flags: TypeFlags,
    /// Literal rendering.
    pub literal: LiteralKind,
    /// Literal used to back-fill existing rows when a non-null column is
    /// added without an explicit default.
    pub default_init: &'static str,
}

impl DbTypeDef {
    /// Whether `name` names this type (case-insensitive, aliases included).
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// A storage type with concrete size arguments, as used by a column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DbTypeInfo {
    /// Storage type name.
    pub type_name: String,
    /// Size, for sized types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    /// Unlimited size (`max`).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unlimited: bool,
    /// Precision, for decimal types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u8>,
    /// Scale, for decimal types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u8>,
}

impl DbTypeInfo {
    /// A type without size arguments.
    #[must_use]
    pub fn simple(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            size: None,
            unlimited: false,
            precision: None,
            scale: None,
        }
    }

    /// A sized type.
    #[must_use]
    pub fn sized(type_name: impl Into<String>, size: u32) -> Self {
        Self {
            size: Some(size),
            ..Self::simple(type_name)
        }
    }

    /// Parses a catalog type string such as `NUMERIC(18, 2)` or
    /// `nvarchar(max)`.
    #[must_use]
    pub fn parse(spec: &str) -> Self {
        let spec = spec.trim();
        let Some(open) = spec.find('(') else {
            return Self::simple(spec);
        };
        let name = spec[..open].trim();
        let args: Vec<&str> = spec[open + 1..]
            .trim_end_matches(')')
            .split(',')
            .map(str::trim)
            .collect();
        match args.as_slice() {
            [one] if one.eq_ignore_ascii_case("max") => Self {
                unlimited: true,
                ..Self::simple(name)
            },
            [one] => Self {
                size: one.parse().ok(),
                ..Self::simple(name)
            },
            [p, s] => Self {
                precision: p.parse().ok(),
                scale: s.parse().ok(),
                ..Self::simple(name)
            },
            _ => Self::simple(spec),
        }
    }

    /// Whether two infos describe the same storage (names compare
    /// case-insensitively).
    #[must_use]
    pub fn same_as(&self, other: &Self) -> bool {
        self.type_name.eq_ignore_ascii_case(&other.type_name)
            && self.size == other.size
            && self.unlimited == other.unlimited
            && self.precision == other.precision
            && self.scale == other.scale
    }
}

/// Renders the type as DDL (`varchar(200)`, `numeric(18,2)`,
/// `nvarchar(max)`).
impl fmt::Display for DbTypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.type_name)?;
        if self.unlimited {
            f.write_str("(max)")
        } else if let Some(size) = self.size {
            write!(f, "({size})")
        } else {
            match (self.precision, self.scale) {
                (Some(p), Some(s)) => write!(f, "({p},{s})"),
                (Some(p), None) => write!(f, "({p})"),
                _ => Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_rust_type() {
        assert_eq!(HostType::from_rust_type("i64"), Some(HostType::I64));
        assert_eq!(HostType::from_rust_type("Option<String>"), Some(HostType::String));
        assert_eq!(
            HostType::from_rust_type("chrono::DateTime<chrono::Utc>"),
            Some(HostType::DateTime)
        );
        assert_eq!(HostType::from_rust_type("Vec<u8>"), Some(HostType::Bytes));
        assert_eq!(HostType::from_rust_type("Vec<String>"), None);
    }

    #[test]
    fn test_parse_type_spec() {
        assert_eq!(DbTypeInfo::parse("varchar(200)"), DbTypeInfo::sized("varchar", 200));
        assert_eq!(
            DbTypeInfo::parse("NUMERIC(18, 2)").to_string(),
            "NUMERIC(18,2)"
        );
        assert!(DbTypeInfo::parse("nvarchar(max)").unlimited);
        assert_eq!(DbTypeInfo::parse("INTEGER"), DbTypeInfo::simple("INTEGER"));
    }

    #[test]
    fn test_coerce_driver_values() {
        assert_eq!(HostType::Bool.coerce(Value::Int(1)), Value::Bool(true));
        let coerced = HostType::Date.coerce(Value::Text(String::from("2024-02-29")));
        assert!(matches!(coerced, Value::Date(_)));
        assert_eq!(HostType::I64.coerce(Value::Null), Value::Null);
    }
}
