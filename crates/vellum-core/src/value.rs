//! Runtime values exchanged with the database.
//!
//! Values are bound as parameters whenever possible. Literal rendering lives in
//! the type registry because it depends on the target column's storage type.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A value that can be sent to or read from the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Float value.
    Float(f64),
    /// Exact decimal, kept as its textual representation.
    Decimal(String),
    /// Text value.
    Text(String),
    /// Binary blob value.
    Blob(Vec<u8>),
    /// GUID value.
    Uuid(Uuid),
    /// Timestamp, always UTC.
    DateTime(DateTime<Utc>),
    /// Calendar date.
    Date(NaiveDate),
    /// Time of day.
    Time(NaiveTime),
    /// A list of values, used by `IN` predicates.
    List(Vec<Value>),
}

impl Value {
    /// Returns true for `Value::Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the text content, if this is a text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer content, widening booleans.
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    /// Returns the boolean content, accepting 0/1 integers.
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(0) => Some(false),
            Self::Int(1) => Some(true),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Blob(_) => "blob",
            Self::Uuid(_) => "uuid",
            Self::DateTime(_) => "datetime",
            Self::Date(_) => "date",
            Self::Time(_) => "time",
            Self::List(_) => "list",
        }
    }
}

/// Human-readable rendering used in command descriptions and error messages.
/// This is not SQL; use the type registry for literals.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Decimal(d) => write!(f, "{d}m"),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Self::Uuid(u) => write!(f, "{{{u}}}"),
            Self::DateTime(dt) => write!(f, "#{}#", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            Self::Date(d) => write!(f, "#{d}#"),
            Self::Time(t) => write!(f, "#{t}#"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Trait for types that can be converted to values.
pub trait ToSqlValue {
    /// Converts the value to a `Value`.
    fn to_sql_value(self) -> Value;
}

impl ToSqlValue for Value {
    fn to_sql_value(self) -> Value {
        self
    }
}

macro_rules! impl_to_sql_value {
    ($($ty:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl ToSqlValue for $ty {
                fn to_sql_value(self) -> Value {
                    let $v = self;
                    $body
                }
            }
        )*
    };
}

impl_to_sql_value! {
    bool => |v| Value::Bool(v),
    i8 => |v| Value::Int(i64::from(v)),
    i16 => |v| Value::Int(i64::from(v)),
    i32 => |v| Value::Int(i64::from(v)),
    i64 => |v| Value::Int(v),
    u8 => |v| Value::Int(i64::from(v)),
    u16 => |v| Value::Int(i64::from(v)),
    u32 => |v| Value::Int(i64::from(v)),
    u64 => |v| i64::try_from(v).map_or_else(|_| Value::Decimal(v.to_string()), Value::Int),
    f32 => |v| Value::Float(f64::from(v)),
    f64 => |v| Value::Float(v),
    String => |v| Value::Text(v),
    &str => |v| Value::Text(String::from(v)),
    Vec<u8> => |v| Value::Blob(v),
    &[u8] => |v| Value::Blob(v.to_vec()),
    Uuid => |v| Value::Uuid(v),
    DateTime<Utc> => |v| Value::DateTime(v),
    NaiveDate => |v| Value::Date(v),
    NaiveTime => |v| Value::Time(v),
}

impl<T: ToSqlValue> ToSqlValue for Option<T> {
    fn to_sql_value(self) -> Value {
        match self {
            Some(v) => v.to_sql_value(),
            None => Value::Null,
        }
    }
}

/// Trait for types that can be read back from values.
pub trait FromSqlValue: Sized {
    /// Converts a value, returning `None` when the variant does not fit.
    fn from_sql_value(value: &Value) -> Option<Self>;
}

impl FromSqlValue for Value {
    fn from_sql_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromSqlValue for bool {
    fn from_sql_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromSqlValue for i64 {
    fn from_sql_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl FromSqlValue for i32 {
    fn from_sql_value(value: &Value) -> Option<Self> {
        value.as_i64().and_then(|i| Self::try_from(i).ok())
    }
}

impl FromSqlValue for u64 {
    fn from_sql_value(value: &Value) -> Option<Self> {
        match value {
            Value::Decimal(d) => d.parse().ok(),
            other => other.as_i64().and_then(|i| Self::try_from(i).ok()),
        }
    }
}

impl FromSqlValue for f64 {
    fn from_sql_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(x) => Some(*x),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Some(*i as Self),
            Value::Decimal(d) => d.parse().ok(),
            _ => None,
        }
    }
}

impl FromSqlValue for String {
    fn from_sql_value(value: &Value) -> Option<Self> {
        value.as_str().map(String::from)
    }
}

impl FromSqlValue for Vec<u8> {
    fn from_sql_value(value: &Value) -> Option<Self> {
        match value {
            Value::Blob(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl FromSqlValue for Uuid {
    fn from_sql_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uuid(u) => Some(*u),
            Value::Text(s) => Self::parse_str(s).ok(),
            Value::Blob(b) => Self::from_slice(b).ok(),
            _ => None,
        }
    }
}

impl FromSqlValue for DateTime<Utc> {
    fn from_sql_value(value: &Value) -> Option<Self> {
        match value {
            Value::DateTime(dt) => Some(*dt),
            Value::Text(s) => crate::types::parse_datetime(s),
            _ => None,
        }
    }
}

impl FromSqlValue for NaiveDate {
    fn from_sql_value(value: &Value) -> Option<Self> {
        match value {
            Value::Date(d) => Some(*d),
            Value::Text(s) => Self::parse_from_str(s, "%Y-%m-%d").ok(),
            _ => None,
        }
    }
}

impl FromSqlValue for NaiveTime {
    fn from_sql_value(value: &Value) -> Option<Self> {
        match value {
            Value::Time(t) => Some(*t),
            Value::Text(s) => Self::parse_from_str(s, "%H:%M:%S%.f").ok(),
            _ => None,
        }
    }
}

impl<T: FromSqlValue> FromSqlValue for Option<T> {
    fn from_sql_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            Some(None)
        } else {
            T::from_sql_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_conversion() {
        assert_eq!(Some(5_i32).to_sql_value(), Value::Int(5));
        assert_eq!(None::<i32>.to_sql_value(), Value::Null);
    }

    #[test]
    fn test_u64_overflow_becomes_decimal() {
        assert_eq!(
            u64::MAX.to_sql_value(),
            Value::Decimal(String::from("18446744073709551615"))
        );
        assert_eq!(
            u64::from_sql_value(&Value::Decimal(String::from("18446744073709551615"))),
            Some(u64::MAX)
        );
    }

    #[test]
    fn test_bool_from_integer() {
        assert_eq!(bool::from_sql_value(&Value::Int(1)), Some(true));
        assert_eq!(bool::from_sql_value(&Value::Int(7)), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Text(String::from("c#")).to_string(), "'c#'");
        assert_eq!(
            Value::List(vec![Value::Int(1), Value::Int(2)]).to_string(),
            "[1, 2]"
        );
    }
}
