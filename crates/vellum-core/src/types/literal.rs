//! Literal rendering.

use std::fmt::Write;

use chrono::{DateTime, NaiveDateTime, Utc};

use crate::error::SqlError;
use crate::value::Value;

use super::{BinaryStyle, LiteralKind};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIME_FORMAT: &str = "%H:%M:%S%.6f";

/// Renders `value` as a SQL literal of the given kind.
///
/// `NULL` renders as `NULL` for every kind; lists render as a parenthesized,
/// comma-separated list of their elements.
///
/// # Errors
///
/// Returns [`SqlError::Literal`] when the value cannot be expressed in the
/// kind (text in an integer column, a non-finite float, ...).
pub fn render_literal(kind: LiteralKind, value: &Value) -> Result<String, SqlError> {
    let mismatch = || SqlError::Literal {
        value: format!("{value:?}"),
        kind: kind.to_string(),
    };

    if let Value::List(items) = value {
        let rendered = items
            .iter()
            .map(|item| render_literal(kind, item))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(format!("({})", rendered.join(", ")));
    }
    if value.is_null() {
        return Ok(String::from("NULL"));
    }

    match kind {
        LiteralKind::Integer => match value {
            Value::Int(i) => Ok(i.to_string()),
            Value::Bool(b) => Ok(String::from(if *b { "1" } else { "0" })),
            Value::Decimal(d) if is_integer_text(d) => Ok(d.clone()),
            _ => Err(mismatch()),
        },
        LiteralKind::Real => match value {
            Value::Float(f) if f.is_finite() => Ok(format!("{f:?}")),
            Value::Int(i) => Ok(format!("{i}.0")),
            Value::Decimal(d) if is_decimal_text(d) => Ok(d.clone()),
            _ => Err(mismatch()),
        },
        LiteralKind::Decimal => match value {
            Value::Decimal(d) if is_decimal_text(d) => Ok(d.clone()),
            Value::Int(i) => Ok(i.to_string()),
            Value::Float(f) if f.is_finite() => Ok(format!("{f:?}")),
            _ => Err(mismatch()),
        },
        LiteralKind::BoolKeyword => match value.as_bool() {
            Some(true) => Ok(String::from("TRUE")),
            Some(false) => Ok(String::from("FALSE")),
            None => Err(mismatch()),
        },
        LiteralKind::BoolNumeric => match value.as_bool() {
            Some(true) => Ok(String::from("1")),
            Some(false) => Ok(String::from("0")),
            None => Err(mismatch()),
        },
        LiteralKind::String { national } => match value {
            Value::Text(s) => Ok(quote_string(s, national)),
            Value::Uuid(u) => Ok(quote_string(&u.to_string(), national)),
            _ => Err(mismatch()),
        },
        LiteralKind::Binary(style) => match value {
            Value::Blob(bytes) => Ok(render_binary(style, bytes)),
            _ => Err(mismatch()),
        },
        LiteralKind::Guid => match value {
            Value::Uuid(u) => Ok(format!("'{u}'")),
            Value::Text(s) if uuid::Uuid::parse_str(s).is_ok() => Ok(format!("'{s}'")),
            _ => Err(mismatch()),
        },
        LiteralKind::DateTime => match value {
            Value::DateTime(dt) => Ok(format!("'{}'", dt.format(DATETIME_FORMAT))),
            Value::Text(s) => Ok(quote_string(s, false)),
            _ => Err(mismatch()),
        },
        LiteralKind::Date => match value {
            Value::Date(d) => Ok(format!("'{}'", d.format("%Y-%m-%d"))),
            Value::Text(s) => Ok(quote_string(s, false)),
            _ => Err(mismatch()),
        },
        LiteralKind::Time => match value {
            Value::Time(t) => Ok(format!("'{}'", t.format(TIME_FORMAT))),
            Value::Text(s) => Ok(quote_string(s, false)),
            _ => Err(mismatch()),
        },
    }
}

/// Parses a timestamp in the forms drivers and literals produce.
#[must_use]
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f%:z"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn quote_string(s: &str, national: bool) -> String {
    let escaped = s.replace('\'', "''");
    if national {
        format!("N'{escaped}'")
    } else {
        format!("'{escaped}'")
    }
}

fn render_binary(style: BinaryStyle, bytes: &[u8]) -> String {
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(hex, "{byte:02X}");
    }
    match style {
        BinaryStyle::HexQuoted => format!("X'{hex}'"),
        BinaryStyle::Bytea => format!("'\\x{}'::bytea", hex.to_ascii_lowercase()),
        BinaryStyle::HexPrefixed => format!("0x{hex}"),
    }
}

fn is_integer_text(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

fn is_decimal_text(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);
    let mut parts = body.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let frac = parts.next().unwrap_or("0");
    !whole.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && !frac.is_empty()
        && frac.bytes().all(|b| b.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_string_escaping() {
        let v = Value::Text(String::from("O'Reilly"));
        assert_eq!(
            render_literal(LiteralKind::String { national: false }, &v).unwrap(),
            "'O''Reilly'"
        );
        assert_eq!(
            render_literal(LiteralKind::String { national: true }, &v).unwrap(),
            "N'O''Reilly'"
        );
    }

    #[test]
    fn test_float_keeps_fraction() {
        assert_eq!(render_literal(LiteralKind::Real, &Value::Float(1.0)).unwrap(), "1.0");
        assert!(render_literal(LiteralKind::Real, &Value::Float(f64::NAN)).is_err());
    }

    #[test]
    fn test_binary_styles() {
        let v = Value::Blob(vec![0x0a, 0xff]);
        assert_eq!(
            render_literal(LiteralKind::Binary(BinaryStyle::HexQuoted), &v).unwrap(),
            "X'0AFF'"
        );
        assert_eq!(
            render_literal(LiteralKind::Binary(BinaryStyle::Bytea), &v).unwrap(),
            "'\\x0aff'::bytea"
        );
        assert_eq!(
            render_literal(LiteralKind::Binary(BinaryStyle::HexPrefixed), &v).unwrap(),
            "0x0AFF"
        );
    }

    #[test]
    fn test_datetime_roundtrip_through_text() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        let literal = render_literal(LiteralKind::DateTime, &Value::DateTime(dt)).unwrap();
        assert_eq!(literal, "'2024-03-01 12:30:05.000000'");
        assert_eq!(parse_datetime(literal.trim_matches('\'')), Some(dt));
    }

    #[test]
    fn test_mismatch_and_null() {
        assert!(render_literal(LiteralKind::Integer, &Value::Text(String::from("1"))).is_err());
        assert_eq!(render_literal(LiteralKind::Integer, &Value::Null).unwrap(), "NULL");
        assert_eq!(
            render_literal(
                LiteralKind::Integer,
                &Value::List(vec![Value::Int(1), Value::Int(2)])
            )
            .unwrap(),
            "(1, 2)"
        );
        assert!(render_literal(LiteralKind::Decimal, &Value::Decimal(String::from("1e5"))).is_err());
    }
}
