//! Runtime values for query parameters and result rows.

use std::fmt;

use rust_decimal::Decimal;
use tokio_postgres::types::{FromSql, Kind, Type as PgTypeInfo};

/// A runtime SQL value.
///
/// Used for row predicates, query parameters and result rows. Maps to Postgres types.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// NULL
    Null,

    /// Boolean
    Bool(bool),

    /// 16-bit signed integer (SMALLINT)
    I16(i16),

    /// 32-bit signed integer (INTEGER)
    I32(i32),

    /// 64-bit signed integer (BIGINT, and OID widened)
    I64(i64),

    /// 32-bit float (REAL)
    F32(f32),

    /// 64-bit float (DOUBLE PRECISION)
    F64(f64),

    /// Decimal (NUMERIC)
    Decimal(Decimal),

    /// Text (TEXT, VARCHAR, NAME, enums etc.)
    String(String),

    /// Binary data (BYTEA)
    Bytes(Vec<u8>),

    /// JSON/JSONB data (stored as JSON string for dynamic use)
    Json(String),

    /// A column whose type has no dedicated variant; holds the type name.
    Unsupported(String),
}

impl Value {
    /// Returns true if this is a NULL value.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Postgres text representation, as accepted by the type's input function.
    ///
    /// `None` for NULL and for [`Value::Unsupported`].
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null | Value::Unsupported(_) => None,
            Value::Bool(v) => Some(if *v { "true" } else { "false" }.to_string()),
            Value::I16(v) => Some(v.to_string()),
            Value::I32(v) => Some(v.to_string()),
            Value::I64(v) => Some(v.to_string()),
            Value::F32(v) => Some(v.to_string()),
            Value::F64(v) => Some(v.to_string()),
            Value::Decimal(v) => Some(v.to_string()),
            Value::String(v) | Value::Json(v) => Some(v.clone()),
            Value::Bytes(v) => {
                let mut hex = String::with_capacity(2 + v.len() * 2);
                hex.push_str("\\x");
                for b in v {
                    hex.push_str(&format!("{:02x}", b));
                }
                Some(hex)
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Unsupported(ty) => write!(f, "<{}>", ty),
            other => write!(f, "{}", other.to_text().unwrap_or_default()),
        }
    }
}

impl<'a> FromSql<'a> for Value {
    fn from_sql(
        ty: &PgTypeInfo,
        raw: &'a [u8],
    ) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        let value = match *ty {
            PgTypeInfo::BOOL => Value::Bool(bool::from_sql(ty, raw)?),
            PgTypeInfo::INT2 => Value::I16(i16::from_sql(ty, raw)?),
            PgTypeInfo::INT4 => Value::I32(i32::from_sql(ty, raw)?),
            PgTypeInfo::INT8 => Value::I64(i64::from_sql(ty, raw)?),
            PgTypeInfo::OID => Value::I64(i64::from(u32::from_sql(ty, raw)?)),
            PgTypeInfo::FLOAT4 => Value::F32(f32::from_sql(ty, raw)?),
            PgTypeInfo::FLOAT8 => Value::F64(f64::from_sql(ty, raw)?),
            PgTypeInfo::NUMERIC => Value::Decimal(Decimal::from_sql(ty, raw)?),
            PgTypeInfo::BYTEA => Value::Bytes(raw.to_vec()),
            PgTypeInfo::JSON => Value::Json(std::str::from_utf8(raw)?.to_string()),
            PgTypeInfo::JSONB => {
                // JSONB wire format has a 1-byte version prefix, skip it
                let json_bytes = if raw.first() == Some(&1) {
                    &raw[1..]
                } else {
                    raw
                };
                Value::Json(std::str::from_utf8(json_bytes)?.to_string())
            }
            PgTypeInfo::TEXT
            | PgTypeInfo::VARCHAR
            | PgTypeInfo::BPCHAR
            | PgTypeInfo::NAME
            | PgTypeInfo::UNKNOWN => Value::String(std::str::from_utf8(raw)?.to_string()),
            _ if matches!(ty.kind(), Kind::Enum(_)) => {
                Value::String(std::str::from_utf8(raw)?.to_string())
            }
            _ => Value::Unsupported(ty.name().to_string()),
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &PgTypeInfo) -> Result<Self, Box<dyn std::error::Error + Sync + Send>> {
        Ok(Value::Null)
    }

    fn accepts(_ty: &PgTypeInfo) -> bool {
        true
    }
}

// Convenient From impls
impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::I16(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::I32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::F32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_forms() {
        assert_eq!(Value::from(true).to_text().as_deref(), Some("true"));
        assert_eq!(Value::from(42i32).to_text().as_deref(), Some("42"));
        assert_eq!(Value::from("prod").to_text().as_deref(), Some("prod"));
        assert_eq!(
            Value::from(vec![0xde_u8, 0xad]).to_text().as_deref(),
            Some("\\xdead")
        );
        assert_eq!(Value::Null.to_text(), None);
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Unsupported("tsvector".into()).to_string(), "<tsvector>");
        assert_eq!(Value::from(1.5f64).to_string(), "1.5");
    }

    #[test]
    fn test_decode_by_type() {
        let v = Value::from_sql(&PgTypeInfo::TEXT, b"hello").unwrap();
        assert_eq!(v, Value::String("hello".into()));

        let v = Value::from_sql(&PgTypeInfo::INT4, &7i32.to_be_bytes()).unwrap();
        assert_eq!(v, Value::I32(7));

        let v = Value::from_sql(&PgTypeInfo::OID, &16384u32.to_be_bytes()).unwrap();
        assert_eq!(v, Value::I64(16384));

        let v = Value::from_sql(&PgTypeInfo::JSONB, b"\x01{\"a\":1}").unwrap();
        assert_eq!(v, Value::Json("{\"a\":1}".into()));

        let v = Value::from_sql(&PgTypeInfo::POINT, &[0u8; 16]).unwrap();
        assert_eq!(v, Value::Unsupported("point".into()));

        assert_eq!(Value::from_sql_null(&PgTypeInfo::INT4).unwrap(), Value::Null);
    }
}
