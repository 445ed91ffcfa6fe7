//! SQL value representation.
//!
//! [`SqlValue`] is both the positional parameter type and the cell type of
//! returned rows. It binds through the driver's binary protocol; values are
//! coerced to the parameter type the server inferred for the prepared
//! statement, so `SqlValue::from(1)` works for `SMALLINT`, `INTEGER` and
//! `BIGINT` columns alike.

use std::error::Error as StdError;

use bytes::{Bytes, BytesMut};
use postgres_types::{FromSql, IsNull, ToSql, Type};

use crate::error::Error;
use crate::numeric;

type DriverError = Box<dyn StdError + Sync + Send>;

/// A PostgreSQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// NULL value.
    Null,
    /// Boolean value (BOOL).
    Bool(bool),
    /// 16-bit signed integer (INT2).
    SmallInt(i16),
    /// 32-bit signed integer (INT4).
    Int(i32),
    /// 64-bit signed integer (INT8).
    BigInt(i64),
    /// 32-bit floating point (FLOAT4).
    Float(f32),
    /// 64-bit floating point (FLOAT8).
    Double(f64),
    /// Exact decimal in text form (NUMERIC).
    Numeric(String),
    /// String value (TEXT, VARCHAR, BPCHAR, NAME and unknown text types).
    String(String),
    /// Binary value (BYTEA).
    Binary(Bytes),
    /// UUID value (UUID).
    #[cfg(feature = "uuid")]
    Uuid(uuid::Uuid),
    /// Date value (DATE).
    #[cfg(feature = "chrono")]
    Date(chrono::NaiveDate),
    /// Time value (TIME).
    #[cfg(feature = "chrono")]
    Time(chrono::NaiveTime),
    /// Timestamp without time zone (TIMESTAMP).
    #[cfg(feature = "chrono")]
    DateTime(chrono::NaiveDateTime),
    /// Timestamp with time zone (TIMESTAMPTZ).
    #[cfg(feature = "chrono")]
    DateTimeTz(chrono::DateTime<chrono::Utc>),
    /// JSON value (JSON, JSONB).
    #[cfg(feature = "json")]
    Json(serde_json::Value),
}

impl SqlValue {
    /// Check if the value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the value as a bool, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get the value as an i64, if it is an integer.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::BigInt(v) => Some(*v),
            Self::Int(v) => Some(i64::from(*v)),
            Self::SmallInt(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as an f64, if it is a float.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Float(v) => Some(f64::from(*v)),
            _ => None,
        }
    }

    /// Get the value as a string slice, if it is textual.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Get the value as bytes, if it is binary.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Binary(v) => Some(v),
            _ => None,
        }
    }

    /// Get the PostgreSQL type name as a string.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "BOOL",
            Self::SmallInt(_) => "INT2",
            Self::Int(_) => "INT4",
            Self::BigInt(_) => "INT8",
            Self::Float(_) => "FLOAT4",
            Self::Double(_) => "FLOAT8",
            Self::Numeric(_) => "NUMERIC",
            Self::String(_) => "TEXT",
            Self::Binary(_) => "BYTEA",
            #[cfg(feature = "uuid")]
            Self::Uuid(_) => "UUID",
            #[cfg(feature = "chrono")]
            Self::Date(_) => "DATE",
            #[cfg(feature = "chrono")]
            Self::Time(_) => "TIME",
            #[cfg(feature = "chrono")]
            Self::DateTime(_) => "TIMESTAMP",
            #[cfg(feature = "chrono")]
            Self::DateTimeTz(_) => "TIMESTAMPTZ",
            #[cfg(feature = "json")]
            Self::Json(_) => "JSONB",
        }
    }
}

impl Default for SqlValue {
    fn default() -> Self {
        Self::Null
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for SqlValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from! {
    bool => Bool,
    i16 => SmallInt,
    i32 => Int,
    i64 => BigInt,
    f32 => Float,
    f64 => Double,
    String => String,
    Bytes => Binary,
}

#[cfg(feature = "uuid")]
impl_from! { uuid::Uuid => Uuid }

#[cfg(feature = "chrono")]
impl_from! {
    chrono::NaiveDate => Date,
    chrono::NaiveTime => Time,
    chrono::NaiveDateTime => DateTime,
    chrono::DateTime<chrono::Utc> => DateTimeTz,
}

#[cfg(feature = "json")]
impl_from! { serde_json::Value => Json }

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Binary(Bytes::from(v))
    }
}

impl From<&[u8]> for SqlValue {
    fn from(v: &[u8]) -> Self {
        Self::Binary(Bytes::copy_from_slice(v))
    }
}

impl<T> From<Option<T>> for SqlValue
where
    T: Into<SqlValue>,
{
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Trait for types that can be extracted from a [`SqlValue`].
pub trait FromValue: Sized {
    /// Convert from a SQL value to this type.
    fn from_value(value: &SqlValue) -> Result<Self, Error>;
}

fn mismatch(expected: &str, value: &SqlValue) -> Error {
    if value.is_null() {
        Error::Type(format!("unexpected NULL, expected {expected}"))
    } else {
        Error::Type(format!(
            "type mismatch: expected {expected}, found {}",
            value.type_name()
        ))
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &SqlValue) -> Result<Self, Error> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

impl FromValue for SqlValue {
    fn from_value(value: &SqlValue) -> Result<Self, Error> {
        Ok(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &SqlValue) -> Result<Self, Error> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &SqlValue) -> Result<Self, Error> {
                    let wide = value
                        .as_i64()
                        .ok_or_else(|| mismatch(stringify!($ty), value))?;
                    <$ty>::try_from(wide).map_err(|_| {
                        Error::Type(format!("value {wide} out of range for {}", stringify!($ty)))
                    })
                }
            }
        )*
    };
}

impl_from_value_int!(i16, i32, i64);

impl FromValue for f64 {
    fn from_value(value: &SqlValue) -> Result<Self, Error> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl FromValue for f32 {
    fn from_value(value: &SqlValue) -> Result<Self, Error> {
        match value {
            SqlValue::Float(v) => Ok(*v),
            _ => Err(mismatch("f32", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &SqlValue) -> Result<Self, Error> {
        value
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| mismatch("String", value))
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &SqlValue) -> Result<Self, Error> {
        value
            .as_bytes()
            .map(<[u8]>::to_vec)
            .ok_or_else(|| mismatch("Vec<u8>", value))
    }
}

impl FromValue for Bytes {
    fn from_value(value: &SqlValue) -> Result<Self, Error> {
        match value {
            SqlValue::Binary(v) => Ok(v.clone()),
            _ => Err(mismatch("Bytes", value)),
        }
    }
}

macro_rules! impl_from_value_variant {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                fn from_value(value: &SqlValue) -> Result<Self, Error> {
                    match value {
                        SqlValue::$variant(v) => Ok(v.clone()),
                        _ => Err(mismatch(stringify!($ty), value)),
                    }
                }
            }
        )*
    };
}

#[cfg(feature = "uuid")]
impl_from_value_variant! { uuid::Uuid => Uuid }

#[cfg(feature = "chrono")]
impl_from_value_variant! {
    chrono::NaiveDate => Date,
    chrono::NaiveTime => Time,
    chrono::NaiveDateTime => DateTime,
    chrono::DateTime<chrono::Utc> => DateTimeTz,
}

#[cfg(feature = "json")]
impl_from_value_variant! { serde_json::Value => Json }

impl ToSql for SqlValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, DriverError> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(v) => v.to_sql_checked(ty, out),
            Self::SmallInt(v) => int_to_sql(i64::from(*v), ty, out),
            Self::Int(v) => int_to_sql(i64::from(*v), ty, out),
            Self::BigInt(v) => int_to_sql(*v, ty, out),
            Self::Float(v) => match *ty {
                Type::FLOAT8 => f64::from(*v).to_sql(ty, out),
                Type::NUMERIC => numeric_to_sql(&v.to_string(), out),
                _ => v.to_sql_checked(ty, out),
            },
            Self::Double(v) => match *ty {
                #[allow(clippy::cast_possible_truncation)]
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::NUMERIC => numeric_to_sql(&v.to_string(), out),
                _ => v.to_sql_checked(ty, out),
            },
            Self::Numeric(v) => match *ty {
                Type::NUMERIC => numeric_to_sql(v, out),
                _ => text_to_sql(v, ty, out),
            },
            Self::String(v) => text_to_sql(v, ty, out),
            Self::Binary(v) => <&[u8] as ToSql>::to_sql_checked(&&v[..], ty, out),
            #[cfg(feature = "uuid")]
            Self::Uuid(v) => v.to_sql_checked(ty, out),
            #[cfg(feature = "chrono")]
            Self::Date(v) => v.to_sql_checked(ty, out),
            #[cfg(feature = "chrono")]
            Self::Time(v) => v.to_sql_checked(ty, out),
            #[cfg(feature = "chrono")]
            Self::DateTime(v) => v.to_sql_checked(ty, out),
            #[cfg(feature = "chrono")]
            Self::DateTimeTz(v) => v.to_sql_checked(ty, out),
            #[cfg(feature = "json")]
            Self::Json(v) => v.to_sql_checked(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

// Pick the integer width the server expects for this parameter.
fn int_to_sql(v: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, DriverError> {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        #[allow(clippy::cast_precision_loss)]
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        #[allow(clippy::cast_precision_loss)]
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::NUMERIC => numeric_to_sql(&v.to_string(), out),
        Type::OID => u32::try_from(v)?.to_sql(ty, out),
        _ => v.to_sql_checked(ty, out),
    }
}

fn numeric_to_sql(text: &str, out: &mut BytesMut) -> Result<IsNull, DriverError> {
    numeric::encode(text, out)?;
    Ok(IsNull::No)
}

// Text parameters bound to typed placeholders are parsed into that type,
// the way the server would cast an untyped literal.
fn text_to_sql(v: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, DriverError> {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => int_to_sql(v.trim().parse()?, ty, out),
        Type::FLOAT4 => v.trim().parse::<f32>()?.to_sql(ty, out),
        Type::FLOAT8 => v.trim().parse::<f64>()?.to_sql(ty, out),
        Type::NUMERIC => numeric_to_sql(v, out),
        Type::BOOL => parse_bool(v)?.to_sql(ty, out),
        #[cfg(feature = "uuid")]
        Type::UUID => uuid::Uuid::parse_str(v.trim())?.to_sql(ty, out),
        #[cfg(feature = "json")]
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(v)?.to_sql(ty, out),
        #[cfg(feature = "chrono")]
        Type::DATE => chrono::NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d")?.to_sql(ty, out),
        #[cfg(feature = "chrono")]
        Type::TIME => chrono::NaiveTime::parse_from_str(v.trim(), "%H:%M:%S%.f")?.to_sql(ty, out),
        #[cfg(feature = "chrono")]
        Type::TIMESTAMP => {
            chrono::NaiveDateTime::parse_from_str(v.trim(), "%Y-%m-%d %H:%M:%S%.f")
                .or_else(|_| chrono::NaiveDateTime::parse_from_str(v.trim(), "%Y-%m-%dT%H:%M:%S%.f"))?
                .to_sql(ty, out)
        }
        #[cfg(feature = "chrono")]
        Type::TIMESTAMPTZ => chrono::DateTime::parse_from_rfc3339(v.trim())?
            .with_timezone(&chrono::Utc)
            .to_sql(ty, out),
        _ => <&str as ToSql>::to_sql_checked(&v, ty, out),
    }
}

fn parse_bool(v: &str) -> Result<bool, DriverError> {
    match v.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "y" | "yes" | "on" | "1" => Ok(true),
        "f" | "false" | "n" | "no" | "off" | "0" => Ok(false),
        other => Err(format!("invalid input syntax for type boolean: {other:?}").into()),
    }
}

impl<'a> FromSql<'a> for SqlValue {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, DriverError> {
        let value = match *ty {
            Type::BOOL => Self::Bool(bool::from_sql(ty, raw)?),
            Type::INT2 => Self::SmallInt(i16::from_sql(ty, raw)?),
            Type::INT4 => Self::Int(i32::from_sql(ty, raw)?),
            Type::INT8 => Self::BigInt(i64::from_sql(ty, raw)?),
            Type::OID => Self::BigInt(i64::from(u32::from_sql(ty, raw)?)),
            Type::FLOAT4 => Self::Float(f32::from_sql(ty, raw)?),
            Type::FLOAT8 => Self::Double(f64::from_sql(ty, raw)?),
            Type::NUMERIC => Self::Numeric(numeric::decode(raw)?),
            Type::BYTEA => Self::Binary(Bytes::from(Vec::<u8>::from_sql(ty, raw)?)),
            #[cfg(feature = "uuid")]
            Type::UUID => Self::Uuid(uuid::Uuid::from_sql(ty, raw)?),
            #[cfg(feature = "chrono")]
            Type::DATE => Self::Date(chrono::NaiveDate::from_sql(ty, raw)?),
            #[cfg(feature = "chrono")]
            Type::TIME => Self::Time(chrono::NaiveTime::from_sql(ty, raw)?),
            #[cfg(feature = "chrono")]
            Type::TIMESTAMP => Self::DateTime(chrono::NaiveDateTime::from_sql(ty, raw)?),
            #[cfg(feature = "chrono")]
            Type::TIMESTAMPTZ => {
                Self::DateTimeTz(chrono::DateTime::<chrono::Utc>::from_sql(ty, raw)?)
            }
            #[cfg(feature = "json")]
            Type::JSON | Type::JSONB => Self::Json(serde_json::Value::from_sql(ty, raw)?),
            // Text types, enums and domains over text arrive as UTF-8.
            _ => Self::String(String::from_utf8(raw.to_vec())?),
        };
        Ok(value)
    }

    fn from_sql_null(_ty: &Type) -> Result<Self, DriverError> {
        Ok(Self::Null)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode(value: &SqlValue, ty: &Type) -> Result<(IsNull, BytesMut), DriverError> {
        let mut out = BytesMut::new();
        let is_null = value.to_sql_checked(ty, &mut out)?;
        Ok((is_null, out))
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(SqlValue::from(true), SqlValue::Bool(true));
        assert_eq!(SqlValue::from(7i32), SqlValue::Int(7));
        assert_eq!(SqlValue::from("abc"), SqlValue::String("abc".into()));
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some(3i16)), SqlValue::SmallInt(3));
        assert_eq!(
            SqlValue::from(&b"\x00\x01"[..]).as_bytes(),
            Some(&b"\x00\x01"[..])
        );
    }

    #[test]
    fn test_from_value_extraction() {
        assert_eq!(i64::from_value(&SqlValue::Int(5)).unwrap(), 5);
        assert_eq!(i16::from_value(&SqlValue::BigInt(42)).unwrap(), 42);
        assert!(i16::from_value(&SqlValue::BigInt(70_000)).is_err());
        assert_eq!(
            String::from_value(&SqlValue::Numeric("1.50".into())).unwrap(),
            "1.50"
        );
        assert_eq!(Option::<bool>::from_value(&SqlValue::Null).unwrap(), None);

        let err = bool::from_value(&SqlValue::Null).unwrap_err();
        assert!(err.to_string().contains("unexpected NULL"));

        let err = i32::from_value(&SqlValue::String("x".into())).unwrap_err();
        assert!(err.to_string().contains("expected i32, found TEXT"));
    }

    #[test]
    fn test_int_coerces_to_parameter_width() {
        let (_, out) = encode(&SqlValue::BigInt(7), &Type::INT4).unwrap();
        assert_eq!(&out[..], &7i32.to_be_bytes());

        let (_, out) = encode(&SqlValue::Int(7), &Type::INT2).unwrap();
        assert_eq!(&out[..], &7i16.to_be_bytes());

        let (_, out) = encode(&SqlValue::SmallInt(7), &Type::INT8).unwrap();
        assert_eq!(&out[..], &7i64.to_be_bytes());

        assert!(encode(&SqlValue::BigInt(i64::MAX), &Type::INT4).is_err());
    }

    #[test]
    fn test_text_parses_into_typed_parameter() {
        let (_, out) = encode(&SqlValue::from("42"), &Type::INT4).unwrap();
        assert_eq!(&out[..], &42i32.to_be_bytes());

        let (_, out) = encode(&SqlValue::from("yes"), &Type::BOOL).unwrap();
        assert_eq!(&out[..], &[1]);

        let (_, out) = encode(&SqlValue::from("hello"), &Type::TEXT).unwrap();
        assert_eq!(&out[..], b"hello");

        assert!(encode(&SqlValue::from("nope"), &Type::INT8).is_err());
    }

    #[test]
    fn test_null_and_mismatch() {
        let (is_null, out) = encode(&SqlValue::Null, &Type::INT4).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(out.is_empty());

        // A bool cannot be bound to a text parameter.
        assert!(encode(&SqlValue::Bool(true), &Type::TEXT).is_err());
    }

    #[test]
    fn test_from_sql_decodes_by_type() {
        let value = SqlValue::from_sql(&Type::INT4, &5i32.to_be_bytes()).unwrap();
        assert_eq!(value, SqlValue::Int(5));

        let value = SqlValue::from_sql(&Type::TEXT, b"abc").unwrap();
        assert_eq!(value, SqlValue::String("abc".into()));

        let value = SqlValue::from_sql_nullable(&Type::INT8, None).unwrap();
        assert_eq!(value, SqlValue::Null);
    }
}
