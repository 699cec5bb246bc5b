//! Declared value types and payload-to-value coercion.
//!
//! [`ValueType`] is the closed set of types a data field may declare. Each
//! variant owns one coercion function turning a JSON payload value into a
//! [`BoundValue`]; any undeclared type name falls back to
//! [`ValueType::Structured`], which keeps the JSON tree for typed decoding
//! at the point of use.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Type declared for a data or bundle field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// `true` / `false`.
    Boolean,
    /// 32-bit signed integer.
    Integer,
    /// 64-bit signed integer.
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// UTF-8 string.
    String,
    /// 8-bit signed integer.
    Byte,
    /// Single Unicode scalar value.
    Char,
    /// Any other declared type, decoded from the JSON tree on demand.
    Structured(String),
}

impl ValueType {
    /// Maps a declared type name to a variant. Names outside the fixed
    /// table become [`ValueType::Structured`].
    #[must_use]
    pub fn from_declared(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => Self::Boolean,
            "int" | "integer" | "i32" => Self::Integer,
            "long" | "i64" => Self::Long,
            "float" | "f32" => Self::Float,
            "double" | "f64" => Self::Double,
            "string" | "str" => Self::String,
            "byte" | "i8" => Self::Byte,
            "char" | "character" => Self::Char,
            _ => Self::Structured(name.trim().to_string()),
        }
    }

    /// Coerces a non-null payload value to this type.
    ///
    /// # Errors
    ///
    /// Returns a [`CoercionError`] if the value cannot represent this type
    /// without loss.
    pub fn coerce(&self, value: &Value) -> Result<BoundValue, CoercionError> {
        match self {
            Self::Boolean => coerce_boolean(value),
            Self::Integer => coerce_integer(value),
            Self::Long => coerce_long(value),
            Self::Float => coerce_float(value),
            Self::Double => coerce_double(value),
            Self::String => coerce_string(value),
            Self::Byte => coerce_byte(value),
            Self::Char => coerce_char(value),
            Self::Structured(type_name) => Ok(BoundValue::Structured {
                type_name: type_name.clone(),
                value: value.clone(),
            }),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean => f.write_str("boolean"),
            Self::Integer => f.write_str("integer"),
            Self::Long => f.write_str("long"),
            Self::Float => f.write_str("float"),
            Self::Double => f.write_str("double"),
            Self::String => f.write_str("string"),
            Self::Byte => f.write_str("byte"),
            Self::Char => f.write_str("char"),
            Self::Structured(name) => f.write_str(name),
        }
    }
}

/// A payload value could not be converted to its declared type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cannot coerce {found} to {expected}")]
pub struct CoercionError {
    /// Declared target type.
    pub expected: String,
    /// Compact rendering of the offending value.
    pub found: String,
}

impl CoercionError {
    fn new(expected: &str, found: &Value) -> Self {
        Self {
            expected: expected.to_string(),
            found: found.to_string(),
        }
    }
}

/// A payload value after coercion to its declared type.
#[derive(Debug, Clone, PartialEq)]
pub enum BoundValue {
    /// Coerced boolean.
    Boolean(bool),
    /// Coerced 32-bit integer.
    Integer(i32),
    /// Coerced 64-bit integer.
    Long(i64),
    /// Coerced 32-bit float.
    Float(f32),
    /// Coerced 64-bit float.
    Double(f64),
    /// Coerced string.
    String(String),
    /// Coerced byte.
    Byte(i8),
    /// Coerced character.
    Char(char),
    /// Structured value kept as JSON, with its declared type name.
    Structured {
        /// Declared type name.
        type_name: String,
        /// Raw JSON tree.
        value: Value,
    },
}

impl BoundValue {
    /// Short name of the carried type, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Long(_) => "long",
            Self::Float(_) => "float",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::Byte(_) => "byte",
            Self::Char(_) => "char",
            Self::Structured { type_name, .. } => type_name,
        }
    }
}

fn coerce_boolean(value: &Value) -> Result<BoundValue, CoercionError> {
    match value {
        Value::Bool(b) => Ok(BoundValue::Boolean(*b)),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(BoundValue::Boolean(true)),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(BoundValue::Boolean(false)),
        other => Err(CoercionError::new("boolean", other)),
    }
}

/// 2^63: whole floats must lie in `[-I64_SPAN, I64_SPAN)` to fit an `i64`.
const I64_SPAN: f64 = 9_223_372_036_854_775_808.0;

/// Reads an integral value from a number without a fractional part, or
/// from a numeric string.
#[allow(clippy::cast_possible_truncation)]
fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) if n.is_u64() => n.as_i64(),
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && (-I64_SPAN..I64_SPAN).contains(f))
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn floating(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_integer(value: &Value) -> Result<BoundValue, CoercionError> {
    integral(value)
        .and_then(|i| i32::try_from(i).ok())
        .map(BoundValue::Integer)
        .ok_or_else(|| CoercionError::new("integer", value))
}

fn coerce_long(value: &Value) -> Result<BoundValue, CoercionError> {
    integral(value)
        .map(BoundValue::Long)
        .ok_or_else(|| CoercionError::new("long", value))
}

fn coerce_byte(value: &Value) -> Result<BoundValue, CoercionError> {
    integral(value)
        .and_then(|i| i8::try_from(i).ok())
        .map(BoundValue::Byte)
        .ok_or_else(|| CoercionError::new("byte", value))
}

#[allow(clippy::cast_possible_truncation)]
fn coerce_float(value: &Value) -> Result<BoundValue, CoercionError> {
    floating(value)
        .map(|f| BoundValue::Float(f as f32))
        .ok_or_else(|| CoercionError::new("float", value))
}

fn coerce_double(value: &Value) -> Result<BoundValue, CoercionError> {
    floating(value)
        .map(BoundValue::Double)
        .ok_or_else(|| CoercionError::new("double", value))
}

fn coerce_string(value: &Value) -> Result<BoundValue, CoercionError> {
    match value {
        Value::String(s) => Ok(BoundValue::String(s.clone())),
        Value::Number(n) => Ok(BoundValue::String(n.to_string())),
        Value::Bool(b) => Ok(BoundValue::String(b.to_string())),
        other => Err(CoercionError::new("string", other)),
    }
}

fn coerce_char(value: &Value) -> Result<BoundValue, CoercionError> {
    let Value::String(s) = value else {
        return Err(CoercionError::new("char", value));
    };
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(BoundValue::Char(c)),
        _ => Err(CoercionError::new("char", value)),
    }
}

/// Typed extraction from an optional [`BoundValue`].
///
/// Implemented for every primitive in the fixed table, for `Option<T>`
/// (absent or null values become `None`), and for [`Structured<T>`].
pub trait FromBound: Sized {
    /// Extracts `Self`, or describes why the slot does not hold it.
    ///
    /// # Errors
    ///
    /// Returns a description of the mismatch when the slot is empty or
    /// carries a different type.
    fn from_bound(value: Option<&BoundValue>) -> Result<Self, String>;
}

macro_rules! impl_from_bound {
    ($ty:ty, $variant:ident, $name:literal) => {
        impl FromBound for $ty {
            fn from_bound(value: Option<&BoundValue>) -> Result<Self, String> {
                match value {
                    Some(BoundValue::$variant(v)) => Ok(v.clone()),
                    Some(other) => Err(format!("expected {}, found {}", $name, other.kind())),
                    None => Err(format!("expected {}, found null", $name)),
                }
            }
        }
    };
}

impl_from_bound!(bool, Boolean, "boolean");
impl_from_bound!(i32, Integer, "integer");
impl_from_bound!(i64, Long, "long");
impl_from_bound!(f32, Float, "float");
impl_from_bound!(f64, Double, "double");
impl_from_bound!(String, String, "string");
impl_from_bound!(i8, Byte, "byte");
impl_from_bound!(char, Char, "char");

impl<T: FromBound> FromBound for Option<T> {
    fn from_bound(value: Option<&BoundValue>) -> Result<Self, String> {
        match value {
            None => Ok(None),
            some => T::from_bound(some).map(Some),
        }
    }
}

/// Wrapper decoding a [`BoundValue::Structured`] slot into `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Structured<T>(pub T);

impl<T: DeserializeOwned> FromBound for Structured<T> {
    fn from_bound(value: Option<&BoundValue>) -> Result<Self, String> {
        match value {
            Some(BoundValue::Structured { type_name, value }) => {
                serde_json::from_value(value.clone())
                    .map(Structured)
                    .map_err(|e| format!("cannot decode {type_name}: {e}"))
            }
            Some(other) => Err(format!("expected structured value, found {}", other.kind())),
            None => Err("expected structured value, found null".to_string()),
        }
    }
}
