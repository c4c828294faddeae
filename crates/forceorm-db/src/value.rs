//! Value types for representing record fields and query literals.
//!
//! The [`Value`] enum is the core type used throughout forceorm to represent
//! field values, where-clause literals, and hydrated attributes. It converts
//! from standard Rust and chrono types and to and from the JSON carried on
//! the wire.

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use forceorm_core::{ForceError, ForceResult};

/// A transport-agnostic representation of a field value.
///
/// # Examples
///
/// ```
/// use forceorm_db::value::Value;
///
/// let v = Value::from(42_i64);
/// assert_eq!(v, Value::Int(42));
///
/// let v = Value::from("hello");
/// assert_eq!(v, Value::String("hello".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// The remote store's `null`.
    Null,
    /// A boolean value.
    Bool(bool),
    /// A 64-bit signed integer.
    Int(i64),
    /// A 64-bit floating-point number.
    Float(f64),
    /// A UTF-8 string (also used for record identifiers).
    String(String),
    /// A calendar date.
    Date(NaiveDate),
    /// A date and time without an offset, interpreted as UTC.
    DateTime(NaiveDateTime),
    /// A date and time in UTC.
    DateTimeTz(DateTime<Utc>),
    /// A time of day.
    Time(NaiveTime),
    /// A nested JSON value (compound fields, sub-records).
    Json(serde_json::Value),
    /// A list of values.
    List(Vec<Value>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Date(d) => write!(f, "{d}"),
            Self::DateTime(dt) => write!(f, "{dt}"),
            Self::DateTimeTz(dt) => write!(f, "{dt}"),
            Self::Time(t) => write!(f, "{t}"),
            Self::Json(j) => write!(f, "{j}"),
            Self::List(vals) => {
                write!(f, "[")?;
                for (i, v) in vals.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")
            }
        }
    }
}

// ── From implementations ───────────────────────────────────────────────

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Self::String(v.clone())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Self::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Self::DateTime(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::DateTimeTz(v)
    }
}

impl From<NaiveTime> for Value {
    fn from(v: NaiveTime) -> Self {
        Self::Time(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::List(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Self::Null,
        }
    }
}

impl Value {
    /// Returns `true` if this value is `Null`.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` for the date-like variants.
    pub const fn is_temporal(&self) -> bool {
        matches!(self, Self::Date(_) | Self::DateTime(_) | Self::DateTimeTz(_))
    }

    /// Attempts to extract a boolean value.
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Attempts to extract an integer value.
    pub const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Attempts to extract a string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The key this value contributes to a matching dictionary.
    ///
    /// Scalars are keyed by their display form; `Null`, JSON and lists have
    /// no key and therefore never match.
    pub fn join_key(&self) -> Option<String> {
        match self {
            Self::Null | Self::Json(_) | Self::List(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Converts a wire JSON value into a `Value`.
    ///
    /// Strings stay strings here; schema-aware typing happens during
    /// hydration.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| n.as_f64().map_or(Self::Null, Self::Float), Self::Int),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(_) => Self::Json(json.clone()),
        }
    }

    /// Converts this value into its JSON form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::from(*f),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
            Self::DateTime(dt) => serde_json::Value::String(dt.and_utc().to_rfc3339()),
            Self::DateTimeTz(dt) => serde_json::Value::String(dt.to_rfc3339()),
            Self::Time(t) => serde_json::Value::String(t.to_string()),
            Self::Json(j) => j.clone(),
            Self::List(vals) => serde_json::Value::Array(vals.iter().map(Self::to_json).collect()),
        }
    }
}

/// Trait for converting a [`Value`] to a concrete Rust type.
pub trait FromValue: Sized {
    /// Attempts to convert a value reference to this type.
    fn from_value(value: &Value) -> ForceResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> ForceError {
    ForceError::TypeMismatch(format!("Expected {expected}, got {value:?}"))
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> ForceResult<Self> {
        match value {
            Value::Int(i) => Ok(*i),
            _ => Err(mismatch("Int", value)),
        }
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> ForceResult<Self> {
        match value {
            Value::Int(i) => i32::try_from(*i)
                .map_err(|e| ForceError::TypeMismatch(format!("Int value out of i32 range: {e}"))),
            _ => Err(mismatch("Int", value)),
        }
    }
}

impl FromValue for f64 {
    #[allow(clippy::cast_precision_loss)]
    fn from_value(value: &Value) -> ForceResult<Self> {
        match value {
            Value::Float(f) => Ok(*f),
            Value::Int(i) => Ok(*i as f64),
            _ => Err(mismatch("Float", value)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> ForceResult<Self> {
        match value {
            Value::Bool(b) => Ok(*b),
            _ => Err(mismatch("Bool", value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> ForceResult<Self> {
        match value {
            Value::String(s) => Ok(s.clone()),
            _ => Err(mismatch("String", value)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: &Value) -> ForceResult<Self> {
        match value {
            Value::Date(d) => Ok(*d),
            _ => Err(mismatch("Date", value)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> ForceResult<Self> {
        match value {
            Value::DateTimeTz(dt) => Ok(*dt),
            Value::DateTime(dt) => Ok(dt.and_utc()),
            _ => Err(mismatch("DateTime", value)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> ForceResult<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> ForceResult<Self> {
        match value {
            Value::Null => Ok(None),
            _ => T::from_value(value).map(Some),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_option() {
        let some_val: Option<i64> = Some(42);
        assert_eq!(Value::from(some_val), Value::Int(42));

        let none_val: Option<i64> = None;
        assert_eq!(Value::from(none_val), Value::Null);
    }

    #[test]
    fn test_join_key() {
        assert_eq!(Value::from("001A").join_key(), Some("001A".to_string()));
        assert_eq!(Value::Int(7).join_key(), Some("7".to_string()));
        assert_eq!(Value::Null.join_key(), None);
        assert_eq!(Value::List(vec![]).join_key(), None);
    }

    #[test]
    fn test_from_json_scalars() {
        assert_eq!(Value::from_json(&serde_json::json!(null)), Value::Null);
        assert_eq!(Value::from_json(&serde_json::json!(true)), Value::Bool(true));
        assert_eq!(Value::from_json(&serde_json::json!(12)), Value::Int(12));
        assert_eq!(Value::from_json(&serde_json::json!(1.5)), Value::Float(1.5));
        assert_eq!(Value::from_json(&serde_json::json!("x")), Value::from("x"));
    }

    #[test]
    fn test_from_json_compound() {
        let j = serde_json::json!({"city": "Oslo"});
        assert_eq!(Value::from_json(&j), Value::Json(j.clone()));
        assert_eq!(
            Value::from_json(&serde_json::json!([1, "a"])),
            Value::List(vec![Value::Int(1), Value::from("a")])
        );
    }

    #[test]
    fn test_to_json_date() {
        let d = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(Value::Date(d).to_json(), serde_json::json!("2024-01-15"));
    }

    #[test]
    fn test_from_value_option_and_mismatch() {
        assert_eq!(Option::<String>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(
            Option::<String>::from_value(&Value::from("a")).unwrap(),
            Some("a".to_string())
        );
        assert!(matches!(
            i64::from_value(&Value::from("a")),
            Err(ForceError::TypeMismatch(_))
        ));
    }

    #[test]
    fn test_display_list() {
        let list = Value::List(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(list.to_string(), "[1, 2]");
        assert_eq!(Value::Null.to_string(), "null");
    }
}
