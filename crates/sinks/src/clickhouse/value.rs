//! Record values
//!
//! Records arrive loosely typed: every field is a string, number, boolean,
//! null, or an array of those. Values are converted into their column's
//! representation only at write time, see [`super::coerce`].

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Number;

use super::types::StoreType;

/// One record: field name to loosely-typed value
pub type Record = HashMap<String, Value>;

// =============================================================================
// Input Values
// =============================================================================

/// Loosely-typed input value
///
/// Numbers keep their literal form (like a JSON number) so that coercion can
/// parse them with the precision of the target column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Array(Vec<Value>),
}

impl Value {
    /// Whether this value is an explicit null
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render as JSON for the wire
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Value::Number(n.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Nested objects have no place in the value model and are kept as their
/// JSON text.
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from).collect())
            }
            obj @ serde_json::Value::Object(_) => Self::String(obj.to_string()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Number(n.into())
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Self::Number(n.into())
    }
}

/// Convert a JSON object into a record
///
/// Returns `None` if the value is not an object.
pub fn record_from_json(value: serde_json::Value) -> Option<Record> {
    match value {
        serde_json::Value::Object(map) => {
            Some(map.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
        }
        _ => None,
    }
}

// =============================================================================
// Column Values
// =============================================================================

/// A value in the exact representation a column expects
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Int(i64),
    UInt(u64),
    Float32(f32),
    Float64(f64),
    /// Range-checked 256-bit integer, normalized decimal form
    BigInt(String),
    String(String),
    DateTime(DateTime<Utc>),
    /// Array whose element type is known even when empty
    Array {
        element: StoreType,
        values: Vec<ColumnValue>,
    },
    /// Input passed through untouched (no coercion rule for the column type)
    Raw(Value),
}

impl ColumnValue {
    /// Empty string, the fallback for columns without a default
    #[inline]
    pub fn empty_string() -> Self {
        Self::String(String::new())
    }

    /// Render as JSON for `JSONCompactEachRow` input
    ///
    /// Temporal values are sent as unix seconds, which ClickHouse accepts for
    /// every Date/DateTime flavour.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Int(v) => serde_json::Value::from(*v),
            Self::UInt(v) => serde_json::Value::from(*v),
            Self::Float32(v) => float_json(f64::from(*v)),
            Self::Float64(v) => float_json(*v),
            Self::BigInt(s) | Self::String(s) => serde_json::Value::String(s.clone()),
            Self::DateTime(ts) => serde_json::Value::from(ts.timestamp()),
            Self::Array { values, .. } => {
                serde_json::Value::Array(values.iter().map(Self::to_json).collect())
            }
            Self::Raw(v) => v.to_json(),
        }
    }
}

/// JSON numbers cannot hold inf or nan; ClickHouse reads these strings instead
fn float_json(v: f64) -> serde_json::Value {
    if v.is_nan() {
        serde_json::Value::from("nan")
    } else if v.is_infinite() {
        serde_json::Value::from(if v > 0.0 { "inf" } else { "-inf" })
    } else {
        serde_json::Value::from(v)
    }
}
