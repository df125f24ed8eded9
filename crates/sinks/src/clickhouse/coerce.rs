//! Type coercion
//!
//! Converts a loosely-typed record value into the representation its column
//! requires. Numeric families accept three source shapes:
//!
//! | Source | Result |
//! |--------|--------|
//! | number literal | parsed at the column's width |
//! | string | parsed at the column's width |
//! | boolean | `1` / `0` |
//!
//! Parsing is strict: a literal that does not fit the column is an error, never
//! a silent clamp. Any other combination (arrays, nulls, non-numeric column
//! types) passes through untouched.

use std::fmt::Display;
use std::str::FromStr;

use super::error::CoercionError;
use super::types::StoreType;
use super::value::{ColumnValue, Value};

/// 2^255 - 1
const INT256_MAX: &str =
    "57896044618658097711785492504343953926634992332820282019728792003956564819967";

/// 2^255, the magnitude of the smallest Int256
const INT256_MIN_MAGNITUDE: &str =
    "57896044618658097711785492504343953926634992332820282019728792003956564819968";

/// 2^256 - 1
const UINT256_MAX: &str =
    "115792089237316195423570985008687907853269984665640564039457584007913129639935";

/// Coerce `value` into the representation required by `store_type`
pub fn coerce(store_type: &StoreType, value: &Value) -> Result<ColumnValue, CoercionError> {
    if !is_numeric(store_type) {
        return Ok(ColumnValue::Raw(value.clone()));
    }

    match value {
        Value::Bool(b) => Ok(from_bool(store_type, *b)),
        Value::Number(n) => parse_literal(store_type, &n.to_string()),
        Value::String(s) => parse_literal(store_type, s),
        Value::Null | Value::Array(_) => Ok(ColumnValue::Raw(value.clone())),
    }
}

/// Parse a textual literal at the width of a numeric column
///
/// Non-numeric column types yield the literal as a string.
pub fn parse_literal(store_type: &StoreType, literal: &str) -> Result<ColumnValue, CoercionError> {
    match store_type {
        StoreType::Int8 => parse_signed::<i8>(store_type, literal),
        StoreType::Int16 => parse_signed::<i16>(store_type, literal),
        StoreType::Int32 => parse_signed::<i32>(store_type, literal),
        StoreType::Int64 => parse_signed::<i64>(store_type, literal),
        StoreType::UInt8 => parse_unsigned::<u8>(store_type, literal),
        StoreType::UInt16 => parse_unsigned::<u16>(store_type, literal),
        StoreType::UInt32 => parse_unsigned::<u32>(store_type, literal),
        StoreType::UInt64 => parse_unsigned::<u64>(store_type, literal),
        StoreType::Float32 | StoreType::Decimal32 => {
            parse_float::<f32>(store_type, literal).map(ColumnValue::Float32)
        }
        StoreType::Float64 | StoreType::Decimal64 => {
            parse_float::<f64>(store_type, literal).map(ColumnValue::Float64)
        }
        StoreType::Int256 => parse_wide(store_type, literal, true),
        StoreType::UInt256 => parse_wide(store_type, literal, false),
        _ => Ok(ColumnValue::String(literal.to_string())),
    }
}

/// Column types with a coercion rule
fn is_numeric(store_type: &StoreType) -> bool {
    store_type.is_fixed_integer()
        || matches!(
            store_type,
            StoreType::Float32
                | StoreType::Float64
                | StoreType::Decimal32
                | StoreType::Decimal64
                | StoreType::Int256
                | StoreType::UInt256
        )
}

fn from_bool(store_type: &StoreType, b: bool) -> ColumnValue {
    let bit = u8::from(b);
    match store_type {
        StoreType::Int8 | StoreType::Int16 | StoreType::Int32 | StoreType::Int64 => {
            ColumnValue::Int(i64::from(bit))
        }
        StoreType::Float32 | StoreType::Decimal32 => ColumnValue::Float32(f32::from(bit)),
        StoreType::Float64 | StoreType::Decimal64 => ColumnValue::Float64(f64::from(bit)),
        StoreType::Int256 | StoreType::UInt256 => ColumnValue::BigInt(bit.to_string()),
        _ => ColumnValue::UInt(u64::from(bit)),
    }
}

fn parse_signed<T>(store_type: &StoreType, literal: &str) -> Result<ColumnValue, CoercionError>
where
    T: FromStr + Into<i64>,
    T::Err: Display,
{
    literal
        .parse::<T>()
        .map(|v| ColumnValue::Int(v.into()))
        .map_err(|e| CoercionError::new(store_type, literal, e))
}

fn parse_unsigned<T>(store_type: &StoreType, literal: &str) -> Result<ColumnValue, CoercionError>
where
    T: FromStr + Into<u64>,
    T::Err: Display,
{
    literal
        .parse::<T>()
        .map(|v| ColumnValue::UInt(v.into()))
        .map_err(|e| CoercionError::new(store_type, literal, e))
}

/// Parse a float, rejecting finite literals that overflow the width
fn parse_float<T>(store_type: &StoreType, literal: &str) -> Result<T, CoercionError>
where
    T: FromStr + Copy + Into<f64>,
    T::Err: Display,
{
    let parsed = literal
        .parse::<T>()
        .map_err(|e| CoercionError::new(store_type, literal, e))?;

    let explicit_infinity = literal.to_ascii_lowercase().contains("inf");
    if parsed.into().is_infinite() && !explicit_infinity {
        return Err(CoercionError::new(store_type, literal, "value out of range"));
    }

    Ok(parsed)
}

/// Parse a 256-bit integer literal with an exact range check
fn parse_wide(
    store_type: &StoreType,
    literal: &str,
    signed: bool,
) -> Result<ColumnValue, CoercionError> {
    let (negative, digits) = match literal.as_bytes().first() {
        Some(b'-') => (true, &literal[1..]),
        Some(b'+') => (false, &literal[1..]),
        _ => (false, literal),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CoercionError::new(store_type, literal, "invalid digit found in string"));
    }

    let magnitude = match digits.trim_start_matches('0') {
        "" => "0",
        m => m,
    };
    let is_zero = magnitude == "0";

    let limit = match (signed, negative) {
        (false, true) if !is_zero => {
            return Err(CoercionError::new(store_type, literal, "value out of range"));
        }
        (false, _) => UINT256_MAX,
        (true, true) => INT256_MIN_MAGNITUDE,
        (true, false) => INT256_MAX,
    };

    if exceeds(magnitude, limit) {
        return Err(CoercionError::new(store_type, literal, "value out of range"));
    }

    let normalized = if negative && !is_zero {
        format!("-{magnitude}")
    } else {
        magnitude.to_string()
    };
    Ok(ColumnValue::BigInt(normalized))
}

/// Compare two decimal magnitudes without leading zeros
#[inline]
fn exceeds(magnitude: &str, limit: &str) -> bool {
    magnitude.len() > limit.len() || (magnitude.len() == limit.len() && magnitude > limit)
}

#[cfg(test)]
#[path = "coerce_test.rs"]
mod coerce_test;
