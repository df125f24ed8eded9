//! ClickHouse column types
//!
//! Parses the type strings returned by `DESCRIBE TABLE` into the families the
//! output knows how to default and coerce. Unknown types are kept verbatim as
//! [`StoreType::Other`].

use std::fmt;

/// Column type as reported by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreType {
    /// `String` or `LowCardinality(String)`
    String,
    Date,
    /// `DateTime` with an optional timezone argument
    DateTime,
    /// `DateTime64(p)` with an optional timezone argument
    DateTime64,
    Int8,
    Int16,
    Int32,
    Int64,
    Int256,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt256,
    Float32,
    Float64,
    /// `Decimal32(s)`, carried at float precision
    Decimal32,
    /// `Decimal64(s)`, carried at double precision
    Decimal64,
    IPv4,
    IPv6,
    /// `Enum8('a' = 1, ...)`, normalized to the short tag
    Enum8,
    /// `Enum16('a' = 1, ...)`, normalized to the short tag
    Enum16,
    Array(Box<StoreType>),
    Other(String),
}

impl StoreType {
    /// Parse a type string from the schema
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();

        if let Some(inner) = unwrap_call(raw, "Array") {
            return Self::Array(Box::new(Self::parse(inner)));
        }
        if raw.starts_with("Enum16") {
            return Self::Enum16;
        }
        if raw.starts_with("Enum8") {
            return Self::Enum8;
        }
        if let Some(inner) = unwrap_call(raw, "LowCardinality") {
            return match Self::parse(inner) {
                Self::String => Self::String,
                _ => Self::Other(raw.to_string()),
            };
        }

        match raw {
            "String" => Self::String,
            "Date" => Self::Date,
            "DateTime" => Self::DateTime,
            "DateTime64" => Self::DateTime64,
            "Int8" => Self::Int8,
            "Int16" => Self::Int16,
            "Int32" => Self::Int32,
            "Int64" => Self::Int64,
            "Int256" => Self::Int256,
            "UInt8" => Self::UInt8,
            "UInt16" => Self::UInt16,
            "UInt32" => Self::UInt32,
            "UInt64" => Self::UInt64,
            "UInt256" => Self::UInt256,
            "Float32" => Self::Float32,
            "Float64" => Self::Float64,
            "Decimal32" => Self::Decimal32,
            "Decimal64" => Self::Decimal64,
            "IPv4" => Self::IPv4,
            "IPv6" => Self::IPv6,
            _ if unwrap_call(raw, "DateTime64").is_some() => Self::DateTime64,
            _ if unwrap_call(raw, "DateTime").is_some() => Self::DateTime,
            _ if unwrap_call(raw, "Decimal32").is_some() => Self::Decimal32,
            _ if unwrap_call(raw, "Decimal64").is_some() => Self::Decimal64,
            _ => Self::Other(raw.to_string()),
        }
    }

    /// Whether this is one of the 8/16/32/64-bit signed or unsigned integers
    pub fn is_fixed_integer(&self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::UInt8
                | Self::UInt16
                | Self::UInt32
                | Self::UInt64
        )
    }

    /// Whether this is a Date/DateTime flavour
    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Date | Self::DateTime | Self::DateTime64)
    }
}

impl fmt::Display for StoreType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "String",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            Self::DateTime64 => "DateTime64",
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::Int256 => "Int256",
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::UInt256 => "UInt256",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::Decimal32 => "Decimal32",
            Self::Decimal64 => "Decimal64",
            Self::IPv4 => "IPv4",
            Self::IPv6 => "IPv6",
            Self::Enum8 => "Enum8",
            Self::Enum16 => "Enum16",
            Self::Array(inner) => return write!(f, "Array({inner})"),
            Self::Other(raw) => raw,
        };
        f.write_str(name)
    }
}

/// Strip `Name(` ... `)` and return the argument text
fn unwrap_call<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    raw.strip_prefix(name)?
        .strip_prefix('(')?
        .strip_suffix(')')
        .map(str::trim)
}
