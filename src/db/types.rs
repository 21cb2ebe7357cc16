//! ClickHouse column type mappings.
//!
//! This module provides the enumerated column type used by schema lookups,
//! type inference and CREATE rendering, plus a coarse classification used
//! by cell coercion.
//!
//! # Architecture
//!
//! Type handling uses a two-phase approach:
//! 1. `ColumnType` parses and renders the exact ClickHouse type text
//! 2. `TypeCategory` classifies a type into the logical family coercion works on
//!
//! Types the enum does not name are kept verbatim in `ColumnType::Other` so a
//! described table round-trips through the API without losing information.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Column Types
// =============================================================================

/// A ClickHouse column type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ColumnType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    String,
    Date,
    DateTime,
    Nullable(Box<ColumnType>),
    LowCardinality(Box<ColumnType>),
    /// Any other type, kept as reported (e.g. `Decimal(10, 2)`, `UUID`)
    Other(std::string::String),
}

/// Logical category for column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Text,
    Other,
}

impl ColumnType {
    /// Wrap this type in `Nullable(...)`. Already-nullable types are returned unchanged.
    pub fn nullable(self) -> Self {
        match self {
            Self::Nullable(_) => self,
            other => Self::Nullable(Box::new(other)),
        }
    }

    /// True if the column accepts NULL.
    pub fn is_nullable(&self) -> bool {
        match self {
            Self::Nullable(_) => true,
            Self::LowCardinality(inner) => inner.is_nullable(),
            _ => false,
        }
    }

    /// The type with `Nullable` and `LowCardinality` wrappers removed.
    pub fn base(&self) -> &ColumnType {
        match self {
            Self::Nullable(inner) | Self::LowCardinality(inner) => inner.base(),
            other => other,
        }
    }

    /// Classify this type into a logical category.
    pub fn category(&self) -> TypeCategory {
        match self.base() {
            Self::Int8
            | Self::Int16
            | Self::Int32
            | Self::Int64
            | Self::UInt8
            | Self::UInt16
            | Self::UInt32
            | Self::UInt64 => TypeCategory::Integer,
            Self::Float32 | Self::Float64 => TypeCategory::Float,
            Self::Bool => TypeCategory::Boolean,
            Self::String => TypeCategory::Text,
            Self::Date => TypeCategory::Date,
            Self::DateTime => TypeCategory::DateTime,
            Self::Other(raw) => categorize_type(raw),
            Self::Nullable(_) | Self::LowCardinality(_) => TypeCategory::Other,
        }
    }

    /// Inclusive integer range for fixed-width integer types.
    pub fn integer_bounds(&self) -> Option<(i128, i128)> {
        let bounds = match self.base() {
            Self::Int8 => (i8::MIN as i128, i8::MAX as i128),
            Self::Int16 => (i16::MIN as i128, i16::MAX as i128),
            Self::Int32 => (i32::MIN as i128, i32::MAX as i128),
            Self::Int64 => (i64::MIN as i128, i64::MAX as i128),
            Self::UInt8 => (0, u8::MAX as i128),
            Self::UInt16 => (0, u16::MAX as i128),
            Self::UInt32 => (0, u32::MAX as i128),
            Self::UInt64 => (0, u64::MAX as i128),
            _ => return None,
        };
        Some(bounds)
    }

    fn simple_name(&self) -> Option<&'static str> {
        let name = match self {
            Self::Int8 => "Int8",
            Self::Int16 => "Int16",
            Self::Int32 => "Int32",
            Self::Int64 => "Int64",
            Self::UInt8 => "UInt8",
            Self::UInt16 => "UInt16",
            Self::UInt32 => "UInt32",
            Self::UInt64 => "UInt64",
            Self::Float32 => "Float32",
            Self::Float64 => "Float64",
            Self::Bool => "Bool",
            Self::String => "String",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            _ => return None,
        };
        Some(name)
    }
}

/// Classify a raw ClickHouse type name the enum does not model.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.trim().to_lowercase();

    // Decimal behaves like a float for parsing purposes
    if lower.starts_with("decimal") {
        return TypeCategory::Float;
    }

    if lower.starts_with("datetime") {
        return TypeCategory::DateTime;
    }

    if lower.starts_with("date") {
        return TypeCategory::Date;
    }

    if lower.starts_with("int") || lower.starts_with("uint") {
        return TypeCategory::Integer;
    }

    if lower.starts_with("float") {
        return TypeCategory::Float;
    }

    if lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if lower.starts_with("fixedstring") || lower.starts_with("enum") {
        return TypeCategory::Text;
    }

    TypeCategory::Other
}

/// Error returned when a type string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid column type: '{0}'")]
pub struct ParseColumnTypeError(pub std::string::String);

impl FromStr for ColumnType {
    type Err = ParseColumnTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(ParseColumnTypeError(s.to_string()));
        }

        if let Some(inner) = unwrap_call(trimmed, "Nullable") {
            return Ok(Self::Nullable(Box::new(inner.parse()?)));
        }
        if let Some(inner) = unwrap_call(trimmed, "LowCardinality") {
            return Ok(Self::LowCardinality(Box::new(inner.parse()?)));
        }

        let parsed = match trimmed {
            "Int8" => Self::Int8,
            "Int16" => Self::Int16,
            "Int32" => Self::Int32,
            "Int64" => Self::Int64,
            "UInt8" => Self::UInt8,
            "UInt16" => Self::UInt16,
            "UInt32" => Self::UInt32,
            "UInt64" => Self::UInt64,
            "Float32" => Self::Float32,
            "Float64" => Self::Float64,
            "Bool" | "Boolean" => Self::Bool,
            "String" => Self::String,
            "Date" => Self::Date,
            "DateTime" => Self::DateTime,
            other => Self::Other(other.to_string()),
        };
        Ok(parsed)
    }
}

/// Return the argument text of `Name(arg)`, if `s` has exactly that shape.
fn unwrap_call<'a>(s: &'a str, name: &str) -> Option<&'a str> {
    s.strip_prefix(name)?
        .strip_prefix('(')?
        .strip_suffix(')')
        .map(str::trim)
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nullable(inner) => write!(f, "Nullable({})", inner),
            Self::LowCardinality(inner) => write!(f, "LowCardinality({})", inner),
            Self::Other(raw) => f.write_str(raw),
            simple => f.write_str(simple.simple_name().unwrap_or("String")),
        }
    }
}

impl TryFrom<std::string::String> for ColumnType {
    type Error = ParseColumnTypeError;

    fn try_from(value: std::string::String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ColumnType> for std::string::String {
    fn from(value: ColumnType) -> Self {
        value.to_string()
    }
}
