//! Cell coercion from CSV text to typed JSON values for insertion.
//!
//! Every cell is converted before anything is sent to the database. In strict
//! mode the first unconvertible cell aborts the whole batch. In lenient mode it
//! becomes NULL (nullable columns) or the column type's default value and is
//! counted.

use crate::db::types::{ColumnType, TypeCategory};
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{CoercionMode, ColumnSchema};
use crate::tabular::infer::{
    Temporal, parse_bool_literal, parse_float, parse_integer, parse_temporal,
};
use crate::tabular::reader::TabularData;
use serde_json::{Number, Value as JsonValue};
use tracing::warn;

const DATE_OUTPUT: &str = "%Y-%m-%d";
const DATETIME_OUTPUT: &str = "%Y-%m-%d %H:%M:%S";
const DATETIME64_OUTPUT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Convert one raw cell to the JSON value ClickHouse expects for `column_type`.
///
/// Returns `None` when the cell cannot represent the type. Empty cells are
/// NULL for nullable columns, the empty string for text columns, and
/// unconvertible otherwise.
pub fn coerce_cell(raw: &str, column_type: &ColumnType) -> Option<JsonValue> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        if column_type.is_nullable() {
            return Some(JsonValue::Null);
        }
        return match column_type.category() {
            TypeCategory::Text => Some(JsonValue::String(raw.to_string())),
            _ => None,
        };
    }

    match column_type.category() {
        TypeCategory::Integer => {
            let n = parse_integer(trimmed)?;
            match column_type.integer_bounds() {
                Some((min, max)) if n < min || n > max => None,
                _ => Some(integer_value(n)),
            }
        }
        TypeCategory::Float => {
            let f = parse_float(trimmed)?;
            if matches!(column_type.base(), ColumnType::Other(_)) {
                // Decimal: keep the text so no precision is lost
                Some(JsonValue::String(trimmed.to_string()))
            } else {
                Number::from_f64(f).map(JsonValue::Number)
            }
        }
        TypeCategory::Boolean => parse_bool_literal(trimmed)
            .or(match trimmed {
                "1" => Some(true),
                "0" => Some(false),
                _ => None,
            })
            .map(JsonValue::Bool),
        TypeCategory::Date => match parse_temporal(trimmed)? {
            Temporal::Date(d) => Some(JsonValue::String(d.format(DATE_OUTPUT).to_string())),
            Temporal::DateTime(dt) if dt.time() == chrono::NaiveTime::MIN => {
                Some(JsonValue::String(dt.date().format(DATE_OUTPUT).to_string()))
            }
            Temporal::DateTime(_) => None,
        },
        TypeCategory::DateTime => {
            let dt = parse_temporal(trimmed)?.to_datetime();
            let layout = if matches!(column_type.base(), ColumnType::Other(_)) {
                DATETIME64_OUTPUT
            } else {
                DATETIME_OUTPUT
            };
            Some(JsonValue::String(dt.format(layout).to_string()))
        }
        TypeCategory::Text | TypeCategory::Other => Some(JsonValue::String(raw.to_string())),
    }
}

fn integer_value(n: i128) -> JsonValue {
    if let Ok(v) = i64::try_from(n) {
        JsonValue::Number(v.into())
    } else if let Ok(v) = u64::try_from(n) {
        JsonValue::Number(v.into())
    } else {
        JsonValue::String(n.to_string())
    }
}

/// Value used in place of an unconvertible cell in lenient mode.
pub fn default_value(column_type: &ColumnType) -> JsonValue {
    if column_type.is_nullable() {
        return JsonValue::Null;
    }
    match column_type.category() {
        TypeCategory::Integer => JsonValue::Number(0.into()),
        TypeCategory::Float => {
            if matches!(column_type.base(), ColumnType::Other(_)) {
                JsonValue::String("0".to_string())
            } else {
                Number::from_f64(0.0)
                    .map(JsonValue::Number)
                    .unwrap_or(JsonValue::Null)
            }
        }
        TypeCategory::Boolean => JsonValue::Bool(false),
        TypeCategory::Date => JsonValue::String("1970-01-01".to_string()),
        TypeCategory::DateTime => JsonValue::String("1970-01-01 00:00:00".to_string()),
        TypeCategory::Text => JsonValue::String(String::new()),
        // Server applies the column default for NULL input
        TypeCategory::Other => JsonValue::Null,
    }
}

/// Mapping of one CSV column onto a target table column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnBinding<'a> {
    /// Index of the column in the CSV header
    pub source_index: usize,
    pub target: &'a ColumnSchema,
}

/// Converted rows ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercedRows {
    pub rows: Vec<Vec<JsonValue>>,
    /// Number of cells replaced by NULL or a default (lenient mode only)
    pub substituted: usize,
}

/// Convert every row of `data` according to `bindings`.
///
/// Output rows hold one value per binding, in binding order. Row numbers in
/// errors are 1-based and exclude the header.
pub fn coerce_rows(
    data: &TabularData,
    bindings: &[ColumnBinding<'_>],
    mode: CoercionMode,
) -> ConnectorResult<CoercedRows> {
    let mut rows = Vec::with_capacity(data.row_count());
    let mut substituted = 0usize;

    for (row_idx, record) in data.rows().iter().enumerate() {
        let mut out = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let raw = record[binding.source_index].as_str();
            let column_type = &binding.target.column_type;
            match coerce_cell(raw, column_type) {
                Some(value) => out.push(value),
                None => match mode {
                    CoercionMode::Strict => {
                        return Err(ConnectorError::type_coercion(
                            &binding.target.name,
                            row_idx + 1,
                            raw,
                            column_type.to_string(),
                        ));
                    }
                    CoercionMode::Lenient => {
                        let replacement = default_value(column_type);
                        warn!(
                            column = %binding.target.name,
                            row = row_idx + 1,
                            value = %raw,
                            expected = %column_type,
                            replacement = %replacement,
                            "Substituting unconvertible cell"
                        );
                        substituted += 1;
                        out.push(replacement);
                    }
                },
            }
        }
        rows.push(out);
    }

    Ok(CoercedRows { rows, substituted })
}
