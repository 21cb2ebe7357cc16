//! Column type inference for CSV data.
//!
//! Each column is classified from its non-empty sampled cells. Candidates are
//! tried narrowest first: integers (Int32, then Int64, then UInt64), Float64,
//! Date, DateTime, Bool, and finally String. A column with any empty cell is
//! wrapped in `Nullable`.

use crate::db::types::ColumnType;
use crate::models::ColumnSchema;
use crate::tabular::reader::TabularData;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Date layouts recognized in CSV cells.
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d.%m.%Y", "%m/%d/%Y"];

/// Date-time layouts recognized in CSV cells, tried after RFC 3339.
pub const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const TRUE_LITERALS: &[&str] = &["true", "yes", "t", "y"];
const FALSE_LITERALS: &[&str] = &["false", "no", "f", "n"];

/// A parsed date or date-time cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Temporal {
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Temporal {
    /// The value as a date-time, midnight for plain dates.
    pub fn to_datetime(self) -> NaiveDateTime {
        match self {
            Temporal::Date(d) => d.and_time(chrono::NaiveTime::MIN),
            Temporal::DateTime(dt) => dt,
        }
    }
}

/// Parse a cell as a date or date-time.
///
/// Offsets in RFC 3339 values are normalized to UTC.
pub fn parse_temporal(value: &str) -> Option<Temporal> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(value, fmt) {
            return Some(Temporal::Date(d));
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(Temporal::DateTime(dt.with_timezone(&Utc).naive_utc()));
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(Temporal::DateTime)
}

/// Parse a boolean word (`true/false/yes/no/t/f/y/n`, any case).
pub fn parse_bool_literal(value: &str) -> Option<bool> {
    let lower = value.trim().to_ascii_lowercase();
    if TRUE_LITERALS.contains(&lower.as_str()) {
        Some(true)
    } else if FALSE_LITERALS.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parse an integer cell into the widest range any column type needs.
pub fn parse_integer(value: &str) -> Option<i128> {
    value.trim().parse::<i128>().ok()
}

/// Parse a finite floating point cell.
pub fn parse_float(value: &str) -> Option<f64> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
}

/// Infer the ClickHouse type for one column's cells.
///
/// Empty cells are ignored for classification; a column with no non-empty
/// cells is `String`. Nullability is decided separately by [`infer_columns`].
pub fn infer_type<S: AsRef<str>>(values: &[S]) -> ColumnType {
    let present: Vec<&str> = values
        .iter()
        .map(|v| v.as_ref().trim())
        .filter(|v| !v.is_empty())
        .collect();

    if present.is_empty() {
        return ColumnType::String;
    }

    if let Some(ty) = infer_integer(&present) {
        return ty;
    }

    if present.iter().all(|v| parse_float(v).is_some()) {
        return ColumnType::Float64;
    }

    if let Some(ty) = infer_temporal(&present) {
        return ty;
    }

    if present.iter().all(|v| parse_bool_literal(v).is_some()) {
        return ColumnType::Bool;
    }

    ColumnType::String
}

fn infer_integer(values: &[&str]) -> Option<ColumnType> {
    let mut min = i128::MAX;
    let mut max = i128::MIN;
    for v in values {
        let n = parse_integer(v)?;
        min = min.min(n);
        max = max.max(n);
    }

    if min >= i32::MIN as i128 && max <= i32::MAX as i128 {
        Some(ColumnType::Int32)
    } else if min >= i64::MIN as i128 && max <= i64::MAX as i128 {
        Some(ColumnType::Int64)
    } else if min >= 0 && max <= u64::MAX as i128 {
        Some(ColumnType::UInt64)
    } else {
        None
    }
}

fn infer_temporal(values: &[&str]) -> Option<ColumnType> {
    let mut saw_time = false;
    for v in values {
        match parse_temporal(v)? {
            Temporal::Date(_) => {}
            Temporal::DateTime(_) => saw_time = true,
        }
    }
    Some(if saw_time {
        ColumnType::DateTime
    } else {
        ColumnType::Date
    })
}

/// Infer a schema for every column of `data`.
///
/// Types come from the first `sample_rows` rows (all rows when `None`).
/// Nullability is checked against every row so that a late empty cell does
/// not break a strict import of the inferred schema.
pub fn infer_columns(data: &TabularData, sample_rows: Option<usize>) -> Vec<ColumnSchema> {
    data.headers()
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let sample = data.column_values(idx, sample_rows);
            let mut ty = infer_type(&sample);
            let has_empty = data
                .column_values(idx, None)
                .iter()
                .any(|v| v.trim().is_empty());
            if has_empty {
                ty = ty.nullable();
            }
            ColumnSchema::new(name.clone(), ty)
        })
        .collect()
}
