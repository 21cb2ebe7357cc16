//! CSV output for exported result sets.

use crate::error::{ConnectorError, ConnectorResult};
use serde_json::Value as JsonValue;

/// Render a JSON cell as CSV text. NULL becomes an empty field.
pub fn render_cell(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Array(_) | JsonValue::Object(_) => value.to_string(),
    }
}

/// Write a header row and data rows as RFC 4180 CSV text.
///
/// Fields containing the delimiter, quotes or line breaks are quoted.
pub fn write_csv(headers: &[String], rows: &[Vec<JsonValue>]) -> ConnectorResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(headers).map_err(write_error)?;
    for row in rows {
        writer
            .write_record(row.iter().map(render_cell))
            .map_err(write_error)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ConnectorError::internal(format!("Failed to flush CSV output: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| ConnectorError::internal(format!("CSV output is not UTF-8: {}", e)))
}

fn write_error(err: csv::Error) -> ConnectorError {
    ConnectorError::internal(format!("Failed to write CSV: {}", err))
}
