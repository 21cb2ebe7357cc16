//! CSV input.
//!
//! Reads a delimited byte stream with a header row fully into memory.

use crate::error::{ConnectorError, ConnectorResult};
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Options for reading delimited text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabularOptions {
    pub delimiter: u8,
}

impl Default for TabularOptions {
    fn default() -> Self {
        Self { delimiter: b',' }
    }
}

impl TabularOptions {
    /// Options with a custom single-byte delimiter.
    pub fn with_delimiter(delimiter: char) -> ConnectorResult<Self> {
        if !delimiter.is_ascii() || delimiter == '"' || delimiter == '\n' || delimiter == '\r' {
            return Err(ConnectorError::invalid_input(format!(
                "Unsupported delimiter {:?}",
                delimiter
            )));
        }
        Ok(Self {
            delimiter: delimiter as u8,
        })
    }
}

/// A fully read CSV file: header names and raw string cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularData {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TabularData {
    /// Build from headers and rows, checking the shape.
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> ConnectorResult<Self> {
        validate_headers(&headers)?;
        if let Some((idx, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, r)| r.len() != headers.len())
        {
            return Err(ConnectorError::unsupported_format(format!(
                "Row {} has {} fields, expected {}",
                idx + 1,
                row.len(),
                headers.len()
            )));
        }
        Ok(Self { headers, rows })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Position of a header.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Cells of one column, limited to the first `limit` rows when given.
    pub fn column_values(&self, index: usize, limit: Option<usize>) -> Vec<&str> {
        let take = limit.unwrap_or(self.rows.len());
        self.rows
            .iter()
            .take(take)
            .map(|row| row[index].as_str())
            .collect()
    }
}

/// Parse CSV bytes with a header row.
///
/// Fails with `UnsupportedFormat` for non-UTF-8 input, a missing header,
/// blank or duplicate header names, and rows whose length differs from the header.
pub fn read_tabular(bytes: &[u8], options: TabularOptions) -> ConnectorResult<TabularData> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(options.delimiter)
        .trim(csv::Trim::Headers)
        .from_reader(bytes);

    let headers = reader
        .headers()?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(ConnectorError::unsupported_format(
            "Input has no header row",
        ));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        // A blank trailing line shows up as a single empty field
        if record.len() == 1 && headers.len() > 1 && record.get(0) == Some("") {
            continue;
        }
        rows.push(record.iter().map(str::to_string).collect());
    }

    debug!(
        columns = headers.len(),
        rows = rows.len(),
        "Read tabular input"
    );
    TabularData::new(headers, rows)
}

/// Read and parse a CSV file from disk.
pub async fn read_tabular_file(
    path: &Path,
    options: TabularOptions,
) -> ConnectorResult<TabularData> {
    let bytes = tokio::fs::read(path).await.map_err(|e| {
        ConnectorError::invalid_input(format!("Cannot read {}: {}", path.display(), e))
    })?;
    read_tabular(&bytes, options)
}

fn validate_headers(headers: &[String]) -> ConnectorResult<()> {
    let mut seen = HashSet::new();
    for (idx, header) in headers.iter().enumerate() {
        if header.trim().is_empty() {
            return Err(ConnectorError::unsupported_format(format!(
                "Header {} is blank",
                idx + 1
            )));
        }
        if !seen.insert(header.as_str()) {
            return Err(ConnectorError::unsupported_format(format!(
                "Duplicate header '{}'",
                header
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_simple_csv() {
        let data = read_tabular(b"id,price\n1,9.99\n2,5.00\n", TabularOptions::default()).unwrap();
        assert_eq!(data.headers(), ["id", "price"]);
        assert_eq!(data.row_count(), 2);
        assert_eq!(data.column_values(1, None), vec!["9.99", "5.00"]);
        assert_eq!(data.column_values(0, Some(1)), vec!["1"]);
    }

    #[test]
    fn test_quoted_fields_and_bom() {
        let input = "\u{feff}name,comment\n\"Doe, John\",\"said \"\"hi\"\"\"\n";
        let data = read_tabular(input.as_bytes(), TabularOptions::default()).unwrap();
        assert_eq!(data.headers()[0], "name");
        assert_eq!(data.rows()[0], vec!["Doe, John", "said \"hi\""]);
    }

    #[test]
    fn test_header_only_file_has_no_rows() {
        let data = read_tabular(b"a,b\n", TabularOptions::default()).unwrap();
        assert_eq!(data.row_count(), 0);
    }

    #[test]
    fn test_custom_delimiter() {
        let options = TabularOptions::with_delimiter(';').unwrap();
        let data = read_tabular(b"a;b\n1;2\n", options).unwrap();
        assert_eq!(data.rows()[0], vec!["1", "2"]);
        assert!(TabularOptions::with_delimiter('"').is_err());
    }

    #[test]
    fn test_ragged_rows_are_unsupported() {
        let err = read_tabular(b"a,b\n1,2\n3\n", TabularOptions::default()).unwrap_err();
        assert!(matches!(err, ConnectorError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_empty_input_is_unsupported() {
        let err = read_tabular(b"", TabularOptions::default()).unwrap_err();
        assert!(matches!(err, ConnectorError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_duplicate_headers_are_unsupported() {
        let err = read_tabular(b"id,id\n1,2\n", TabularOptions::default()).unwrap_err();
        assert!(matches!(err, ConnectorError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_invalid_utf8_is_unsupported() {
        let err = read_tabular(b"a,b\n\xff\xfe,1\n", TabularOptions::default()).unwrap_err();
        assert!(matches!(err, ConnectorError::UnsupportedFormat { .. }));
    }

    #[test]
    fn test_column_index() {
        let data = TabularData::new(
            vec!["a".into(), "b".into()],
            vec![vec!["1".into(), "2".into()]],
        )
        .unwrap();
        assert_eq!(data.column_index("b"), Some(1));
        assert_eq!(data.column_index("c"), None);
    }
}
