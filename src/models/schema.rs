//! Schema-related data models.
//!
//! This module defines types for table introspection results.

use crate::db::types::ColumnType;
use crate::error::{ConnectorError, ConnectorResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One column of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl ColumnSchema {
    /// Create a new column schema.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// A table's shape as reported by the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<ColumnSchema>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_rows: Option<u64>,
    /// Bytes on disk
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,
    /// Human-readable `total_bytes`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_size: Option<String>,
}

impl TableSchema {
    /// Create a new table schema with no columns.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            engine: None,
            total_rows: None,
            total_bytes: None,
            total_size: None,
        }
    }

    /// Add a column definition.
    pub fn with_column(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnSchema::new(name, column_type));
        self
    }

    /// Set the storage engine.
    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    /// Set the row count reported by the server.
    pub fn with_total_rows(mut self, total_rows: u64) -> Self {
        self.total_rows = Some(total_rows);
        self
    }

    /// Set the on-disk size. Also fills the human-readable size.
    pub fn with_total_bytes(mut self, total_bytes: u64) -> Self {
        self.total_bytes = Some(total_bytes);
        self.total_size = Some(format_size(total_bytes));
        self
    }

    /// Look up a column by exact name.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// True if the table declares a column with this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column names in declaration order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Check that column names are unique.
    pub fn validate(&self) -> ConnectorResult<()> {
        ensure_unique_columns(&self.columns)
    }
}

/// Fail if two columns share a name.
pub fn ensure_unique_columns(columns: &[ColumnSchema]) -> ConnectorResult<()> {
    let mut seen = HashSet::new();
    for column in columns {
        if !seen.insert(column.name.as_str()) {
            return Err(ConnectorError::invalid_input(format!(
                "Duplicate column name '{}'",
                column.name
            )));
        }
    }
    Ok(())
}

/// Format bytes as human-readable size string.
///
/// Uses binary units (1 KB = 1024 bytes), like the `system.tables` readable columns.
///
/// # Examples
///
/// ```
/// use clickhouse_csv_connector::models::schema::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(1048576), "1 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::WINDOWS)
}
