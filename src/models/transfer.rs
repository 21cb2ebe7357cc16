//! Transfer-related data models.
//!
//! Options and outcomes for preview, export, import and file parsing.

use crate::models::ColumnSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Rows of a preview or sample, keyed by column name in column order.
pub type RowMap = serde_json::Map<String, JsonValue>;

/// Policy for cells that cannot be cast to their column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoercionMode {
    /// One bad cell aborts the whole import
    #[default]
    Strict,
    /// Bad cells become NULL (nullable columns) or the type default
    Lenient,
}

impl CoercionMode {
    /// Parse a mode name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Some(Self::Strict),
            "lenient" => Some(Self::Lenient),
            _ => None,
        }
    }
}

impl std::fmt::Display for CoercionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Strict => write!(f, "strict"),
            Self::Lenient => write!(f, "lenient"),
        }
    }
}

/// Caller choices for an import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImportOptions {
    #[serde(default)]
    pub mode: CoercionMode,
    /// Allow creating the target table when it does not exist. Default: false
    #[serde(default)]
    pub create_table: bool,
}

impl ImportOptions {
    pub fn new(mode: CoercionMode, create_table: bool) -> Self {
        Self { mode, create_table }
    }
}

/// Result of a bounded preview.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub columns: Vec<ColumnSchema>,
    pub rows: Vec<RowMap>,
    pub row_count: usize,
}

/// Result of an export.
#[derive(Debug, Clone)]
pub struct ExportOutcome {
    /// CSV text with a header row
    pub csv: String,
    pub row_count: usize,
    /// Header row, in output order
    pub columns: Vec<String>,
}

/// Result of an import.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub rows_inserted: u64,
    /// True if the import created the target table
    pub table_created: bool,
    /// Cells replaced by NULL or a default (lenient mode only)
    pub substituted_cells: usize,
    /// Columns written, with their declared types
    pub columns: Vec<ColumnSchema>,
}

/// Column information and sample rows of an uploaded file.
#[derive(Debug, Clone, Serialize)]
pub struct ParsedFile {
    pub columns: Vec<ColumnSchema>,
    pub sample_data: Vec<RowMap>,
    pub row_count: usize,
}

/// Response body for export and import operations.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub records_processed: u64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_created: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub substituted_cells: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_data: Option<String>,
}

impl ProcessingResult {
    /// Successful export of `outcome` from `table`.
    pub fn exported(table: &str, outcome: ExportOutcome) -> Self {
        Self {
            success: true,
            records_processed: outcome.row_count as u64,
            message: format!(
                "Successfully exported {} records from {}",
                outcome.row_count, table
            ),
            table_created: None,
            substituted_cells: None,
            csv_data: Some(outcome.csv),
        }
    }

    /// Successful import of `outcome` into `table`.
    pub fn imported(table: &str, outcome: &ImportOutcome) -> Self {
        let mut message = format!(
            "Successfully imported {} records to {}",
            outcome.rows_inserted, table
        );
        if outcome.table_created {
            message.push_str(" (table created)");
        }
        Self {
            success: true,
            records_processed: outcome.rows_inserted,
            message,
            table_created: Some(outcome.table_created),
            substituted_cells: Some(outcome.substituted_cells),
            csv_data: None,
        }
    }
}
