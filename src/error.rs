//! Error types for the connector service.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Every variant is terminal for the operation that raised it: nothing in this crate
//! retries, and an import or export that fails leaves no partial result behind.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Schema mismatch: {message} (object: {object})")]
    SchemaMismatch { message: String, object: String },

    #[error(
        "Cannot coerce value '{value}' in column '{column}' (row {row}) to {expected}"
    )]
    TypeCoercion {
        column: String,
        /// 1-based data row, header excluded
        row: usize,
        value: String,
        expected: String,
    },

    #[error("Unsupported format: {message}")]
    UnsupportedFormat { message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// ClickHouse exception code, e.g. 62 for a syntax error
        code: Option<i32>,
        suggestion: String,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl ConnectorError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a schema mismatch error for the named table or column.
    pub fn schema_mismatch(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::SchemaMismatch {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create a coercion error for a single cell.
    pub fn type_coercion(
        column: impl Into<String>,
        row: usize,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::TypeCoercion {
            column: column.into(),
            row,
            value: value.into(),
            expected: expected.into(),
        }
    }

    /// Create an unsupported format error.
    pub fn unsupported_format(message: impl Into<String>) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
        }
    }

    /// Create a database error with an optional ClickHouse exception code.
    pub fn database(
        message: impl Into<String>,
        code: Option<i32>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            code,
            suggestion: suggestion.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable tag for this error.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection_error",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::TypeCoercion { .. } => "type_coercion_error",
            Self::UnsupportedFormat { .. } => "unsupported_format",
            Self::Database { .. } => "database_error",
            Self::InvalidInput { .. } => "invalid_input",
            Self::Timeout { .. } => "timeout",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::SchemaMismatch { .. } => {
                Some("List the tables first and select only columns they report")
            }
            Self::TypeCoercion { .. } => Some(
                "Fix the value, declare a looser column type, or import in lenient mode",
            ),
            Self::UnsupportedFormat { .. } => {
                Some("Upload a UTF-8 CSV file with a header row and equal-length rows")
            }
            Self::Timeout { .. } => {
                Some("Consider increasing the timeout or narrowing the selection")
            }
            _ => None,
        }
    }
}

/// Convert HTTP client errors raised while talking to ClickHouse.
impl From<reqwest::Error> for ConnectorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ConnectorError::connection(
                format!("Timed out connecting to ClickHouse: {}", err),
                "Check host and port, or raise --connect-timeout",
            )
        } else if err.is_connect() {
            ConnectorError::connection(
                format!("Cannot reach ClickHouse: {}", err),
                "Check host, port, the 'secure' flag and network connectivity",
            )
        } else if err.is_decode() {
            ConnectorError::internal(format!("Malformed ClickHouse response: {}", err))
        } else if err.is_builder() {
            ConnectorError::invalid_input(format!("Invalid connection details: {}", err))
        } else {
            ConnectorError::connection(
                format!("HTTP error: {}", err),
                "Check that the ClickHouse HTTP interface is enabled on this port",
            )
        }
    }
}

/// Convert CSV parse errors; any malformed input is an unsupported format.
impl From<csv::Error> for ConnectorError {
    fn from(err: csv::Error) -> Self {
        match err.kind() {
            csv::ErrorKind::Utf8 { pos, .. } => ConnectorError::unsupported_format(format!(
                "Invalid UTF-8 at line {}",
                pos.as_ref().map(|p| p.line()).unwrap_or(0)
            )),
            csv::ErrorKind::UnequalLengths {
                pos,
                expected_len,
                len,
            } => ConnectorError::unsupported_format(format!(
                "Row at line {} has {} fields, expected {}",
                pos.as_ref().map(|p| p.line()).unwrap_or(0),
                len,
                expected_len
            )),
            csv::ErrorKind::Io(io_err) => {
                ConnectorError::internal(format!("I/O error while reading CSV: {}", io_err))
            }
            _ => ConnectorError::unsupported_format(err.to_string()),
        }
    }
}

/// Result type alias for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
