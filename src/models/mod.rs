//! Data models for the connector service.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;
pub mod transfer;

// Re-export commonly used types
pub use crate::db::types::{ColumnType, TypeCategory};
pub use connection::{ConnectionDetails, DEFAULT_HTTPS_PORT, DEFAULT_HTTP_PORT};
pub use query::{
    DEFAULT_PREVIEW_LIMIT, JoinConfig, JoinKeyPair, JoinKind, MAX_PREVIEW_LIMIT, QuerySpec,
    clamp_limit,
};
pub use schema::{ColumnSchema, TableSchema};
pub use transfer::{
    CoercionMode, ExportOutcome, ImportOptions, ImportOutcome, ParsedFile, Preview,
    ProcessingResult, RowMap,
};
