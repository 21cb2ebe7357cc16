//! ClickHouse CSV Connector Library
//!
//! Moves data between ClickHouse tables and CSV files: schema discovery,
//! bounded previews of (optionally joined) selections, CSV export, and CSV
//! import with type inference and strict or lenient coercion.

pub mod config;
pub mod db;
pub mod error;
pub mod format;
pub mod models;
pub mod sql;
pub mod tabular;
pub mod transfer;
pub mod transport;

pub use config::Config;
pub use error::{ConnectorError, ConnectorResult};
pub use transfer::{ImportRequest, TransferService, TransferSettings};
