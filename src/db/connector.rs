//! The database collaborator seam.
//!
//! The transfer service only talks to a [`Connector`]. Production code gets one
//! from [`ClickHouseConnectorFactory`](crate::db::clickhouse::ClickHouseConnectorFactory);
//! tests substitute an in-memory implementation.

use crate::error::ConnectorResult;
use crate::models::{ColumnSchema, ConnectionDetails, TableSchema};
use crate::sql::{CreateStatement, InsertStatement, SelectStatement};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Rows returned by a SELECT, positionally aligned with `columns`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<ColumnSchema>,
    pub rows: Vec<Vec<JsonValue>>,
}

impl ResultSet {
    pub fn new(columns: Vec<ColumnSchema>, rows: Vec<Vec<JsonValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// An open session against one database.
///
/// Implementations execute only the statement types the query builder renders;
/// none of these methods accept free-form SQL.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Name of the database every call operates on.
    fn database(&self) -> &str;

    /// Server version string, also used as a liveness check.
    async fn server_version(&self) -> ConnectorResult<String>;

    /// All tables of the database with their columns in declaration order.
    async fn list_tables(&self) -> ConnectorResult<Vec<TableSchema>>;

    /// One table's schema, or `None` when it does not exist.
    async fn describe_table(&self, table: &str) -> ConnectorResult<Option<TableSchema>>;

    async fn select(&self, statement: &SelectStatement) -> ConnectorResult<ResultSet>;

    async fn create_table(&self, statement: &CreateStatement) -> ConnectorResult<()>;

    /// Insert rows positionally aligned with `statement.columns()`.
    /// Returns the number of rows written.
    async fn insert(
        &self,
        statement: &InsertStatement,
        rows: &[Vec<JsonValue>],
    ) -> ConnectorResult<u64>;
}

/// Opens a [`Connector`] for caller-supplied connection details.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    async fn connect(&self, details: &ConnectionDetails) -> ConnectorResult<Box<dyn Connector>>;
}
