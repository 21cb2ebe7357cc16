//! In-memory stand-in for ClickHouse used by the integration tests.
//!
//! Tables live in a shared map; SELECTs are evaluated from the statement's
//! resolved projection and join rather than from SQL text. Every statement
//! the service sends is recorded so tests can assert on what reached the
//! database.

#![allow(dead_code)]

use async_trait::async_trait;
use clickhouse_csv_connector::db::{Connector, ConnectorFactory, ResultSet};
use clickhouse_csv_connector::error::{ConnectorError, ConnectorResult};
use clickhouse_csv_connector::models::{
    ColumnSchema, ColumnType, ConnectionDetails, JoinKind, TableSchema,
};
use clickhouse_csv_connector::sql::{CreateStatement, InsertStatement, SelectStatement};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
pub struct FakeTable {
    pub schema: TableSchema,
    pub rows: Vec<Vec<JsonValue>>,
}

impl FakeTable {
    fn column_index(&self, name: &str) -> Option<usize> {
        self.schema.columns.iter().position(|c| c.name == name)
    }
}

#[derive(Debug, Default)]
pub struct FakeDatabase {
    tables: Mutex<BTreeMap<String, FakeTable>>,
    statements: Mutex<Vec<String>>,
}

impl FakeDatabase {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_table(&self, schema: TableSchema, rows: Vec<Vec<JsonValue>>) {
        self.tables
            .lock()
            .unwrap()
            .insert(schema.name.clone(), FakeTable { schema, rows });
    }

    pub fn table(&self, name: &str) -> Option<FakeTable> {
        self.tables.lock().unwrap().get(name).cloned()
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.lock().unwrap().contains_key(name)
    }

    /// SQL of every statement executed, in order.
    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().clone()
    }

    fn record(&self, sql: &str) {
        self.statements.lock().unwrap().push(sql.to_string());
    }
}

/// The `orders` / `customers` fixture used across tests.
pub fn shop() -> Arc<FakeDatabase> {
    let db = FakeDatabase::new();
    db.add_table(
        TableSchema::new("customers")
            .with_column("id", ColumnType::UInt32)
            .with_column("name", ColumnType::String),
        vec![
            vec![serde_json::json!(10), serde_json::json!("Doe, John")],
            vec![serde_json::json!(20), serde_json::json!("Ana")],
        ],
    );
    db.add_table(
        TableSchema::new("orders")
            .with_column("id", ColumnType::UInt32)
            .with_column("customer_id", ColumnType::UInt32)
            .with_column("amount", ColumnType::Float64)
            .with_column("paid", ColumnType::Bool),
        vec![
            vec![
                serde_json::json!(1),
                serde_json::json!(10),
                serde_json::json!(9.99),
                serde_json::json!(true),
            ],
            vec![
                serde_json::json!(2),
                serde_json::json!(20),
                serde_json::json!(5.5),
                serde_json::json!(false),
            ],
            vec![
                serde_json::json!(3),
                serde_json::json!(30),
                serde_json::json!(12.25),
                serde_json::json!(true),
            ],
        ],
    );
    db
}

pub fn details() -> ConnectionDetails {
    ConnectionDetails::new("fake", 8123, "shop", "default")
}

pub struct FakeConnector {
    db: Arc<FakeDatabase>,
    database: String,
}

impl FakeConnector {
    pub fn new(db: Arc<FakeDatabase>) -> Self {
        Self {
            db,
            database: "shop".to_string(),
        }
    }

    fn lookup(&self, name: &str) -> ConnectorResult<FakeTable> {
        self.db.table(name).ok_or_else(|| {
            ConnectorError::schema_mismatch(format!("Unknown table {}", name), name)
        })
    }
}

fn keys_match(
    left: &FakeTable,
    left_row: &[JsonValue],
    right: &FakeTable,
    right_row: &[JsonValue],
    keys: &[(String, String)],
) -> bool {
    keys.iter().all(|(l, r)| {
        match (left.column_index(l), right.column_index(r)) {
            (Some(li), Some(ri)) => left_row[li] == right_row[ri],
            _ => false,
        }
    })
}

#[async_trait]
impl Connector for FakeConnector {
    fn database(&self) -> &str {
        &self.database
    }

    async fn server_version(&self) -> ConnectorResult<String> {
        Ok("24.8.1.1".to_string())
    }

    async fn list_tables(&self) -> ConnectorResult<Vec<TableSchema>> {
        Ok(self
            .db
            .tables
            .lock()
            .unwrap()
            .values()
            .map(|t| t.schema.clone())
            .collect())
    }

    async fn describe_table(&self, table: &str) -> ConnectorResult<Option<TableSchema>> {
        Ok(self.db.table(table).map(|t| t.schema))
    }

    async fn select(&self, statement: &SelectStatement) -> ConnectorResult<ResultSet> {
        self.db.record(statement.sql());
        let base = self.lookup(statement.table())?;

        // Joined rows as (base row, optional other row)
        let other = match statement.join() {
            Some(join) => Some((self.lookup(&join.other_table)?, join)),
            None => None,
        };
        let mut joined: Vec<(Option<&Vec<JsonValue>>, Option<&Vec<JsonValue>>)> = Vec::new();
        match &other {
            None => joined.extend(base.rows.iter().map(|r| (Some(r), None))),
            Some((other_table, join)) => {
                let mut matched_other = vec![false; other_table.rows.len()];
                for left in &base.rows {
                    let mut any = false;
                    for (i, right) in other_table.rows.iter().enumerate() {
                        if keys_match(&base, left, other_table, right, &join.keys) {
                            joined.push((Some(left), Some(right)));
                            matched_other[i] = true;
                            any = true;
                        }
                    }
                    if !any && matches!(join.kind, JoinKind::Left | JoinKind::Full) {
                        joined.push((Some(left), None));
                    }
                }
                if matches!(join.kind, JoinKind::Right | JoinKind::Full) {
                    for (i, right) in other_table.rows.iter().enumerate() {
                        if !matched_other[i] {
                            joined.push((None, Some(right)));
                        }
                    }
                }
            }
        }

        let (columns, rows) = if statement.is_wildcard() {
            let mut columns = base.schema.columns.clone();
            if let Some((other_table, _)) = &other {
                columns.extend(other_table.schema.columns.iter().map(|c| {
                    ColumnSchema::new(
                        format!("{}.{}", other_table.schema.name, c.name),
                        c.column_type.clone(),
                    )
                }));
            }
            let rows = joined
                .iter()
                .map(|(l, r)| {
                    let mut row = match l {
                        Some(l) => (*l).clone(),
                        None => vec![JsonValue::Null; base.schema.columns.len()],
                    };
                    if let Some((other_table, _)) = &other {
                        match r {
                            Some(r) => row.extend((*r).iter().cloned()),
                            None => {
                                let width = other_table.schema.columns.len();
                                row.extend(std::iter::repeat_n(JsonValue::Null, width));
                            }
                        }
                    }
                    row
                })
                .collect();
            (columns, rows)
        } else {
            let columns = statement
                .projection()
                .iter()
                .map(|p| ColumnSchema::new(p.output_name.clone(), p.column_type.clone()))
                .collect();
            let rows = joined
                .iter()
                .map(|(l, r)| {
                    statement
                        .projection()
                        .iter()
                        .map(|p| {
                            let (table, row) = if p.table == base.schema.name {
                                (&base, *l)
                            } else {
                                match &other {
                                    Some((t, _)) => (t, *r),
                                    None => (&base, None),
                                }
                            };
                            match (row, table.column_index(&p.column)) {
                                (Some(row), Some(i)) => row[i].clone(),
                                _ => JsonValue::Null,
                            }
                        })
                        .collect()
                })
                .collect();
            (columns, rows)
        };

        let mut result = ResultSet::new(columns, rows);
        if let Some(limit) = statement.limit() {
            result.rows.truncate(limit as usize);
        }
        Ok(result)
    }

    async fn create_table(&self, statement: &CreateStatement) -> ConnectorResult<()> {
        self.db.record(statement.sql());
        if self.db.has_table(statement.table()) {
            return Err(ConnectorError::schema_mismatch(
                format!("Table {} already exists", statement.table()),
                statement.table(),
            ));
        }
        let mut schema = TableSchema::new(statement.table());
        schema.columns = statement.columns().to_vec();
        self.db.add_table(schema, Vec::new());
        Ok(())
    }

    async fn insert(
        &self,
        statement: &InsertStatement,
        rows: &[Vec<JsonValue>],
    ) -> ConnectorResult<u64> {
        self.db.record(statement.sql());
        let mut tables = self.db.tables.lock().unwrap();
        let table = tables.get_mut(statement.table()).ok_or_else(|| {
            ConnectorError::schema_mismatch("Unknown table", statement.table())
        })?;
        let positions: Vec<usize> = statement
            .columns()
            .iter()
            .map(|c| {
                table.column_index(&c.name).ok_or_else(|| {
                    ConnectorError::schema_mismatch("Unknown column", c.name.clone())
                })
            })
            .collect::<ConnectorResult<_>>()?;
        for row in rows {
            let mut stored = vec![JsonValue::Null; table.schema.columns.len()];
            for (value, pos) in row.iter().zip(&positions) {
                stored[*pos] = value.clone();
            }
            table.rows.push(stored);
        }
        Ok(rows.len() as u64)
    }
}

/// Factory handing out connectors over one shared fake database.
pub struct FakeFactory {
    pub db: Arc<FakeDatabase>,
}

impl FakeFactory {
    pub fn new(db: Arc<FakeDatabase>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConnectorFactory for FakeFactory {
    async fn connect(&self, details: &ConnectionDetails) -> ConnectorResult<Box<dyn Connector>> {
        details.validate()?;
        if details.host == "unreachable" {
            return Err(ConnectorError::connection(
                "Cannot reach ClickHouse: connection refused",
                "Check host, port, the 'secure' flag and network connectivity",
            ));
        }
        Ok(Box::new(FakeConnector::new(self.db.clone())))
    }
}
