//! ClickHouse over its HTTP interface.
//!
//! Every request is a POST to `http(s)://host:port/` carrying the target
//! database, a fresh `query_id` and, for reads, `default_format=JSONCompact`.
//! Metadata lookups bind the database and table names as server-side query
//! parameters (`{db:String}`), so those values never become SQL text.
//!
//! # Error mapping
//!
//! ClickHouse reports failures through a non-2xx status, the
//! `X-ClickHouse-Exception-Code` header and a `Code: N. DB::Exception: ...`
//! body. Known codes are mapped onto the crate's error taxonomy:
//!
//! | Code(s)                | Error            |
//! |------------------------|------------------|
//! | 516, 192, 193, 194     | `Connection`     |
//! | 81                     | `Connection`     |
//! | 60, 16, 47, 57         | `SchemaMismatch` |
//! | 159                    | `Timeout`        |
//! | anything else          | `Database`       |

use crate::db::connector::{Connector, ConnectorFactory, ResultSet};
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{ColumnSchema, ConnectionDetails, RowMap, TableSchema};
use crate::sql::{CreateStatement, InsertStatement, SelectStatement};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

/// Default TCP connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default per-statement timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

const EXCEPTION_CODE_HEADER: &str = "X-ClickHouse-Exception-Code";
const USER_HEADER: &str = "X-ClickHouse-User";
const KEY_HEADER: &str = "X-ClickHouse-Key";
const MAX_ERROR_MESSAGE_LEN: usize = 500;

mod queries {
    pub const SERVER_VERSION: &str = "SELECT version()";

    pub const LIST_COLUMNS: &str = r#"
        SELECT table, name, type
        FROM system.columns
        WHERE database = {db:String}
        ORDER BY table, position
    "#;

    pub const TABLE_COLUMNS: &str = r#"
        SELECT table, name, type
        FROM system.columns
        WHERE database = {db:String} AND table = {table:String}
        ORDER BY position
    "#;

    pub const LIST_TABLES: &str = r#"
        SELECT name, engine, total_rows, total_bytes
        FROM system.tables
        WHERE database = {db:String} AND NOT is_temporary
        ORDER BY name
    "#;

    pub const TABLE_INFO: &str = r#"
        SELECT name, engine, total_rows, total_bytes
        FROM system.tables
        WHERE database = {db:String} AND name = {table:String}
    "#;
}

/// Exception codes with a dedicated mapping.
mod codes {
    pub const NO_SUCH_COLUMN_IN_TABLE: i32 = 16;
    pub const UNKNOWN_IDENTIFIER: i32 = 47;
    pub const TABLE_ALREADY_EXISTS: i32 = 57;
    pub const UNKNOWN_TABLE: i32 = 60;
    pub const UNKNOWN_DATABASE: i32 = 81;
    pub const TIMEOUT_EXCEEDED: i32 = 159;
    pub const UNKNOWN_USER: i32 = 192;
    pub const WRONG_PASSWORD: i32 = 193;
    pub const REQUIRED_PASSWORD: i32 = 194;
    pub const AUTHENTICATION_FAILED: i32 = 516;
}

/// Timeouts applied to every ClickHouse request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientOptions {
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            query_timeout: Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS),
        }
    }
}

/// Creates [`ClickHouseClient`]s sharing one HTTP connection pool.
#[derive(Debug, Clone)]
pub struct ClickHouseConnectorFactory {
    http: reqwest::Client,
    options: ClientOptions,
}

impl ClickHouseConnectorFactory {
    pub fn new(options: ClientOptions) -> ConnectorResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| ConnectorError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { http, options })
    }
}

#[async_trait]
impl ConnectorFactory for ClickHouseConnectorFactory {
    async fn connect(&self, details: &ConnectionDetails) -> ConnectorResult<Box<dyn Connector>> {
        details.validate()?;

        info!(target_db = %details.display_target(), "Connecting to ClickHouse");
        let client = ClickHouseClient::new(self.http.clone(), details.clone(), self.options)?;
        let version = client.server_version().await?;
        info!(
            target_db = %details.display_target(),
            server_version = %version,
            "Connected successfully"
        );
        Ok(Box::new(client))
    }
}

/// A session bound to one ClickHouse database.
pub struct ClickHouseClient {
    http: reqwest::Client,
    base_url: Url,
    details: ConnectionDetails,
    options: ClientOptions,
}

impl std::fmt::Debug for ClickHouseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseClient")
            .field("base_url", &self.base_url.as_str())
            .field("details", &self.details)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct CompactResponse {
    meta: Vec<ColumnSchema>,
    data: Vec<Vec<JsonValue>>,
}

/// One request to the HTTP interface.
struct Request<'a> {
    operation: &'a str,
    /// Sent in the body for reads and DDL, in the `query` parameter for inserts
    sql: &'a str,
    params: &'a [(&'a str, &'a str)],
    /// JSONEachRow payload for inserts
    data: Option<String>,
    compact_output: bool,
}

impl ClickHouseClient {
    pub fn new(
        http: reqwest::Client,
        details: ConnectionDetails,
        options: ClientOptions,
    ) -> ConnectorResult<Self> {
        let base_url = base_url(&details)?;
        Ok(Self {
            http,
            base_url,
            details,
            options,
        })
    }

    fn request_url(&self, request: &Request<'_>, query_id: &str) -> Url {
        let mut url = self.base_url.clone();
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("database", &self.details.database)
                .append_pair("query_id", query_id)
                .append_pair("output_format_json_quote_64bit_integers", "0");
            if request.compact_output {
                pairs.append_pair("default_format", "JSONCompact");
            }
            if request.data.is_some() {
                pairs.append_pair("query", request.sql);
            }
            for (name, value) in request.params {
                pairs.append_pair(&format!("param_{}", name), value);
            }
        }
        url
    }

    async fn execute(&self, request: Request<'_>) -> ConnectorResult<String> {
        let query_id = Uuid::new_v4().to_string();
        let url = self.request_url(&request, &query_id);
        let body = match &request.data {
            Some(data) => data.clone(),
            None => request.sql.to_string(),
        };

        let mut builder = self.http.post(url).body(body);
        builder = match (self.details.use_jwt, self.details.jwt_token.as_deref()) {
            (true, Some(token)) => builder.bearer_auth(token),
            _ => builder
                .header(USER_HEADER, &self.details.username)
                .header(KEY_HEADER, self.details.password.as_deref().unwrap_or("")),
        };

        debug!(
            query_id = %query_id,
            operation = request.operation,
            sql = %request.sql.trim(),
            "Sending ClickHouse request"
        );

        let start = Instant::now();
        let query_timeout = self.options.query_timeout;
        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let code = response
                .headers()
                .get(EXCEPTION_CODE_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<i32>().ok());
            let text = response.text().await?;
            Ok::<_, ConnectorError>((status, code, text))
        };

        let (status, header_code, text) = match timeout(query_timeout, exchange).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(
                    query_id = %query_id,
                    operation = request.operation,
                    "ClickHouse request timed out"
                );
                return Err(ConnectorError::timeout(
                    request.operation,
                    query_timeout.as_secs(),
                ));
            }
        };

        if status.is_success() && header_code.is_none() {
            debug!(
                query_id = %query_id,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "ClickHouse request completed"
            );
            return Ok(text);
        }

        let code = header_code.or_else(|| exception_code(&text));
        warn!(
            query_id = %query_id,
            status = status.as_u16(),
            code = ?code,
            "ClickHouse returned an error"
        );
        Err(map_server_error(
            status.as_u16(),
            code,
            &text,
            &self.details.database,
            query_timeout,
        ))
    }

    async fn query_compact(
        &self,
        operation: &str,
        sql: &str,
        params: &[(&str, &str)],
    ) -> ConnectorResult<CompactResponse> {
        let text = self
            .execute(Request {
                operation,
                sql,
                params,
                data: None,
                compact_output: true,
            })
            .await?;
        parse_compact(&text)
    }

    async fn fetch_tables(&self, table: Option<&str>) -> ConnectorResult<Vec<TableSchema>> {
        let database = self.details.database.as_str();
        let (columns, tables) = match table {
            Some(name) => {
                let params = [("db", database), ("table", name)];
                (
                    self.query_compact("describe table", queries::TABLE_COLUMNS, &params)
                        .await?,
                    self.query_compact("describe table", queries::TABLE_INFO, &params)
                        .await?,
                )
            }
            None => {
                let params = [("db", database)];
                (
                    self.query_compact("list tables", queries::LIST_COLUMNS, &params)
                        .await?,
                    self.query_compact("list tables", queries::LIST_TABLES, &params)
                        .await?,
                )
            }
        };
        assemble_tables(&tables.data, &columns.data)
    }
}

#[async_trait]
impl Connector for ClickHouseClient {
    fn database(&self) -> &str {
        &self.details.database
    }

    async fn server_version(&self) -> ConnectorResult<String> {
        let response = self
            .query_compact("server version", queries::SERVER_VERSION, &[])
            .await?;
        response
            .data
            .first()
            .and_then(|row| row.first())
            .and_then(JsonValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| ConnectorError::internal("version() returned no rows"))
    }

    async fn list_tables(&self) -> ConnectorResult<Vec<TableSchema>> {
        self.fetch_tables(None).await
    }

    async fn describe_table(&self, table: &str) -> ConnectorResult<Option<TableSchema>> {
        Ok(self.fetch_tables(Some(table)).await?.into_iter().next())
    }

    async fn select(&self, statement: &SelectStatement) -> ConnectorResult<ResultSet> {
        let response = self
            .query_compact("select", statement.sql(), &[])
            .await?;
        Ok(ResultSet::new(response.meta, response.data))
    }

    async fn create_table(&self, statement: &CreateStatement) -> ConnectorResult<()> {
        self.execute(Request {
            operation: "create table",
            sql: statement.sql(),
            params: &[],
            data: None,
            compact_output: false,
        })
        .await?;
        Ok(())
    }

    async fn insert(
        &self,
        statement: &InsertStatement,
        rows: &[Vec<JsonValue>],
    ) -> ConnectorResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let data = json_each_row(statement.columns(), rows)?;
        self.execute(Request {
            operation: "insert",
            sql: statement.sql(),
            params: &[],
            data: Some(data),
            compact_output: false,
        })
        .await?;
        Ok(rows.len() as u64)
    }
}

/// `http(s)://host:port/` for the given details.
pub fn base_url(details: &ConnectionDetails) -> ConnectorResult<Url> {
    let host = if details.host.contains(':') && !details.host.starts_with('[') {
        format!("[{}]", details.host)
    } else {
        details.host.clone()
    };
    Url::parse(&format!("{}://{}:{}/", details.scheme(), host, details.port)).map_err(|e| {
        ConnectorError::invalid_input(format!(
            "Invalid host '{}': {}",
            details.host, e
        ))
    })
}

fn parse_compact(text: &str) -> ConnectorResult<CompactResponse> {
    serde_json::from_str(text).map_err(|e| {
        ConnectorError::internal(format!("Unexpected ClickHouse response format: {}", e))
    })
}

/// Serialize rows as newline-delimited JSON objects keyed by column name.
pub fn json_each_row(columns: &[ColumnSchema], rows: &[Vec<JsonValue>]) -> ConnectorResult<String> {
    let mut out = String::new();
    for row in rows {
        if row.len() != columns.len() {
            return Err(ConnectorError::internal(format!(
                "Row has {} values for {} columns",
                row.len(),
                columns.len()
            )));
        }
        let object: RowMap = columns
            .iter()
            .zip(row)
            .map(|(c, v)| (c.name.clone(), v.clone()))
            .collect();
        let line = serde_json::to_string(&object)
            .map_err(|e| ConnectorError::internal(format!("Failed to encode row: {}", e)))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

/// Join `system.tables` rows with `system.columns` rows into schemas.
fn assemble_tables(
    tables: &[Vec<JsonValue>],
    columns: &[Vec<JsonValue>],
) -> ConnectorResult<Vec<TableSchema>> {
    let mut by_table: BTreeMap<&str, Vec<ColumnSchema>> = BTreeMap::new();
    for row in columns {
        let (table, name, ty) = match row.as_slice() {
            [JsonValue::String(t), JsonValue::String(n), JsonValue::String(ty)] => (t, n, ty),
            _ => {
                return Err(ConnectorError::internal(
                    "Unexpected row shape from system.columns",
                ));
            }
        };
        let column_type = ty
            .parse()
            .map_err(|e| ConnectorError::internal(format!("{}", e)))?;
        by_table
            .entry(table.as_str())
            .or_default()
            .push(ColumnSchema::new(name.clone(), column_type));
    }

    let mut result = Vec::with_capacity(tables.len());
    for row in tables {
        let name = match row.first() {
            Some(JsonValue::String(n)) => n.as_str(),
            _ => {
                return Err(ConnectorError::internal(
                    "Unexpected row shape from system.tables",
                ));
            }
        };
        let mut schema = TableSchema::new(name);
        schema.columns = by_table.remove(name).unwrap_or_default();
        if let Some(JsonValue::String(engine)) = row.get(1) {
            schema = schema.with_engine(engine.clone());
        }
        if let Some(rows) = row.get(2).and_then(JsonValue::as_u64) {
            schema = schema.with_total_rows(rows);
        }
        if let Some(bytes) = row.get(3).and_then(JsonValue::as_u64) {
            schema = schema.with_total_bytes(bytes);
        }
        result.push(schema);
    }
    Ok(result)
}

/// Extract `N` from a `Code: N. DB::Exception: ...` body.
pub fn exception_code(body: &str) -> Option<i32> {
    let rest = &body[body.find("Code:")? + "Code:".len()..];
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// First line of a server error, length-limited.
fn error_message(body: &str) -> String {
    let line = body.trim().lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return "ClickHouse returned an empty error response".to_string();
    }
    if line.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let cut: String = line.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}

/// Map a failed HTTP exchange onto the error taxonomy.
pub fn map_server_error(
    status: u16,
    code: Option<i32>,
    body: &str,
    database: &str,
    query_timeout: Duration,
) -> ConnectorError {
    let message = error_message(body);
    match code {
        Some(
            codes::AUTHENTICATION_FAILED
            | codes::UNKNOWN_USER
            | codes::WRONG_PASSWORD
            | codes::REQUIRED_PASSWORD,
        ) => ConnectorError::connection(message, "Verify the username, password or JWT"),
        Some(codes::UNKNOWN_DATABASE) => ConnectorError::connection(
            message,
            format!("Check that database '{}' exists", database),
        ),
        Some(
            codes::UNKNOWN_TABLE
            | codes::NO_SUCH_COLUMN_IN_TABLE
            | codes::UNKNOWN_IDENTIFIER
            | codes::TABLE_ALREADY_EXISTS,
        ) => ConnectorError::schema_mismatch(message, database),
        Some(codes::TIMEOUT_EXCEEDED) => {
            ConnectorError::timeout("ClickHouse query", query_timeout.as_secs())
        }
        None if status == 401 || status == 403 => {
            ConnectorError::connection(message, "Verify the username, password or JWT")
        }
        other => ConnectorError::database(
            message,
            other,
            "Check the ClickHouse server log for this query_id",
        ),
    }
}
