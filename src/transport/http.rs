//! REST API over `axum`.
//!
//! Every request carries its own connection details; a connector is opened
//! for the request and dropped with it. Errors render as
//! `{"success": false, "error": {"kind", "message", "suggestion"}}`.

use crate::db::ConnectorFactory;
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{
    ColumnSchema, ConnectionDetails, CoercionMode, ImportOptions, ParsedFile, Preview,
    ProcessingResult, QuerySpec, TableSchema,
};
use crate::tabular::read_tabular;
use crate::transfer::{ImportRequest, TransferService, TransferSettings, parse_file};
use axum::extract::rejection::JsonRejection;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Header carrying the row count of a CSV download.
pub const RECORDS_PROCESSED_HEADER: &str = "x-records-processed";

/// Shared, immutable state of the HTTP API.
#[derive(Clone)]
pub struct AppState {
    pub factory: Arc<dyn ConnectorFactory>,
    pub settings: TransferSettings,
    pub max_upload_bytes: usize,
}

type ApiResult<T> = Result<T, ConnectorError>;

// =============================================================================
// Error Responses
// =============================================================================

/// HTTP status for an error kind.
pub fn status_for(err: &ConnectorError) -> StatusCode {
    match err {
        ConnectorError::Connection { .. } | ConnectorError::Database { .. } => {
            StatusCode::BAD_GATEWAY
        }
        ConnectorError::SchemaMismatch { .. } | ConnectorError::TypeCoercion { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ConnectorError::UnsupportedFormat { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ConnectorError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
        ConnectorError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        ConnectorError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ConnectorError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        if status.is_server_error() {
            error!(kind = self.kind(), error = %self, "Request failed");
        } else {
            warn!(kind = self.kind(), error = %self, "Request rejected");
        }
        let body = json!({
            "success": false,
            "error": {
                "kind": self.kind(),
                "message": self.to_string(),
                "suggestion": self.suggestion(),
            }
        });
        (status, Json(body)).into_response()
    }
}

fn json_rejection(rejection: JsonRejection) -> ConnectorError {
    ConnectorError::invalid_input(format!("Invalid request body: {}", rejection.body_text()))
}

fn multipart_rejection(rejection: MultipartRejection) -> ConnectorError {
    ConnectorError::invalid_input(format!("Invalid multipart request: {}", rejection.body_text()))
}

// =============================================================================
// Request Bodies
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct DescribeRequest {
    #[serde(alias = "connection_details")]
    pub connection: ConnectionDetails,
    #[serde(alias = "table_name")]
    pub table: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    #[serde(alias = "connection_details")]
    pub connection: ConnectionDetails,
    #[serde(alias = "query_config")]
    pub query: QuerySpec,
    #[serde(default)]
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub connected: bool,
    pub server_version: String,
    pub database: String,
}

// =============================================================================
// Router
// =============================================================================

/// Build the API router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/connect", post(connect))
        .route("/tables", post(list_tables))
        .route("/tables/describe", post(describe_table))
        .route("/preview", post(preview))
        .route("/export", post(export))
        .route("/export/download", post(export_download))
        .route("/parse-csv", post(parse_csv))
        .route("/import", post(import))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn connect(
    State(state): State<AppState>,
    payload: Result<Json<ConnectionDetails>, JsonRejection>,
) -> ApiResult<Json<ConnectResponse>> {
    let Json(details) = payload.map_err(json_rejection)?;
    let conn = state.factory.connect(&details).await?;
    let service = TransferService::new(conn.as_ref(), state.settings);
    let server_version = service.check_connection().await?;
    Ok(Json(ConnectResponse {
        connected: true,
        server_version,
        database: conn.database().to_string(),
    }))
}

async fn list_tables(
    State(state): State<AppState>,
    payload: Result<Json<ConnectionDetails>, JsonRejection>,
) -> ApiResult<Json<Vec<TableSchema>>> {
    let Json(details) = payload.map_err(json_rejection)?;
    let conn = state.factory.connect(&details).await?;
    let tables = TransferService::new(conn.as_ref(), state.settings)
        .list_tables()
        .await?;
    Ok(Json(tables))
}

async fn describe_table(
    State(state): State<AppState>,
    payload: Result<Json<DescribeRequest>, JsonRejection>,
) -> ApiResult<Json<TableSchema>> {
    let Json(request) = payload.map_err(json_rejection)?;
    let conn = state.factory.connect(&request.connection).await?;
    let table = TransferService::new(conn.as_ref(), state.settings)
        .describe_table(&request.table)
        .await?;
    Ok(Json(table))
}

async fn preview(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<Json<Preview>> {
    let Json(request) = payload.map_err(json_rejection)?;
    let conn = state.factory.connect(&request.connection).await?;
    let preview = TransferService::new(conn.as_ref(), state.settings)
        .preview(&request.query, request.limit)
        .await?;
    Ok(Json(preview))
}

async fn export(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<Json<ProcessingResult>> {
    let Json(request) = payload.map_err(json_rejection)?;
    let conn = state.factory.connect(&request.connection).await?;
    let outcome = TransferService::new(conn.as_ref(), state.settings)
        .export(&request.query)
        .await?;
    Ok(Json(ProcessingResult::exported(&request.query.table, outcome)))
}

async fn export_download(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let Json(request) = payload.map_err(json_rejection)?;
    let conn = state.factory.connect(&request.connection).await?;
    let outcome = TransferService::new(conn.as_ref(), state.settings)
        .export(&request.query)
        .await?;

    let disposition = format!(
        "attachment; filename=\"{}.csv\"",
        download_name(&request.query.table)
    );
    let mut response = (
        [(header::CONTENT_TYPE, "text/csv; charset=utf-8")],
        outcome.csv,
    )
        .into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&disposition) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        RECORDS_PROCESSED_HEADER,
        HeaderValue::from(outcome.row_count as u64),
    );
    Ok(response)
}

/// File name for a download, reduced to characters safe in a header.
fn download_name(table: &str) -> String {
    let name: String = table
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() { "export".to_string() } else { name }
}

// =============================================================================
// Multipart Uploads
// =============================================================================

/// Fields of an upload form.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<Vec<u8>>,
    file_name: Option<String>,
    connection: Option<String>,
    table: Option<String>,
    create_table: Option<String>,
    mode: Option<String>,
    columns: Option<String>,
}

async fn read_form(mut multipart: Multipart) -> ConnectorResult<UploadForm> {
    let mut form = UploadForm::default();
    let field_error =
        |e: axum::extract::multipart::MultipartError| ConnectorError::invalid_input(e.body_text());

    while let Some(field) = multipart.next_field().await.map_err(field_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                form.file_name = field.file_name().map(str::to_string);
                form.file = Some(field.bytes().await.map_err(field_error)?.to_vec());
            }
            "connection" | "connection_details" => {
                form.connection = Some(field.text().await.map_err(field_error)?)
            }
            "table" | "table_name" => form.table = Some(field.text().await.map_err(field_error)?),
            "create_table" => form.create_table = Some(field.text().await.map_err(field_error)?),
            "mode" => form.mode = Some(field.text().await.map_err(field_error)?),
            "columns" => form.columns = Some(field.text().await.map_err(field_error)?),
            other => warn!(field = other, "Ignoring unknown form field"),
        }
    }
    Ok(form)
}

impl UploadForm {
    /// The uploaded CSV bytes; the file name must end in `.csv`.
    fn csv_file(&self) -> ConnectorResult<&[u8]> {
        let bytes = self
            .file
            .as_deref()
            .ok_or_else(|| ConnectorError::invalid_input("Missing 'file' field"))?;
        let is_csv = self
            .file_name
            .as_deref()
            .is_some_and(|n| n.to_ascii_lowercase().ends_with(".csv"));
        if !is_csv {
            return Err(ConnectorError::unsupported_format(format!(
                "Only .csv uploads are supported (got {})",
                self.file_name.as_deref().unwrap_or("no file name")
            )));
        }
        Ok(bytes)
    }

    fn connection(&self) -> ConnectorResult<ConnectionDetails> {
        let raw = self
            .connection
            .as_deref()
            .ok_or_else(|| ConnectorError::invalid_input("Missing 'connection' field"))?;
        serde_json::from_str(raw)
            .map_err(|e| ConnectorError::invalid_input(format!("Invalid 'connection' JSON: {}", e)))
    }

    fn table(&self) -> ConnectorResult<&str> {
        self.table
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConnectorError::invalid_input("Missing 'table' field"))
    }

    fn options(&self) -> ConnectorResult<ImportOptions> {
        let create_table = match self.create_table.as_deref().map(str::trim) {
            None | Some("") => false,
            Some(v) if v.eq_ignore_ascii_case("true") || v == "1" => true,
            Some(v) if v.eq_ignore_ascii_case("false") || v == "0" => false,
            Some(v) => {
                return Err(ConnectorError::invalid_input(format!(
                    "Invalid 'create_table' value '{}'",
                    v
                )));
            }
        };
        let mode = match self.mode.as_deref() {
            None => CoercionMode::default(),
            Some(v) => CoercionMode::parse(v).ok_or_else(|| {
                ConnectorError::invalid_input(format!(
                    "Invalid 'mode' value '{}', expected strict or lenient",
                    v
                ))
            })?,
        };
        Ok(ImportOptions::new(mode, create_table))
    }

    fn columns(&self) -> ConnectorResult<Option<Vec<ColumnSchema>>> {
        self.columns
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .map(|raw| {
                serde_json::from_str(raw).map_err(|e| {
                    ConnectorError::invalid_input(format!("Invalid 'columns' JSON: {}", e))
                })
            })
            .transpose()
    }
}

async fn parse_csv(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ParsedFile>> {
    let form = read_form(multipart.map_err(multipart_rejection)?).await?;
    let parsed = parse_file(form.csv_file()?, &state.settings)?;
    Ok(Json(parsed))
}

async fn import(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<ProcessingResult>> {
    let form = read_form(multipart.map_err(multipart_rejection)?).await?;
    let details = form.connection()?;
    let table = form.table()?;
    let options = form.options()?;
    let columns = form.columns()?;
    let data = read_tabular(form.csv_file()?, state.settings.tabular)?;

    let conn = state.factory.connect(&details).await?;
    let outcome = TransferService::new(conn.as_ref(), state.settings)
        .import(ImportRequest {
            table,
            data: &data,
            columns,
            options,
        })
        .await?;
    Ok(Json(ProcessingResult::imported(table, &outcome)))
}

// =============================================================================
// Server
// =============================================================================

/// The HTTP server.
pub struct HttpServer {
    host: String,
    port: u16,
    state: AppState,
}

impl HttpServer {
    pub fn new(host: impl Into<String>, port: u16, state: AppState) -> Self {
        Self {
            host: host.into(),
            port,
            state,
        }
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Serve until SIGINT or SIGTERM.
    pub async fn run(&self) -> ConnectorResult<()> {
        let bind_addr = self.bind_addr();
        let app = router(self.state.clone());

        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            ConnectorError::internal(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;
        info!(addr = %bind_addr, "HTTP API listening");

        // In-flight exports and imports may run long; a second signal or the
        // timeout forces exit.
        const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

        let shutdown_notify = Arc::new(tokio::sync::Notify::new());
        let shutdown_notify_clone = shutdown_notify.clone();
        let shutdown_signal = async move {
            wait_for_signal().await;
            shutdown_notify_clone.notify_one();
        };

        let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal);

        tokio::select! {
            result = server => {
                match result {
                    Ok(()) => info!("HTTP server stopped"),
                    Err(e) => {
                        error!(error = %e, "HTTP server error");
                        return Err(ConnectorError::internal(format!("HTTP server error: {}", e)));
                    }
                }
            }
            _ = async {
                shutdown_notify.notified().await;
                info!(
                    timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                    "Waiting for in-flight requests (send signal again to force exit)..."
                );
                tokio::select! {
                    _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                        warn!("Graceful shutdown timeout, forcing exit");
                    }
                    _ = wait_for_signal() => {
                        warn!("Received second signal, forcing immediate exit");
                    }
                }
            } => {}
        }

        Ok(())
    }
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_for(&ConnectorError::connection("a", "b")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(&ConnectorError::schema_mismatch("m", "t.c")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&ConnectorError::type_coercion("c", 1, "v", "Int32")),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&ConnectorError::unsupported_format("x")),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            status_for(&ConnectorError::invalid_input("x")),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&ConnectorError::timeout("select", 30)),
            StatusCode::GATEWAY_TIMEOUT
        );
    }

    #[test]
    fn test_download_name() {
        assert_eq!(download_name("orders"), "orders");
        assert_eq!(download_name("a\"b/c"), "a_b_c");
        assert_eq!(download_name(""), "export");
    }

    #[test]
    fn test_form_requires_csv_name() {
        let form = UploadForm {
            file: Some(b"a\n1\n".to_vec()),
            file_name: Some("data.xlsx".into()),
            ..UploadForm::default()
        };
        assert!(matches!(
            form.csv_file(),
            Err(ConnectorError::UnsupportedFormat { .. })
        ));

        let form = UploadForm {
            file_name: Some("DATA.CSV".into()),
            ..form
        };
        assert!(form.csv_file().is_ok());
    }

    #[test]
    fn test_form_options() {
        let form = UploadForm {
            create_table: Some("true".into()),
            mode: Some("Lenient".into()),
            ..UploadForm::default()
        };
        let options = form.options().unwrap();
        assert!(options.create_table);
        assert_eq!(options.mode, CoercionMode::Lenient);

        assert_eq!(UploadForm::default().options().unwrap(), ImportOptions::default());

        let bad = UploadForm {
            create_table: Some("maybe".into()),
            ..UploadForm::default()
        };
        assert!(bad.options().is_err());
    }

    #[test]
    fn test_form_columns() {
        let form = UploadForm {
            columns: Some(r#"[{"name":"id","type":"Int32"}]"#.into()),
            ..UploadForm::default()
        };
        let columns = form.columns().unwrap().unwrap();
        assert_eq!(columns[0].name, "id");
        assert!(UploadForm::default().columns().unwrap().is_none());
    }
}
