//! Transfer Service.
//!
//! Orchestrates data movement between CSV and ClickHouse over a borrowed
//! [`Connector`]. Every operation is terminal on error: an import that fails
//! while reading, resolving or coercing leaves the database untouched, and
//! nothing is retried.

use crate::db::connector::Connector;
use crate::error::{ConnectorError, ConnectorResult};
use crate::models::{
    ColumnSchema, DEFAULT_PREVIEW_LIMIT, ExportOutcome, ImportOptions, ImportOutcome,
    MAX_PREVIEW_LIMIT, ParsedFile, Preview, QuerySpec, RowMap, TableSchema, clamp_limit,
};
use crate::models::schema::ensure_unique_columns;
use crate::sql::{
    Ident, QueryBuilder, SchemaAllowList, SelectStatement, render_create, render_insert,
};
use crate::tabular::{
    ColumnBinding, TabularData, TabularOptions, coerce_cell, coerce_rows, infer_columns,
    read_tabular, write_csv,
};
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default number of rows sampled when describing an uploaded file.
pub const DEFAULT_PARSE_SAMPLE_ROWS: usize = 5;

/// Limits and parsing options shared by all transfer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferSettings {
    pub default_preview_limit: u32,
    pub max_preview_limit: u32,
    pub parse_sample_rows: usize,
    pub tabular: TabularOptions,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            default_preview_limit: DEFAULT_PREVIEW_LIMIT,
            max_preview_limit: MAX_PREVIEW_LIMIT,
            parse_sample_rows: DEFAULT_PARSE_SAMPLE_ROWS,
            tabular: TabularOptions::default(),
        }
    }
}

/// One import.
#[derive(Debug, Clone)]
pub struct ImportRequest<'a> {
    pub table: &'a str,
    pub data: &'a TabularData,
    /// Column types for a table that does not exist yet. Inferred when `None`.
    /// Ignored when the table exists.
    pub columns: Option<Vec<ColumnSchema>>,
    pub options: ImportOptions,
}

fn operation_id() -> String {
    format!("op_{}", Uuid::new_v4().simple())
}

/// Transfer operations against one open connection.
pub struct TransferService<'a> {
    conn: &'a dyn Connector,
    settings: TransferSettings,
}

impl<'a> TransferService<'a> {
    pub fn new(conn: &'a dyn Connector, settings: TransferSettings) -> Self {
        Self { conn, settings }
    }

    /// Verify the connection and return the server version.
    pub async fn check_connection(&self) -> ConnectorResult<String> {
        self.conn.server_version().await
    }

    /// Every table of the connection's database.
    pub async fn list_tables(&self) -> ConnectorResult<Vec<TableSchema>> {
        let tables = self.conn.list_tables().await?;
        debug!(database = self.conn.database(), tables = tables.len(), "Listed tables");
        Ok(tables)
    }

    /// One table's schema; `SchemaMismatch` when absent.
    pub async fn describe_table(&self, table: &str) -> ConnectorResult<TableSchema> {
        self.conn.describe_table(table).await?.ok_or_else(|| {
            ConnectorError::schema_mismatch(
                format!(
                    "Table '{}' does not exist in database '{}'",
                    table,
                    self.conn.database()
                ),
                table,
            )
        })
    }

    /// Describe every table `spec` touches.
    async fn allow_list(&self, spec: &QuerySpec) -> ConnectorResult<SchemaAllowList> {
        let mut tables = Vec::new();
        for name in spec.tables() {
            tables.push(self.describe_table(name).await?);
        }
        Ok(SchemaAllowList::new(tables))
    }

    async fn render(
        &self,
        spec: &QuerySpec,
        limit: Option<u32>,
    ) -> ConnectorResult<SelectStatement> {
        let allow_list = self.allow_list(spec).await?;
        QueryBuilder::new(&allow_list).render_select(spec, limit)
    }

    /// Bounded SELECT; rows come back as ordered name/value maps in server order.
    pub async fn preview(&self, spec: &QuerySpec, limit: Option<u32>) -> ConnectorResult<Preview> {
        let op_id = operation_id();
        let limit = clamp_limit(
            limit,
            self.settings.default_preview_limit,
            self.settings.max_preview_limit,
        );
        let statement = self.render(spec, Some(limit)).await?;
        info!(op_id = %op_id, table = %spec.table, limit, "Running preview");

        let mut result = self.conn.select(&statement).await?;
        result.rows.truncate(limit as usize);

        let names = result.column_names();
        let rows: Vec<RowMap> = result
            .rows
            .into_iter()
            .map(|row| names.iter().cloned().zip(row).collect())
            .collect();

        info!(op_id = %op_id, rows = rows.len(), "Preview completed");
        Ok(Preview {
            row_count: rows.len(),
            columns: result.columns,
            rows,
        })
    }

    /// Unbounded SELECT serialized as CSV.
    ///
    /// The header is the requested column list, or the server's column list
    /// for a `*` selection.
    pub async fn export(&self, spec: &QuerySpec) -> ConnectorResult<ExportOutcome> {
        let op_id = operation_id();
        let start = Instant::now();
        let statement = self.render(spec, None).await?;
        info!(op_id = %op_id, table = %spec.table, "Running export");

        let result = self.conn.select(&statement).await?;
        let columns: Vec<String> = if statement.is_wildcard() {
            result.column_names()
        } else {
            statement
                .projection()
                .iter()
                .map(|p| p.output_name.clone())
                .collect()
        };
        if columns.len() != result.columns.len() {
            return Err(ConnectorError::internal(format!(
                "Server returned {} columns for {} requested",
                result.columns.len(),
                columns.len()
            )));
        }

        let csv = write_csv(&columns, &result.rows)?;
        info!(
            op_id = %op_id,
            rows = result.row_count(),
            bytes = csv.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Export completed"
        );
        Ok(ExportOutcome {
            csv,
            row_count: result.row_count(),
            columns,
        })
    }

    /// Import CSV rows into `request.table`.
    ///
    /// Steps, in order: describe the target, resolve target columns, coerce
    /// every cell, then create the table (only with `create_table`) and insert
    /// all rows in one batch. Nothing is written until coercion succeeds.
    pub async fn import(&self, request: ImportRequest<'_>) -> ConnectorResult<ImportOutcome> {
        let op_id = operation_id();
        let start = Instant::now();
        let data = request.data;
        info!(
            op_id = %op_id,
            table = %request.table,
            rows = data.row_count(),
            mode = %request.options.mode,
            "Starting import"
        );

        let existing = self.conn.describe_table(request.table).await?;
        let (ident, targets, create) = match existing {
            Some(schema) => {
                if request.columns.is_some() {
                    warn!(
                        op_id = %op_id,
                        table = %request.table,
                        "Ignoring supplied column types, table already exists"
                    );
                }
                let targets = existing_targets(&schema, data)?;
                let allow_list = SchemaAllowList::new([schema]);
                let ident = allow_list.table(request.table)?.ident().clone();
                (ident, targets, false)
            }
            None => {
                if !request.options.create_table {
                    return Err(ConnectorError::schema_mismatch(
                        format!(
                            "Table '{}' does not exist; set create_table to create it",
                            request.table
                        ),
                        request.table,
                    ));
                }
                let ident = Ident::new_object(request.table)?;
                let columns = match request.columns {
                    Some(columns) => new_table_targets(columns, data)?,
                    None => infer_columns(data, None),
                };
                (ident, columns, true)
            }
        };

        let bindings = targets
            .iter()
            .map(|target| {
                data.column_index(&target.name)
                    .map(|source_index| ColumnBinding {
                        source_index,
                        target,
                    })
                    .ok_or_else(|| {
                        ConnectorError::schema_mismatch(
                            format!("CSV has no column '{}'", target.name),
                            format!("{}.{}", request.table, target.name),
                        )
                    })
            })
            .collect::<ConnectorResult<Vec<_>>>()?;

        let coerced = coerce_rows(data, &bindings, request.options.mode)?;
        if coerced.substituted > 0 {
            warn!(
                op_id = %op_id,
                substituted = coerced.substituted,
                "Lenient import replaced unconvertible cells"
            );
        }

        let insert = render_insert(&ident, &targets)?;
        if create {
            let statement = render_create(&ident, &targets)?;
            self.conn.create_table(&statement).await?;
            info!(op_id = %op_id, table = %request.table, "Created table");
        }

        let rows_inserted = self.conn.insert(&insert, &coerced.rows).await?;
        info!(
            op_id = %op_id,
            table = %request.table,
            rows = rows_inserted,
            table_created = create,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Import completed"
        );

        Ok(ImportOutcome {
            rows_inserted,
            table_created: create,
            substituted_cells: coerced.substituted,
            columns: targets,
        })
    }
}

/// Target columns for an existing table: every CSV header must be a table column.
fn existing_targets(
    schema: &TableSchema,
    data: &TabularData,
) -> ConnectorResult<Vec<ColumnSchema>> {
    data.headers()
        .iter()
        .map(|header| {
            schema.column(header).cloned().ok_or_else(|| {
                ConnectorError::schema_mismatch(
                    format!(
                        "CSV column '{}' does not exist in table '{}'",
                        header, schema.name
                    ),
                    format!("{}.{}", schema.name, header),
                )
            })
        })
        .collect()
}

/// Caller-declared columns for a new table must name exactly the CSV headers.
fn new_table_targets(
    columns: Vec<ColumnSchema>,
    data: &TabularData,
) -> ConnectorResult<Vec<ColumnSchema>> {
    ensure_unique_columns(&columns)?;
    let declared: HashSet<&str> = columns.iter().map(|c| c.name.as_str()).collect();
    let headers: HashSet<&str> = data.headers().iter().map(String::as_str).collect();
    if declared != headers {
        let mut missing: Vec<&str> = headers.difference(&declared).copied().collect();
        let mut extra: Vec<&str> = declared.difference(&headers).copied().collect();
        missing.sort_unstable();
        extra.sort_unstable();
        return Err(ConnectorError::schema_mismatch(
            format!(
                "Declared columns do not match CSV headers (undeclared: [{}], not in CSV: [{}])",
                missing.join(", "),
                extra.join(", ")
            ),
            "columns",
        ));
    }
    Ok(columns)
}

/// Inferred columns and a typed sample of an uploaded CSV file.
pub fn parse_file(bytes: &[u8], settings: &TransferSettings) -> ConnectorResult<ParsedFile> {
    let data = read_tabular(bytes, settings.tabular)?;
    let columns = infer_columns(&data, Some(settings.parse_sample_rows.max(1)));

    let sample_data = data
        .rows()
        .iter()
        .take(settings.parse_sample_rows)
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .map(|(column, raw)| {
                    let value = coerce_cell(raw, &column.column_type)
                        .unwrap_or_else(|| JsonValue::String(raw.clone()));
                    (column.name.clone(), value)
                })
                .collect::<RowMap>()
        })
        .collect();

    debug!(
        columns = columns.len(),
        rows = data.row_count(),
        "Parsed uploaded file"
    );
    Ok(ParsedFile {
        columns,
        sample_data,
        row_count: data.row_count(),
    })
}
