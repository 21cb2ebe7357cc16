//! ClickHouse CSV Connector - Main entry point.
//!
//! Runs the HTTP API by default, or a single operation (`tables`, `preview`,
//! `export`, `import`) against the ClickHouse flags.

use clap::Parser;
use clickhouse_csv_connector::config::{Command, Config, ConnectionArgs};
use clickhouse_csv_connector::db::{ClickHouseConnectorFactory, Connector, ConnectorFactory};
use clickhouse_csv_connector::error::{ConnectorError, ConnectorResult};
use clickhouse_csv_connector::format::render_preview;
use clickhouse_csv_connector::models::{ImportOptions, ProcessingResult};
use clickhouse_csv_connector::tabular::read_tabular_file;
use clickhouse_csv_connector::transfer::{ImportRequest, TransferService, TransferSettings};
use clickhouse_csv_connector::transport::{AppState, HttpServer};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr so CSV and JSON written to stdout stay clean.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn open(
    factory: &ClickHouseConnectorFactory,
    args: &ConnectionArgs,
) -> ConnectorResult<Box<dyn Connector>> {
    factory.connect(&args.to_details()).await
}

fn to_json<T: serde::Serialize>(value: &T) -> ConnectorResult<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| ConnectorError::internal(format!("Failed to encode output: {}", e)))
}

async fn run(config: Config) -> ConnectorResult<()> {
    let settings: TransferSettings = config.transfer_settings()?;
    let factory = ClickHouseConnectorFactory::new(config.client_options())?;

    match config.command.clone().unwrap_or(Command::Serve) {
        Command::Serve => {
            info!(
                host = %config.http_host,
                port = config.http_port,
                "Starting ClickHouse CSV Connector v{}",
                env!("CARGO_PKG_VERSION")
            );
            let state = AppState {
                factory: Arc::new(factory),
                settings,
                max_upload_bytes: config.max_upload_bytes,
            };
            HttpServer::new(&config.http_host, config.http_port, state)
                .run()
                .await?;
            info!("Server shutdown complete");
        }
        Command::Tables { connection } => {
            let conn = open(&factory, &connection).await?;
            let tables = TransferService::new(conn.as_ref(), settings)
                .list_tables()
                .await?;
            println!("{}", to_json(&tables)?);
        }
        Command::Preview {
            connection,
            query,
            limit,
            format,
        } => {
            let spec = query.to_spec()?;
            let conn = open(&factory, &connection).await?;
            let start = Instant::now();
            let preview = TransferService::new(conn.as_ref(), settings)
                .preview(&spec, limit)
                .await?;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            print!("{}", render_preview(&preview, format, elapsed_ms)?);
        }
        Command::Export {
            connection,
            query,
            output,
        } => {
            let spec = query.to_spec()?;
            let conn = open(&factory, &connection).await?;
            let outcome = TransferService::new(conn.as_ref(), settings)
                .export(&spec)
                .await?;
            if output == "-" {
                let mut stdout = tokio::io::stdout();
                stdout
                    .write_all(outcome.csv.as_bytes())
                    .await
                    .map_err(|e| ConnectorError::internal(format!("Failed to write CSV: {}", e)))?;
                stdout
                    .flush()
                    .await
                    .map_err(|e| ConnectorError::internal(format!("Failed to write CSV: {}", e)))?;
            } else {
                tokio::fs::write(&output, outcome.csv.as_bytes())
                    .await
                    .map_err(|e| {
                        ConnectorError::invalid_input(format!("Cannot write {}: {}", output, e))
                    })?;
                info!(path = %output, rows = outcome.row_count, "Wrote CSV file");
            }
        }
        Command::Import {
            connection,
            table,
            file,
            create_table,
            mode,
        } => {
            let data = read_tabular_file(&file, settings.tabular).await?;
            let conn = open(&factory, &connection).await?;
            let outcome = TransferService::new(conn.as_ref(), settings)
                .import(ImportRequest {
                    table: &table,
                    data: &data,
                    columns: None,
                    options: ImportOptions::new(mode, create_table),
                })
                .await?;
            println!("{}", to_json(&ProcessingResult::imported(&table, &outcome))?);
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse();

    // Initialize logging
    init_tracing(&config);

    if let Err(e) = run(config).await {
        error!(kind = e.kind(), error = %e, "Operation failed");
        if let Some(suggestion) = e.suggestion() {
            eprintln!("Suggestion: {}", suggestion);
        }
        return Err(e.into());
    }

    Ok(())
}
