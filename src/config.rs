//! Configuration handling for the connector service.
//!
//! Server settings come from CLI arguments and `CONNECTOR_*` environment
//! variables. One-shot subcommands additionally take ClickHouse connection
//! flags with `CLICKHOUSE_*` fallbacks.

use crate::db::ClientOptions;
use crate::error::{ConnectorError, ConnectorResult};
use crate::format::PreviewFormat;
use crate::models::{
    CoercionMode, ConnectionDetails, DEFAULT_HTTPS_PORT,
    DEFAULT_HTTP_PORT as DEFAULT_CLICKHOUSE_PORT, DEFAULT_PREVIEW_LIMIT, JoinConfig, JoinKind,
    MAX_PREVIEW_LIMIT, QuerySpec,
};
use crate::tabular::TabularOptions;
use crate::transfer::{DEFAULT_PARSE_SAMPLE_ROWS, TransferSettings};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8000;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = crate::db::clickhouse::DEFAULT_QUERY_TIMEOUT_SECS;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = crate::db::clickhouse::DEFAULT_CONNECT_TIMEOUT_SECS;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
pub const DEFAULT_LOG_LEVEL: &str = "info";

pub const DEFAULT_CLICKHOUSE_HOST: &str = "localhost";
pub const DEFAULT_CLICKHOUSE_DATABASE: &str = "default";
pub const DEFAULT_CLICKHOUSE_USER: &str = "default";

/// Configuration for the connector service.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "clickhouse-csv-connector",
    about = "Move data between ClickHouse tables and CSV files",
    version,
    author
)]
pub struct Config {
    /// Operation to run (default: serve)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// HTTP host to bind to
    #[arg(long, global = true, default_value = DEFAULT_HTTP_HOST, env = "CONNECTOR_HTTP_HOST")]
    pub http_host: String,

    /// HTTP port to bind to
    #[arg(long, global = true, default_value_t = DEFAULT_HTTP_PORT, env = "CONNECTOR_HTTP_PORT")]
    pub http_port: u16,

    /// Per-statement ClickHouse timeout in seconds
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "CONNECTOR_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// ClickHouse connect timeout in seconds
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "CONNECTOR_CONNECT_TIMEOUT"
    )]
    pub connect_timeout: u64,

    /// Preview row limit when the caller gives none
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_PREVIEW_LIMIT,
        env = "CONNECTOR_PREVIEW_LIMIT"
    )]
    pub preview_limit: u32,

    /// Upper bound for any requested preview limit
    #[arg(
        long,
        global = true,
        default_value_t = MAX_PREVIEW_LIMIT,
        env = "CONNECTOR_MAX_PREVIEW_LIMIT"
    )]
    pub max_preview_limit: u32,

    /// Rows sampled when describing an uploaded file
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_PARSE_SAMPLE_ROWS,
        env = "CONNECTOR_PARSE_SAMPLE_ROWS"
    )]
    pub parse_sample_rows: usize,

    /// Maximum accepted upload size in bytes
    #[arg(
        long,
        global = true,
        default_value_t = DEFAULT_MAX_UPLOAD_BYTES,
        env = "CONNECTOR_MAX_UPLOAD_BYTES"
    )]
    pub max_upload_bytes: usize,

    /// CSV field delimiter
    #[arg(long, global = true, default_value_t = ',', env = "CONNECTOR_DELIMITER")]
    pub delimiter: char,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = DEFAULT_LOG_LEVEL, env = "CONNECTOR_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, global = true, env = "CONNECTOR_JSON_LOGS")]
    pub json_logs: bool,
}

/// Subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the HTTP API
    Serve,
    /// List tables and their columns
    Tables {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    /// Show the first rows of a selection
    Preview {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        query: QueryArgs,
        /// Maximum rows to show
        #[arg(long)]
        limit: Option<u32>,
        /// Output format
        #[arg(long, value_enum, default_value_t = PreviewFormat::Json)]
        format: PreviewFormat,
    },
    /// Export a selection to CSV
    Export {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[command(flatten)]
        query: QueryArgs,
        /// Output file, `-` for stdout
        #[arg(short, long, default_value = "-")]
        output: String,
    },
    /// Import a CSV file into a table
    Import {
        #[command(flatten)]
        connection: ConnectionArgs,
        /// Target table
        #[arg(long)]
        table: String,
        /// CSV file to read
        #[arg(long)]
        file: PathBuf,
        /// Create the table from inferred column types when it does not exist
        #[arg(long)]
        create_table: bool,
        /// strict: abort on the first bad cell; lenient: replace it with NULL or a default
        #[arg(long, default_value = "strict", value_parser = parse_mode)]
        mode: CoercionMode,
    },
}

/// ClickHouse connection flags for one-shot subcommands.
#[derive(Debug, Clone, Args)]
pub struct ConnectionArgs {
    #[arg(long = "ch-host", default_value = DEFAULT_CLICKHOUSE_HOST, env = "CLICKHOUSE_HOST")]
    pub host: String,

    /// Defaults to 8123, or 8443 with --ch-secure
    #[arg(long = "ch-port", env = "CLICKHOUSE_PORT")]
    pub port: Option<u16>,

    #[arg(
        long = "ch-database",
        default_value = DEFAULT_CLICKHOUSE_DATABASE,
        env = "CLICKHOUSE_DATABASE"
    )]
    pub database: String,

    #[arg(long = "ch-user", default_value = DEFAULT_CLICKHOUSE_USER, env = "CLICKHOUSE_USER")]
    pub user: String,

    #[arg(long = "ch-password", env = "CLICKHOUSE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Authenticate with this JWT instead of a password
    #[arg(long = "ch-jwt", env = "CLICKHOUSE_JWT", hide_env_values = true)]
    pub jwt: Option<String>,

    /// Use HTTPS
    #[arg(long = "ch-secure", env = "CLICKHOUSE_SECURE")]
    pub secure: bool,
}

impl ConnectionArgs {
    pub fn to_details(&self) -> ConnectionDetails {
        let port = self.port.unwrap_or(if self.secure {
            DEFAULT_HTTPS_PORT
        } else {
            DEFAULT_CLICKHOUSE_PORT
        });
        let mut details = ConnectionDetails::new(&self.host, port, &self.database, &self.user)
            .with_secure(self.secure);
        if let Some(password) = &self.password {
            details = details.with_password(password);
        }
        if let Some(token) = &self.jwt {
            details = details.with_jwt(token);
        }
        details
    }
}

/// Selection flags for `preview` and `export`.
#[derive(Debug, Clone, Args)]
pub struct QueryArgs {
    /// Base table
    #[arg(long)]
    pub table: String,

    /// Comma-separated columns, all when omitted
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Table to join
    #[arg(long)]
    pub join_table: Option<String>,

    /// INNER, LEFT, RIGHT or FULL
    #[arg(long, default_value = "INNER", value_parser = parse_join_kind)]
    pub join_kind: JoinKind,

    /// Join condition `left_key=right_key`, repeatable
    #[arg(long = "join-on", value_parser = parse_key_pair)]
    pub join_on: Vec<(String, String)>,
}

impl QueryArgs {
    pub fn to_spec(&self) -> ConnectorResult<QuerySpec> {
        let mut spec = QuerySpec::new(&self.table).with_columns(self.columns.iter().cloned());
        match &self.join_table {
            Some(other) => {
                let join = self
                    .join_on
                    .iter()
                    .fold(JoinConfig::new(other, self.join_kind), |join, (l, r)| {
                        join.on(l, r)
                    });
                spec = spec.with_join(join);
            }
            None if !self.join_on.is_empty() => {
                return Err(ConnectorError::invalid_input(
                    "--join-on requires --join-table",
                ));
            }
            None => {}
        }
        Ok(spec)
    }
}

fn parse_mode(s: &str) -> Result<CoercionMode, String> {
    CoercionMode::parse(s)
        .ok_or_else(|| format!("unknown mode '{}', expected strict or lenient", s))
}

fn parse_join_kind(s: &str) -> Result<JoinKind, String> {
    JoinKind::parse(s).ok_or_else(|| format!("unknown join kind '{}'", s))
}

fn parse_key_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((l, r)) if !l.trim().is_empty() && !r.trim().is_empty() => {
            Ok((l.trim().to_string(), r.trim().to_string()))
        }
        _ => Err(format!("expected left_key=right_key, got '{}'", s)),
    }
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            command: None,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            preview_limit: DEFAULT_PREVIEW_LIMIT,
            max_preview_limit: MAX_PREVIEW_LIMIT,
            parse_sample_rows: DEFAULT_PARSE_SAMPLE_ROWS,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            delimiter: ',',
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    /// Timeouts for the ClickHouse client.
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            connect_timeout: self.connect_timeout_duration(),
            query_timeout: self.query_timeout_duration(),
        }
    }

    /// Limits for transfer operations. Fails on inconsistent values.
    pub fn transfer_settings(&self) -> ConnectorResult<TransferSettings> {
        if self.max_preview_limit == 0 {
            return Err(ConnectorError::invalid_input(
                "max_preview_limit must be greater than 0",
            ));
        }
        if self.preview_limit == 0 || self.preview_limit > self.max_preview_limit {
            return Err(ConnectorError::invalid_input(format!(
                "preview_limit must be between 1 and {}",
                self.max_preview_limit
            )));
        }
        Ok(TransferSettings {
            default_preview_limit: self.preview_limit,
            max_preview_limit: self.max_preview_limit,
            parse_sample_rows: self.parse_sample_rows,
            tabular: TabularOptions::with_delimiter(self.delimiter)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
