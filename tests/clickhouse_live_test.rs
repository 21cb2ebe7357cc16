//! Integration tests against a running ClickHouse server.
//!
//! Set TEST_CLICKHOUSE_HOST to run them. TEST_CLICKHOUSE_PORT,
//! TEST_CLICKHOUSE_DATABASE, TEST_CLICKHOUSE_USER and TEST_CLICKHOUSE_PASSWORD
//! default to 8123, `default`, `default` and no password.

use clickhouse_csv_connector::db::{ClickHouseConnectorFactory, ClientOptions, ConnectorFactory};
use clickhouse_csv_connector::error::ConnectorError;
use clickhouse_csv_connector::models::{
    CoercionMode, ColumnType, ConnectionDetails, ImportOptions, QuerySpec,
};
use clickhouse_csv_connector::tabular::{TabularOptions, read_tabular};
use clickhouse_csv_connector::transfer::{ImportRequest, TransferService, TransferSettings};
use rand::Rng;
use rand::distributions::Alphanumeric;

fn live_details() -> Option<ConnectionDetails> {
    let host = std::env::var("TEST_CLICKHOUSE_HOST").ok()?;
    let port = std::env::var("TEST_CLICKHOUSE_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8123);
    let database =
        std::env::var("TEST_CLICKHOUSE_DATABASE").unwrap_or_else(|_| "default".to_string());
    let user = std::env::var("TEST_CLICKHOUSE_USER").unwrap_or_else(|_| "default".to_string());
    let mut details = ConnectionDetails::new(host, port, database, user);
    if let Ok(password) = std::env::var("TEST_CLICKHOUSE_PASSWORD") {
        details = details.with_password(password);
    }
    Some(details)
}

fn random_table() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("csv_connector_test_{}", suffix.to_lowercase())
}

#[tokio::test]
async fn test_closed_port_is_connection_error() {
    let factory = ClickHouseConnectorFactory::new(ClientOptions::default()).unwrap();
    let details = ConnectionDetails::new("127.0.0.1", 1, "default", "default");
    let Err(err) = factory.connect(&details).await else {
        panic!("expected connection error, got Ok");
    };
    assert!(
        matches!(err, ConnectorError::Connection { .. }),
        "unexpected error: {err:?}"
    );
}

#[tokio::test]
async fn test_live_import_export_round_trip() {
    let Some(details) = live_details() else {
        eprintln!("Skipping test: TEST_CLICKHOUSE_HOST not set");
        return;
    };

    let factory = ClickHouseConnectorFactory::new(ClientOptions::default()).unwrap();
    let conn = factory.connect(&details).await.unwrap();
    let service = TransferService::new(conn.as_ref(), TransferSettings::default());
    let table = random_table();

    let data = read_tabular(
        b"id,name,score,seen\n\
          1,\"Doe, John\",9.5,2024-01-05 10:00:00\n\
          2,Ana,,2024-02-11 08:30:00\n",
        TabularOptions::default(),
    )
    .unwrap();
    let outcome = service
        .import(ImportRequest {
            table: &table,
            data: &data,
            columns: None,
            options: ImportOptions::new(CoercionMode::Strict, true),
        })
        .await
        .unwrap();
    assert!(outcome.table_created);
    assert_eq!(outcome.rows_inserted, 2);

    let schema = service.describe_table(&table).await.unwrap();
    assert_eq!(schema.column_names(), vec!["id", "name", "score", "seen"]);
    assert_eq!(
        schema.column("score").unwrap().column_type,
        ColumnType::Float64.nullable()
    );

    let exported = service
        .export(&QuerySpec::new(&table).with_columns(["id", "name", "score"]))
        .await
        .unwrap();
    assert_eq!(exported.csv, "id,name,score\n1,\"Doe, John\",9.5\n2,Ana,\n");

    let preview = service
        .preview(&QuerySpec::new(&table), Some(1))
        .await
        .unwrap();
    assert_eq!(preview.row_count, 1);
}
