//! Reading CSV files from disk.

use clickhouse_csv_connector::error::ConnectorError;
use clickhouse_csv_connector::tabular::{TabularOptions, read_tabular_file};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp(content: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn test_read_file_with_bom_and_quotes() {
    let file = write_temp("\u{feff}id,name\n1,\"Doe, John\"\n2,\"multi\nline\"\n".as_bytes());
    let data = read_tabular_file(file.path(), TabularOptions::default())
        .await
        .unwrap();
    assert_eq!(data.headers(), ["id", "name"]);
    assert_eq!(data.row_count(), 2);
    assert_eq!(data.rows()[0][1], "Doe, John");
    assert_eq!(data.rows()[1][1], "multi\nline");
}

#[tokio::test]
async fn test_read_file_with_semicolons() {
    let file = write_temp(b"a;b\n1;2\n");
    let options = TabularOptions::with_delimiter(';').unwrap();
    let data = read_tabular_file(file.path(), options).await.unwrap();
    assert_eq!(data.column_values(1, None), vec!["2"]);
}

#[tokio::test]
async fn test_ragged_file_is_unsupported() {
    let file = write_temp(b"a,b\n1,2\n3\n");
    let err = read_tabular_file(file.path(), TabularOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::UnsupportedFormat { .. }));
}

#[tokio::test]
async fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_tabular_file(&dir.path().join("absent.csv"), TabularOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ConnectorError::InvalidInput { .. }));
}
