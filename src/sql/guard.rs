//! Read-only enforcement for rendered SELECT statements.
//!
//! Every statement the query builder hands to the preview and export paths is
//! parsed with [sqlparser](https://docs.rs/sqlparser/)'s ClickHouse dialect and
//! must be exactly one query. Anything else (a write, DDL, a second statement
//! smuggled in through an identifier) is rejected before it reaches the database.

use crate::error::{ConnectorError, ConnectorResult};
use sqlparser::ast::Statement;
use sqlparser::dialect::ClickHouseDialect;
use sqlparser::parser::Parser;

/// Error messages for rejected statements.
mod error_messages {
    pub const PARSE_ERROR: &str = "Rendered SELECT failed to parse.";
    pub const MULTIPLE: &str = "Rendered SQL must contain exactly one statement.";
    pub const NOT_A_QUERY: &str = "Rendered SQL is not a read-only query";
}

/// Validate that `sql` is a single read-only query.
///
/// # Examples
///
/// ```
/// use clickhouse_csv_connector::sql::guard::ensure_read_only;
///
/// assert!(ensure_read_only("SELECT `id` FROM `orders` LIMIT 10").is_ok());
/// assert!(ensure_read_only("DROP TABLE orders").is_err());
/// ```
pub fn ensure_read_only(sql: &str) -> ConnectorResult<()> {
    let statements = Parser::parse_sql(&ClickHouseDialect {}, sql).map_err(|e| {
        ConnectorError::internal(format!("{} Error: {}", error_messages::PARSE_ERROR, e))
    })?;

    match statements.as_slice() {
        [] => Err(ConnectorError::internal("Rendered SQL is empty")),
        [Statement::Query(_)] => Ok(()),
        [other] => Err(ConnectorError::internal(format!(
            "{}: {}",
            error_messages::NOT_A_QUERY,
            statement_keyword(other)
        ))),
        _ => Err(ConnectorError::internal(error_messages::MULTIPLE)),
    }
}

/// Leading keyword of a statement, for error messages.
fn statement_keyword(stmt: &Statement) -> String {
    stmt.to_string()
        .split_whitespace()
        .next()
        .unwrap_or("UNKNOWN")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_ok() {
        assert!(ensure_read_only("SELECT * FROM `orders`").is_ok());
    }

    #[test]
    fn test_join_select_ok() {
        let sql = "SELECT `orders`.`id` AS `id` FROM `orders` LEFT JOIN `customers` \
                   ON `orders`.`customer_id` = `customers`.`id` LIMIT 100";
        assert!(ensure_read_only(sql).is_ok());
    }

    #[test]
    fn test_doubled_backtick_identifier_ok() {
        assert!(ensure_read_only("SELECT * FROM `odd``name` LIMIT 10").is_ok());
    }

    #[test]
    fn test_write_rejected() {
        let err = ensure_read_only("INSERT INTO orders VALUES (1)").unwrap_err();
        assert!(err.to_string().contains("INSERT"));
    }

    #[test]
    fn test_ddl_rejected() {
        assert!(ensure_read_only("DROP TABLE orders").is_err());
    }

    #[test]
    fn test_multiple_statements_rejected() {
        let result = ensure_read_only("SELECT 1; DROP TABLE orders");
        assert!(result.is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(ensure_read_only("SELEKT nothing").is_err());
        assert!(ensure_read_only("").is_err());
    }
}
