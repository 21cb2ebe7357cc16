//! Database access layer.
//!
//! - `connector`: the `Connector` / `ConnectorFactory` traits the transfer service runs against
//! - `clickhouse`: the ClickHouse HTTP interface implementation
//! - `types`: ClickHouse column types

pub mod clickhouse;
pub mod connector;
pub mod types;

pub use clickhouse::{ClickHouseClient, ClickHouseConnectorFactory, ClientOptions};
pub use connector::{Connector, ConnectorFactory, ResultSet};
